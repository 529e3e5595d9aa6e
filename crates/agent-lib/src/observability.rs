//! Observability infrastructure for the collector
//!
//! Provides:
//! - Prometheus metrics (cycle latency, rows recorded, absent samples, command failures)
//! - Structured JSON logging with tracing

use crate::models::CycleReport;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for cycle duration (in seconds)
const CYCLE_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<CollectorMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct CollectorMetricsInner {
    cycle_duration_seconds: Histogram,
    cycles: IntCounter,
    rows_recorded: IntCounterVec,
    absent_samples: IntCounter,
    command_failures: IntCounter,
    record_failures: IntCounter,
    kill_phase_errors: IntCounter,
    live_pods: IntGauge,
    dedup_set_size: IntGauge,
}

impl CollectorMetricsInner {
    fn new() -> Self {
        Self {
            cycle_duration_seconds: register_histogram!(
                "podwatch_cycle_duration_seconds",
                "Time spent running one reconciliation cycle",
                CYCLE_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_duration_seconds"),

            cycles: register_int_counter!(
                "podwatch_cycles_total",
                "Total number of reconciliation cycles completed"
            )
            .expect("Failed to register cycles_total"),

            rows_recorded: register_int_counter_vec!(
                "podwatch_rows_recorded_total",
                "Rows appended to the metrics log",
                &["kind"]
            )
            .expect("Failed to register rows_recorded_total"),

            absent_samples: register_int_counter!(
                "podwatch_metric_query_absent_total",
                "Metric queries that produced no value"
            )
            .expect("Failed to register metric_query_absent_total"),

            command_failures: register_int_counter!(
                "podwatch_command_failures_total",
                "Cluster commands that failed, timed out or could not be spawned"
            )
            .expect("Failed to register command_failures_total"),

            record_failures: register_int_counter!(
                "podwatch_record_failures_total",
                "Rows that could not be written to the metrics log"
            )
            .expect("Failed to register record_failures_total"),

            kill_phase_errors: register_int_counter!(
                "podwatch_kill_phase_errors_total",
                "Cycles whose kill-event phase was aborted by a malformed event list"
            )
            .expect("Failed to register kill_phase_errors_total"),

            live_pods: register_int_gauge!(
                "podwatch_live_pods",
                "Workload pods seen in the most recent cycle"
            )
            .expect("Failed to register live_pods"),

            dedup_set_size: register_int_gauge!(
                "podwatch_dedup_set_size",
                "Pods already recorded as killed in this process"
            )
            .expect("Failed to register dedup_set_size"),
        }
    }
}

/// Collector metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct CollectorMetrics {
    _private: (),
}

impl Default for CollectorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(CollectorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &CollectorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record the outcome of a finished cycle
    pub fn observe_cycle(&self, report: &CycleReport) {
        let inner = self.inner();
        inner
            .cycle_duration_seconds
            .observe(report.duration_ms as f64 / 1000.0);
        inner.cycles.inc();
        inner
            .rows_recorded
            .with_label_values(&["live"])
            .inc_by(report.live_rows as u64);
        inner
            .rows_recorded
            .with_label_values(&["killed"])
            .inc_by(report.killed_rows as u64);
        inner.record_failures.inc_by(report.record_failures as u64);
        inner.live_pods.set(report.live_pods as i64);
        if report.kill_phase_error.is_some() {
            inner.kill_phase_errors.inc();
        }
    }

    pub fn inc_absent_samples(&self) {
        self.inner().absent_samples.inc();
    }

    pub fn inc_command_failures(&self) {
        self.inner().command_failures.inc();
    }

    pub fn set_dedup_set_size(&self, size: usize) {
        self.inner().dedup_set_size.set(size as i64);
    }
}

/// Structured logger for collector events
///
/// Provides consistent JSON-formatted logging for cycles, kills,
/// and process lifecycle.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    /// Log a completed cycle
    pub fn log_cycle(&self, report: &CycleReport) {
        info!(
            event = "cycle_completed",
            node = %self.node_name,
            started_at = %report.started_at,
            live_pods = report.live_pods,
            live_rows = report.live_rows,
            killed_rows = report.killed_rows,
            skipped_kills = report.skipped_kills,
            absent_samples = report.absent_samples,
            record_failures = report.record_failures,
            duration_ms = report.duration_ms,
            "Reconciliation cycle complete"
        );
    }

    /// Log a newly recorded pod kill
    pub fn log_kill_recorded(&self, pod_name: &str, kill_instant: i64) {
        info!(
            event = "kill_recorded",
            node = %self.node_name,
            pod_name = %pod_name,
            kill_instant = kill_instant,
            "Recorded killed pod"
        );
    }

    /// Log an aborted kill phase
    pub fn log_kill_phase_failed(&self, error: &str) {
        warn!(
            event = "kill_phase_failed",
            node = %self.node_name,
            error = %error,
            "Rejected cluster event list, skipping kill processing this cycle"
        );
    }

    /// Log collector startup
    pub fn log_startup(&self, version: &str, output_path: &str) {
        info!(
            event = "agent_started",
            node = %self.node_name,
            agent_version = %version,
            output_path = %output_path,
            "Podwatch agent started"
        );
    }

    /// Log collector shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Podwatch agent shutting down"
        );
    }
}
