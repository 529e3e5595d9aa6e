//! One reconciliation pass
//!
//! Records every live workload pod with the cycle's timestamp, then every
//! newly observed pod kill with metrics reconstructed at the moment of death.

use super::command::{Kubectl, RESTART_COUNT};
use super::{DedupSet, EventStream, PodLister, StatusResolver, DEFAULT_POD_PREFIX};
use crate::backend::{MetricQueries, MetricsSource};
use crate::models::{
    CycleReport, KilledPodEvent, MetricKind, NodeStatus, PodMetrics, PodRecord,
};
use crate::observability::StructuredLogger;
use crate::recorder::Recorder;
use anyhow::Result;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Merges live pod state and kill events into log rows
pub struct ReconciliationCycle {
    pods: PodLister,
    status: StatusResolver,
    events: EventStream,
    kubectl: Kubectl,
    metrics: Arc<dyn MetricsSource>,
    queries: MetricQueries,
    recorder: Box<dyn Recorder>,
    logger: StructuredLogger,
}

impl ReconciliationCycle {
    pub fn new(
        kubectl: Kubectl,
        metrics: Arc<dyn MetricsSource>,
        recorder: Box<dyn Recorder>,
    ) -> Self {
        Self {
            pods: PodLister::new(kubectl.clone(), DEFAULT_POD_PREFIX),
            status: StatusResolver::new(kubectl.clone()),
            events: EventStream::new(kubectl.clone()),
            kubectl,
            metrics,
            queries: MetricQueries::default(),
            recorder,
            logger: StructuredLogger::new("unknown"),
        }
    }

    /// Run one cycle stamped with the current time
    pub async fn run(&mut self, dedup: &mut DedupSet) -> CycleReport {
        self.run_at(Utc::now(), dedup).await
    }

    /// Run one cycle; every live-pod row carries `now`
    pub async fn run_at(&mut self, now: DateTime<Utc>, dedup: &mut DedupSet) -> CycleReport {
        let start = Instant::now();
        let mut report = CycleReport::new(now);

        let pods = self.pods.list().await;
        report.live_pods = pods.len();

        for pod in &pods {
            let record = self.observe_live(pod, now).await;
            report.total_samples += MetricKind::ALL.len();
            report.absent_samples += record.metrics.absent_count();

            match self.recorder.append(&record) {
                Ok(()) => report.live_rows += 1,
                Err(e) => {
                    report.record_failures += 1;
                    warn!(pod_name = %pod, error = %e, "Failed to record live pod");
                }
            }
        }

        match self.events.recent_kills().await {
            Ok(kills) => {
                for kill in kills {
                    if dedup.already_recorded(&kill.pod_name) {
                        report.skipped_kills += 1;
                        continue;
                    }

                    let record = self.observe_killed(&kill, now).await;
                    report.total_samples += MetricKind::ALL.len();
                    report.absent_samples += record.metrics.absent_count();

                    match self.recorder.append(&record) {
                        Ok(()) => {
                            dedup.mark_recorded(kill.pod_name.clone());
                            report.killed_rows += 1;
                            self.logger
                                .log_kill_recorded(&kill.pod_name, kill.kill_instant);
                        }
                        // Not marked, so the next cycle tries again
                        Err(e) => {
                            report.record_failures += 1;
                            warn!(pod_name = %kill.pod_name, error = %e, "Failed to record killed pod");
                        }
                    }
                }
            }
            Err(e) => {
                let error = e.to_string();
                self.logger.log_kill_phase_failed(&error);
                report.kill_phase_error = Some(error);
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        report
    }

    async fn observe_live(&self, pod: &str, now: DateTime<Utc>) -> PodRecord {
        let node_status = self.status.resolve(pod).await;
        let metrics = self.sample(pod, None).await;
        let restart_count = self.restart_count(pod).await;

        PodRecord {
            pod_name: pod.to_string(),
            timestamp: now,
            metrics,
            node_status,
            restart_count,
        }
    }

    async fn observe_killed(&self, kill: &KilledPodEvent, now: DateTime<Utc>) -> PodRecord {
        let metrics = self.sample(&kill.pod_name, Some(kill.kill_instant)).await;
        // Instants come from parsed RFC 3339 timestamps and are always in range
        let timestamp = Utc
            .timestamp_opt(kill.kill_instant, 0)
            .single()
            .unwrap_or(now);

        PodRecord {
            pod_name: kill.pod_name.clone(),
            timestamp,
            metrics,
            node_status: NodeStatus::Killed,
            // The pod is gone; no live restart count exists
            restart_count: Some(0),
        }
    }

    async fn sample(&self, pod: &str, at: Option<i64>) -> PodMetrics {
        let query = |kind| {
            let expression = self.queries.expression(kind, pod);
            async move { self.metrics.query(&expression, at).await }
        };

        let metrics = PodMetrics {
            memory_usage: query(MetricKind::MemoryUsage).await,
            network_latency: query(MetricKind::NetworkLatency).await,
            packet_loss: query(MetricKind::PacketLoss).await,
            cpu_load: query(MetricKind::CpuLoad).await,
            api_latency: query(MetricKind::ApiLatency).await,
            request_errors: query(MetricKind::RequestErrors).await,
            disk_io: query(MetricKind::DiskIo).await,
        };

        let absent = metrics.absent_count();
        if absent > 0 {
            debug!(pod_name = %pod, at = ?at, absent = absent, "Some metrics unavailable");
        }
        metrics
    }

    async fn restart_count(&self, pod: &str) -> Option<u32> {
        self.kubectl
            .pod_field(pod, RESTART_COUNT)
            .await
            .and_then(|count| count.parse().ok())
    }
}

/// Builder for assembling a reconciliation cycle
pub struct ReconciliationCycleBuilder {
    kubectl: Option<Kubectl>,
    metrics: Option<Arc<dyn MetricsSource>>,
    recorder: Option<Box<dyn Recorder>>,
    pod_prefix: String,
    queries: MetricQueries,
    logger: Option<StructuredLogger>,
}

impl ReconciliationCycleBuilder {
    pub fn new() -> Self {
        Self {
            kubectl: None,
            metrics: None,
            recorder: None,
            pod_prefix: DEFAULT_POD_PREFIX.to_string(),
            queries: MetricQueries::default(),
            logger: None,
        }
    }

    pub fn kubectl(mut self, kubectl: Kubectl) -> Self {
        self.kubectl = Some(kubectl);
        self
    }

    pub fn metrics(mut self, metrics: Arc<dyn MetricsSource>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn recorder(mut self, recorder: Box<dyn Recorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    pub fn pod_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.pod_prefix = prefix.into();
        self
    }

    pub fn queries(mut self, queries: MetricQueries) -> Self {
        self.queries = queries;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn build(self) -> Result<ReconciliationCycle> {
        let kubectl = self
            .kubectl
            .ok_or_else(|| anyhow::anyhow!("Kubectl is required"))?;
        let metrics = self
            .metrics
            .ok_or_else(|| anyhow::anyhow!("Metrics source is required"))?;
        let recorder = self
            .recorder
            .ok_or_else(|| anyhow::anyhow!("Recorder is required"))?;

        let mut cycle = ReconciliationCycle::new(kubectl.clone(), metrics, recorder);
        cycle.pods = PodLister::new(kubectl, self.pod_prefix);
        cycle.queries = self.queries;
        if let Some(logger) = self.logger {
            cycle.logger = logger;
        }
        Ok(cycle)
    }
}

impl Default for ReconciliationCycleBuilder {
    fn default() -> Self {
        Self::new()
    }
}
