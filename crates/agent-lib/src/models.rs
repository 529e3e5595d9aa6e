//! Core data models for the pod metrics collector

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// The per-pod metrics sampled from the metrics backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    MemoryUsage,
    NetworkLatency,
    PacketLoss,
    CpuLoad,
    ApiLatency,
    RequestErrors,
    DiskIo,
}

impl MetricKind {
    /// All metric kinds, in the order queries are issued for a pod
    pub const ALL: [MetricKind; 7] = [
        MetricKind::MemoryUsage,
        MetricKind::NetworkLatency,
        MetricKind::PacketLoss,
        MetricKind::CpuLoad,
        MetricKind::ApiLatency,
        MetricKind::RequestErrors,
        MetricKind::DiskIo,
    ];

    /// Column name in the persisted log
    pub fn column(&self) -> &'static str {
        match self {
            MetricKind::MemoryUsage => "memory_usage",
            MetricKind::NetworkLatency => "network_latency",
            MetricKind::PacketLoss => "packet_loss",
            MetricKind::CpuLoad => "cpu_load",
            MetricKind::ApiLatency => "api_latency",
            MetricKind::RequestErrors => "request_errors",
            MetricKind::DiskIo => "disk_io",
        }
    }
}

/// A single scalar reading for one query, optionally anchored at a historical instant.
///
/// `value == None` means the backend had nothing to say (empty result set,
/// transport failure, unparseable payload).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub query: String,
    /// Epoch seconds the query was anchored at; `None` means "now"
    pub at: Option<i64>,
    pub value: Option<f64>,
}

impl MetricSample {
    pub fn present(query: impl Into<String>, at: Option<i64>, value: f64) -> Self {
        Self {
            query: query.into(),
            at,
            value: Some(value),
        }
    }

    pub fn absent(query: impl Into<String>, at: Option<i64>) -> Self {
        Self {
            query: query.into(),
            at,
            value: None,
        }
    }

    pub fn is_absent(&self) -> bool {
        self.value.is_none()
    }

    /// Render the value for the log, or the absence sentinel
    pub fn render(&self) -> String {
        self.value.map(|v| v.to_string()).unwrap_or_default()
    }
}

/// The seven samples taken for one pod observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodMetrics {
    pub memory_usage: MetricSample,
    pub network_latency: MetricSample,
    pub packet_loss: MetricSample,
    pub cpu_load: MetricSample,
    pub api_latency: MetricSample,
    pub request_errors: MetricSample,
    pub disk_io: MetricSample,
}

impl PodMetrics {
    pub fn get(&self, kind: MetricKind) -> &MetricSample {
        match kind {
            MetricKind::MemoryUsage => &self.memory_usage,
            MetricKind::NetworkLatency => &self.network_latency,
            MetricKind::PacketLoss => &self.packet_loss,
            MetricKind::CpuLoad => &self.cpu_load,
            MetricKind::ApiLatency => &self.api_latency,
            MetricKind::RequestErrors => &self.request_errors,
            MetricKind::DiskIo => &self.disk_io,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSample> {
        MetricKind::ALL.into_iter().map(move |kind| self.get(kind))
    }

    /// Number of samples the backend could not answer
    pub fn absent_count(&self) -> usize {
        self.iter().filter(|s| s.is_absent()).count()
    }
}

/// Lifecycle classification of a pod at observation time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeStatus {
    /// Primary container terminated, with its reason (e.g. `OOMKilled`)
    Terminated(String),
    /// Primary container waiting, with its reason (e.g. `ContainerCreating`)
    Waiting(String),
    /// Overall pod phase (`Running`, `Pending`, `Succeeded`, `Failed`)
    Phase(String),
    /// Observed through a cluster `Killing` event
    Killed,
    Unknown,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeStatus::Terminated(reason)
            | NodeStatus::Waiting(reason)
            | NodeStatus::Phase(reason) => f.write_str(reason),
            NodeStatus::Killed => f.write_str("Killed"),
            NodeStatus::Unknown => f.write_str("Unknown"),
        }
    }
}

/// One row of the persisted log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PodRecord {
    pub pod_name: String,
    pub timestamp: DateTime<Utc>,
    pub metrics: PodMetrics,
    pub node_status: NodeStatus,
    pub restart_count: Option<u32>,
}

impl PodRecord {
    /// ISO-8601 timestamp as written to the log
    pub fn timestamp_iso(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

/// A pod kill observed in the cluster event history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KilledPodEvent {
    pub pod_name: String,
    /// Seconds since the Unix epoch
    pub kill_instant: i64,
}

/// Outcome of one reconciliation cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: String,
    pub live_pods: usize,
    pub live_rows: usize,
    pub killed_rows: usize,
    pub skipped_kills: usize,
    pub absent_samples: usize,
    pub total_samples: usize,
    pub record_failures: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kill_phase_error: Option<String>,
    pub duration_ms: u64,
}

impl CycleReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at: started_at.to_rfc3339_opts(SecondsFormat::Millis, true),
            ..Default::default()
        }
    }

    /// True when samples were requested and none of them came back
    pub fn backend_silent(&self) -> bool {
        self.total_samples > 0 && self.absent_samples == self.total_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_status_display() {
        assert_eq!(
            NodeStatus::Terminated("OOMKilled".to_string()).to_string(),
            "OOMKilled"
        );
        assert_eq!(
            NodeStatus::Waiting("ContainerCreating".to_string()).to_string(),
            "ContainerCreating"
        );
        assert_eq!(NodeStatus::Phase("Running".to_string()).to_string(), "Running");
        assert_eq!(NodeStatus::Killed.to_string(), "Killed");
        assert_eq!(NodeStatus::Unknown.to_string(), "Unknown");
    }

    #[test]
    fn test_metric_sample_render() {
        assert_eq!(MetricSample::present("up", None, 0.25).render(), "0.25");
        assert_eq!(MetricSample::present("up", None, 3.0).render(), "3");
        assert_eq!(MetricSample::absent("up", Some(10)).render(), "");
    }

    #[test]
    fn test_cycle_report_backend_silent() {
        let mut report = CycleReport::default();
        assert!(!report.backend_silent());

        report.total_samples = 7;
        report.absent_samples = 7;
        assert!(report.backend_silent());

        report.absent_samples = 6;
        assert!(!report.backend_silent());
    }
}
