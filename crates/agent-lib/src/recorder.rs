//! Append-only CSV log of pod observations

use crate::error::RecorderError;
use crate::models::PodRecord;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::Path;
use tracing::info;

/// Column order of the persisted log
pub const COLUMNS: [&str; 11] = [
    "podName",
    "timestamp",
    "memory_usage",
    "network_latency",
    "packet_loss",
    "node_status",
    "disk_io",
    "cpu_load",
    "api_latency",
    "request_errors",
    "restart_count",
];

/// Sink for finished pod records
pub trait Recorder: Send + Sync {
    /// Append one row. Prior rows are never rewritten.
    fn append(&mut self, record: &PodRecord) -> Result<(), RecorderError>;
}

/// A record flattened to the log's column schema.
///
/// Field order is the column order.
#[derive(Debug, Serialize)]
struct LogRow {
    #[serde(rename = "podName")]
    pod_name: String,
    timestamp: String,
    memory_usage: String,
    network_latency: String,
    packet_loss: String,
    node_status: String,
    disk_io: String,
    cpu_load: String,
    api_latency: String,
    request_errors: String,
    restart_count: String,
}

impl From<&PodRecord> for LogRow {
    fn from(record: &PodRecord) -> Self {
        let m = &record.metrics;
        Self {
            pod_name: record.pod_name.clone(),
            timestamp: record.timestamp_iso(),
            memory_usage: m.memory_usage.render(),
            network_latency: m.network_latency.render(),
            packet_loss: m.packet_loss.render(),
            node_status: record.node_status.to_string(),
            disk_io: m.disk_io.render(),
            cpu_load: m.cpu_load.render(),
            api_latency: m.api_latency.render(),
            request_errors: m.request_errors.render(),
            restart_count: record
                .restart_count
                .map(|n| n.to_string())
                .unwrap_or_default(),
        }
    }
}

/// CSV file recorder.
///
/// Opens the log in append mode and writes the header only when the file is
/// new or empty, so restarts keep extending the same table.
pub struct CsvRecorder {
    writer: csv::Writer<File>,
}

impl CsvRecorder {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, RecorderError> {
        let path = path.as_ref();
        let open_err = |source| RecorderError::Open {
            path: path.display().to_string(),
            source,
        };

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(open_err)?;
        let is_empty = file.metadata().map_err(open_err)?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_empty {
            writer.write_record(COLUMNS)?;
            writer.flush()?;
            info!(path = %path.display(), "Created metrics log");
        }

        Ok(Self { writer })
    }
}

impl Recorder for CsvRecorder {
    fn append(&mut self, record: &PodRecord) -> Result<(), RecorderError> {
        self.writer.serialize(LogRow::from(record))?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{MetricSample, NodeStatus, PodMetrics};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn record(pod: &str, status: NodeStatus, restarts: Option<u32>) -> PodRecord {
        let sample = |q: &str, v: Option<f64>| MetricSample {
            query: q.to_string(),
            at: None,
            value: v,
        };
        PodRecord {
            pod_name: pod.to_string(),
            timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
            metrics: PodMetrics {
                memory_usage: sample("mem", Some(1024.0)),
                network_latency: sample("lat", Some(0.05)),
                packet_loss: sample("loss", None),
                cpu_load: sample("cpu", Some(0.5)),
                api_latency: sample("api", None),
                request_errors: sample("err", Some(0.0)),
                disk_io: sample("disk", Some(2.0)),
            },
            node_status: status,
            restart_count: restarts,
        }
    }

    #[test]
    fn test_header_and_column_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("k8s_metrics.csv");

        let mut recorder = CsvRecorder::open(&path).unwrap();
        recorder
            .append(&record("createpod-1", NodeStatus::Phase("Running".into()), Some(2)))
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "podName,timestamp,memory_usage,network_latency,packet_loss,node_status,disk_io,cpu_load,api_latency,request_errors,restart_count"
        );
        assert_eq!(
            lines[1],
            "createpod-1,2023-11-14T22:13:20.000Z,1024,0.05,,Running,2,0.5,,0,2"
        );
    }

    #[test]
    fn test_reopen_appends_without_second_header() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log.csv");

        {
            let mut recorder = CsvRecorder::open(&path).unwrap();
            recorder
                .append(&record("createpod-1", NodeStatus::Unknown, None))
                .unwrap();
        }
        {
            let mut recorder = CsvRecorder::open(&path).unwrap();
            recorder
                .append(&record("createpod-2", NodeStatus::Killed, Some(0)))
                .unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines.iter().filter(|l| l.starts_with("podName")).count(), 1);
        assert!(lines[1].starts_with("createpod-1,"));
        assert!(lines[1].ends_with(",Unknown,2,0.5,,0,"));
        assert!(lines[2].contains(",Killed,"));
        assert!(lines[2].ends_with(",0"));
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("log.csv");

        let err = CsvRecorder::open(&path).err().unwrap();
        assert!(matches!(err, RecorderError::Open { .. }));
    }
}
