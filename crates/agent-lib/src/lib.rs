//! Pod metrics reconciliation library
//!
//! This crate provides the core functionality for:
//! - Listing workload pods and resolving their status via kubectl
//! - Reading pod kill events and reconstructing metrics at kill time
//! - Querying a Prometheus-compatible metrics backend
//! - Appending observations to a CSV log
//! - Health checks and observability

pub mod backend;
pub mod collector;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod recorder;

pub use backend::{MetricQueries, MetricsSource, PrometheusClient};
pub use error::{EventParseError, QueryError, RecorderError, StartError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{CollectorMetrics, StructuredLogger};
pub use recorder::{CsvRecorder, Recorder};
