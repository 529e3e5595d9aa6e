//! Typed errors for the collector's fallible boundaries

use thiserror::Error;

/// The cluster event list could not be turned into kill events
#[derive(Error, Debug)]
pub enum EventParseError {
    #[error("event list is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("Killing event #{index} has no involved object name")]
    MissingName { index: usize },

    #[error("Killing event for pod {pod} carries no timestamp")]
    MissingTimestamp { pod: String },

    #[error("Killing event for pod {pod} has invalid timestamp {value:?}: {source}")]
    InvalidTimestamp {
        pod: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// A row could not be written to the persisted log
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("failed to open log {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write row: {0}")]
    Csv(#[from] csv::Error),

    #[error("failed to flush log: {0}")]
    Io(#[from] std::io::Error),
}

/// A metrics backend query failed; converted to an absent sample at the client boundary
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend returned HTTP {0}")]
    Status(reqwest::StatusCode),

    #[error("backend reported {error_type}: {error}")]
    Backend { error_type: String, error: String },

    #[error("sample value {0:?} is not a number")]
    InvalidValue(String),
}

/// Periodic collection could not be started
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StartError {
    #[error("periodic collection is already running")]
    AlreadyRunning,

    #[error("collection period must be greater than zero")]
    ZeroPeriod,
}
