//! In-memory collaborators for collector tests

use super::CommandRunner;
use crate::backend::MetricsSource;
use crate::error::RecorderError;
use crate::models::{MetricSample, PodRecord};
use crate::recorder::Recorder;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Command runner answering from a table keyed by the space-joined argv
#[derive(Default)]
pub struct FakeRunner {
    responses: Mutex<HashMap<String, String>>,
    calls: Mutex<Vec<(String, String)>>,
    delay: Mutex<Option<Duration>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, args: &str, output: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(args.to_string(), output.to_string());
    }

    /// Make every call take `delay` before answering
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(_, a)| a.clone()).collect()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
    }

    /// Highest number of calls that were ever running at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, program: &str, args: &[String]) -> Option<String> {
        let key = args.join(" ");
        self.calls
            .lock()
            .unwrap()
            .push((program.to_string(), key.clone()));

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.responses.lock().unwrap().get(&key).cloned()
    }
}

/// Metrics source answering from a table keyed by expression
#[derive(Default)]
pub struct FakeMetrics {
    values: Mutex<HashMap<String, f64>>,
    calls: Mutex<Vec<(String, Option<i64>)>>,
}

impl FakeMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, expression: &str, value: f64) {
        self.values
            .lock()
            .unwrap()
            .insert(expression.to_string(), value);
    }

    pub fn calls(&self) -> Vec<(String, Option<i64>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetricsSource for FakeMetrics {
    async fn query(&self, expression: &str, at: Option<i64>) -> MetricSample {
        self.calls
            .lock()
            .unwrap()
            .push((expression.to_string(), at));
        match self.values.lock().unwrap().get(expression) {
            Some(value) => MetricSample::present(expression, at, *value),
            None => MetricSample::absent(expression, at),
        }
    }
}

/// Recorder keeping rows in memory; clones share the same rows
#[derive(Clone, Default)]
pub struct MemoryRecorder {
    rows: Arc<Mutex<Vec<PodRecord>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> Vec<PodRecord> {
        self.rows.lock().unwrap().clone()
    }

    /// Make subsequent appends fail with an I/O error
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

impl Recorder for MemoryRecorder {
    fn append(&mut self, record: &PodRecord) -> Result<(), RecorderError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(RecorderError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "disk full",
            )));
        }
        self.rows.lock().unwrap().push(record.clone());
        Ok(())
    }
}
