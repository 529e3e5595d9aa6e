//! Cycle scheduling
//!
//! The scheduler owns the reconciliation cycle together with the dedup set
//! and is the only way to run a cycle. Manual runs and periodic ticks take
//! the same lock, so two cycles never overlap.

use super::{DedupSet, ReconciliationCycle};
use crate::error::StartError;
use crate::health::HealthRegistry;
use crate::models::CycleReport;
use crate::observability::{CollectorMetrics, StructuredLogger};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{sleep_until, Instant};
use tracing::info;

struct CycleState {
    cycle: ReconciliationCycle,
    dedup: DedupSet,
}

/// Drives reconciliation cycles, one at a time
pub struct Scheduler {
    state: Mutex<CycleState>,
    health: Option<HealthRegistry>,
    metrics: CollectorMetrics,
    logger: StructuredLogger,
    periodic: AtomicBool,
    shutdown: broadcast::Sender<()>,
}

impl Scheduler {
    pub fn new(cycle: ReconciliationCycle) -> Self {
        let (shutdown, _) = broadcast::channel(1);
        Self {
            state: Mutex::new(CycleState {
                cycle,
                dedup: DedupSet::new(),
            }),
            health: None,
            metrics: CollectorMetrics::new(),
            logger: StructuredLogger::new("unknown"),
            periodic: AtomicBool::new(false),
            shutdown,
        }
    }

    /// Report cycle outcomes to a health registry
    pub fn with_health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    /// Run one cycle now, waiting for any cycle in progress to finish first
    pub async fn run_once(&self) -> CycleReport {
        let report = {
            let mut state = self.state.lock().await;
            let CycleState { cycle, dedup } = &mut *state;
            let report = cycle.run(dedup).await;
            self.metrics.set_dedup_set_size(dedup.len());
            report
        };

        self.metrics.observe_cycle(&report);
        self.logger.log_cycle(&report);
        if let Some(health) = &self.health {
            health.report_cycle(&report).await;
        }
        report
    }

    /// Run one cycle on its own task and wait for its report.
    ///
    /// The cycle runs to completion even if the caller stops waiting, so a
    /// dropped request never leaves a cycle half recorded.
    pub async fn trigger(self: &Arc<Self>) -> Result<CycleReport, JoinError> {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move { scheduler.run_once().await }).await
    }

    /// Start collecting every `period` on a background task.
    ///
    /// The first cycle runs immediately. Only one periodic loop may run.
    pub fn start_periodic(self: &Arc<Self>, period: Duration) -> Result<JoinHandle<()>, StartError> {
        if period.is_zero() {
            return Err(StartError::ZeroPeriod);
        }
        if self.periodic.swap(true, Ordering::SeqCst) {
            return Err(StartError::AlreadyRunning);
        }

        let shutdown = self.shutdown.subscribe();
        let scheduler = Arc::clone(self);
        Ok(tokio::spawn(async move {
            scheduler.run_periodic(period, shutdown).await;
        }))
    }

    /// Whether a periodic loop is active
    pub fn is_periodic(&self) -> bool {
        self.periodic.load(Ordering::SeqCst)
    }

    /// Stop the periodic loop once the current cycle (if any) has finished
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(());
    }

    async fn run_periodic(&self, period: Duration, mut shutdown: broadcast::Receiver<()>) {
        info!(period_secs = period.as_secs_f64(), "Starting periodic collection");

        loop {
            let started = Instant::now();
            self.run_once().await;

            // An overrunning cycle makes the next one start immediately
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    info!("Stopping periodic collection");
                    break;
                }
                _ = sleep_until(started + period) => {}
            }
        }

        self.periodic.store(false, Ordering::SeqCst);
    }
}
