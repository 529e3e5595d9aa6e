//! Pod metrics reconciliation
//!
//! This module reads live pod state and pod kill events from the cluster via
//! `kubectl`, samples per-pod metrics from the metrics backend, and appends
//! one row per observation to the log. Every data source may fail without
//! aborting a cycle.

mod command;
mod cycle;
mod dedup;
mod events;
mod pods;
mod scheduler;
mod status;

#[cfg(test)]
pub(crate) mod testing;


pub use command::{CommandRunner, Kubectl, ProcessRunner};
pub use cycle::{ReconciliationCycle, ReconciliationCycleBuilder};
pub use dedup::DedupSet;
pub use events::{parse_kill_events, EventStream};
pub use pods::{PodLister, DEFAULT_POD_PREFIX};
pub use scheduler::Scheduler;
pub use status::StatusResolver;
