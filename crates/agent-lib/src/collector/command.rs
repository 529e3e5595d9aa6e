//! External command execution
//!
//! All cluster state is read by shelling out to `kubectl`. Any failure
//! (spawn error, non-zero exit, timeout, non-UTF-8 output) becomes `None`.

use crate::observability::CollectorMetrics;
use async_trait::async_trait;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Runs an external program and returns its trimmed stdout
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> Option<String>;
}

/// Runs commands as child processes with a timeout
pub struct ProcessRunner {
    timeout: Duration,
    metrics: CollectorMetrics,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            metrics: CollectorMetrics::new(),
        }
    }

    fn failed(&self, program: &str, args: &[String], reason: &str) -> Option<String> {
        self.metrics.inc_command_failures();
        debug!(
            program = %program,
            args = %args.join(" "),
            reason = %reason,
            "Command failed"
        );
        None
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Option<String> {
        let child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();

        let child = match child {
            Ok(child) => child,
            Err(e) => return self.failed(program, args, &format!("spawn: {}", e)),
        };

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return self.failed(program, args, &format!("wait: {}", e)),
            // Dropping the future drops the child, which kills it
            Err(_) => return self.failed(program, args, "timed out"),
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return self.failed(
                program,
                args,
                &format!("exit {}: {}", output.status, stderr.trim()),
            );
        }

        match String::from_utf8(output.stdout) {
            Ok(stdout) => Some(stdout.trim().to_string()),
            Err(_) => self.failed(program, args, "stdout is not UTF-8"),
        }
    }
}

/// JSONPath of the primary container's termination reason
pub const TERMINATED_REASON: &str = "{.status.containerStatuses[0].state.terminated.reason}";
/// JSONPath of the primary container's waiting reason
pub const WAITING_REASON: &str = "{.status.containerStatuses[0].state.waiting.reason}";
/// JSONPath of the pod phase
pub const PHASE: &str = "{.status.phase}";
/// JSONPath of the primary container's restart count
pub const RESTART_COUNT: &str = "{.status.containerStatuses[0].restartCount}";

/// Builds the cluster commands the collector depends on
#[derive(Clone)]
pub struct Kubectl {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    namespace: Option<String>,
}

impl Kubectl {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            binary: "kubectl".to_string(),
            namespace: None,
        }
    }

    /// Use a specific kubectl binary
    pub fn binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Restrict every command to a namespace
    pub fn namespace(mut self, namespace: Option<String>) -> Self {
        self.namespace = namespace;
        self
    }

    async fn kubectl(&self, args: &[&str]) -> Option<String> {
        let mut argv: Vec<String> = args.iter().map(|a| a.to_string()).collect();
        if let Some(ns) = &self.namespace {
            argv.push("-n".to_string());
            argv.push(ns.clone());
        }
        self.runner.run(&self.binary, &argv).await
    }

    /// All pod names, one per line
    pub async fn pod_names(&self) -> Option<String> {
        self.kubectl(&[
            "get",
            "pods",
            "--no-headers",
            "-o",
            "custom-columns=NAME:.metadata.name",
        ])
        .await
    }

    /// A single field of one pod, selected by JSONPath
    pub async fn pod_field(&self, pod: &str, jsonpath: &str) -> Option<String> {
        let output = format!("jsonpath={}", jsonpath);
        self.kubectl(&["get", "pod", pod, "-o", &output]).await
    }

    /// The cluster event list as JSON
    pub async fn events_json(&self) -> Option<String> {
        self.kubectl(&["get", "events", "-o", "json"]).await
    }
}
