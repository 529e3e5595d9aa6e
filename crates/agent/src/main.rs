//! Podwatch agent - pod metrics reconciliation collector
//!
//! Periodically records every workload pod and every pod kill, with metrics
//! sampled from Prometheus, into an append-only CSV log.

use anyhow::{Context, Result};
use podwatch_agent::{api, config::AgentConfig};
use podwatch_lib::{
    backend::PrometheusClient,
    collector::{Kubectl, ProcessRunner, ReconciliationCycleBuilder, Scheduler},
    health::HealthRegistry,
    observability::{CollectorMetrics, StructuredLogger},
    recorder::CsvRecorder,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting podwatch-agent");

    let config = AgentConfig::load()?;
    info!(
        node_name = %config.node_name,
        prometheus_url = %config.prometheus_url,
        pod_prefix = %config.pod_prefix,
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register_all().await;

    // Registers the collector metrics with the global registry
    let _metrics = CollectorMetrics::new();

    let logger = StructuredLogger::new(&config.node_name);
    logger.log_startup(AGENT_VERSION, &config.output_path);

    let runner = Arc::new(ProcessRunner::new(Duration::from_secs(
        config.command_timeout_secs,
    )));
    let kubectl = Kubectl::new(runner)
        .binary(&config.kubectl_path)
        .namespace(config.namespace.clone());

    let backend = PrometheusClient::new(
        &config.prometheus_url,
        Duration::from_secs(config.query_timeout_secs),
    )?;

    let recorder = CsvRecorder::open(&config.output_path)
        .with_context(|| format!("Cannot open metrics log {}", config.output_path))?;

    let cycle = ReconciliationCycleBuilder::new()
        .kubectl(kubectl)
        .metrics(Arc::new(backend))
        .recorder(Box::new(recorder))
        .pod_prefix(&config.pod_prefix)
        .queries(config.queries.clone())
        .logger(logger.clone())
        .build()?;

    let scheduler = Arc::new(
        Scheduler::new(cycle)
            .with_health(health_registry.clone())
            .with_logger(logger.clone()),
    );

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        Arc::clone(&scheduler),
    ));

    // Mark agent as ready after initialization
    health_registry.set_ready(true).await;

    let mut api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let periodic = if config.autostart {
        Some(scheduler.start_periodic(Duration::from_secs(config.collection_interval_secs))?)
    } else {
        None
    };

    // Wait for shutdown signal, or for the API server to stop on its own
    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            logger.log_shutdown("SIGINT received");
        }
        result = &mut api_handle => {
            match result {
                Ok(Ok(())) => error!("API server exited"),
                Ok(Err(e)) => error!(error = %e, "API server failed"),
                Err(e) => error!(error = %e, "API server task failed"),
            }
            logger.log_shutdown("API server stopped");
        }
    }

    scheduler.shutdown();
    if let Some(handle) = periodic {
        // Lets a cycle in progress finish its rows
        if let Err(e) = handle.await {
            error!(error = %e, "Periodic collection task failed");
        }
    }
    api_handle.abort();
    info!("Shutting down");

    Ok(())
}
