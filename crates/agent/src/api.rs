//! HTTP API for collection triggers, health checks and Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use podwatch_lib::{
    collector::Scheduler,
    error::StartError,
    health::{ComponentStatus, HealthRegistry},
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub scheduler: Arc<Scheduler>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, scheduler: Arc<Scheduler>) -> Self {
        Self {
            health_registry,
            scheduler,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StartRequest {
    pub period_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
    pub started: bool,
    pub period_secs: u64,
    pub message: String,
}

/// Health check response - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still collecting
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, Vec::new()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Run one cycle and return its report. Waits for a cycle in progress.
async fn collect(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.scheduler.trigger().await {
        Ok(report) => Json(report).into_response(),
        Err(e) => {
            error!(error = %e, "Collection cycle task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

async fn start_periodic(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> impl IntoResponse {
    let period = Duration::from_secs(request.period_secs);

    let (status_code, started, message) = match state.scheduler.start_periodic(period) {
        Ok(_) => {
            info!(period_secs = request.period_secs, "Periodic collection requested");
            (StatusCode::ACCEPTED, true, "Periodic collection started".to_string())
        }
        Err(e @ StartError::AlreadyRunning) => (StatusCode::CONFLICT, false, e.to_string()),
        Err(e @ StartError::ZeroPeriod) => (StatusCode::BAD_REQUEST, false, e.to_string()),
    };

    (
        status_code,
        Json(StartResponse {
            started,
            period_secs: request.period_secs,
            message,
        }),
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/collect", post(collect))
        .route("/collect/periodic", post(start_periodic))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
