//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// "ok", or "degraded" when the job store cannot be queried
    pub status: String,
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    pub uptime_seconds: u64,
    /// Pending plus processing jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_jobs: Option<u64>,
    /// Pipelines currently holding an executor slot
    pub running_pipelines: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = uptime.num_seconds().max(0) as u64;

    let (status, active_jobs, last_error) = match state.store.count_active().await {
        Ok(count) => ("ok", Some(count), None),
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not count active jobs");
            ("degraded", None, Some(e.to_string()))
        }
    };

    Json(HealthResponse {
        status: status.to_string(),
        module: "roomai-api".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        active_jobs,
        running_pipelines: state.executor.running(),
        last_error,
    })
}

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
