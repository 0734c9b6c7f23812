//! HTTP API handlers for roomai-api
//!
//! Job submission endpoints validate input, persist a PENDING job, hand the
//! pipeline to the executor and return immediately. Clients then poll the
//! status endpoints or follow the SSE stream.

pub mod analysis;
pub mod design;
pub mod furniture;
pub mod health;
pub mod sse;

pub use analysis::analysis_routes;
pub use design::design_routes;
pub use furniture::furniture_routes;
pub use health::health_routes;
pub use sse::job_events;

use axum::Json;
use chrono::Utc;
use roomai_common::events::RoomAiEvent;
use roomai_common::{JobKind, JobStatus};
use serde::Serialize;
use serde_json::{json, Value};
use std::future::Future;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::JobRecord;
use crate::pipeline::PipelineContext;
use crate::AppState;

/// Response of the job submission endpoints
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub id: Uuid,
    pub status: JobStatus,
    pub message: String,
}

/// Persist a new job and start its pipeline in the background
pub(crate) async fn submit_job<F, Fut>(
    state: &AppState,
    kind: JobKind,
    payload: Value,
    pipeline: F,
) -> ApiResult<JobRecord>
where
    F: FnOnce(PipelineContext, Uuid) -> Fut,
    Fut: Future<Output = roomai_common::Result<()>> + Send + 'static,
{
    let job = state.store.create(kind, payload).await?;

    tracing::info!(job_id = %job.id, kind = %kind, "Job created");
    state.event_bus.emit_lossy(RoomAiEvent::JobCreated {
        job_id: job.id,
        kind,
        timestamp: Utc::now(),
    });

    state
        .executor
        .spawn(job.id, kind, pipeline(state.pipeline_context(), job.id));

    Ok(job)
}

/// Look up a job of `kind` by its path id
///
/// Ids that are not UUIDs cannot name a job and are reported as not found.
pub(crate) async fn find_job(
    state: &AppState,
    raw_id: &str,
    kind: JobKind,
) -> ApiResult<JobRecord> {
    let label = match kind {
        JobKind::Analysis => "Analysis",
        JobKind::Design => "Design",
    };
    let not_found = || ApiError::NotFound(format!("{} job not found: {}", label, raw_id));
    let job_id = Uuid::parse_str(raw_id.trim()).map_err(|_| not_found())?;
    state
        .store
        .get(job_id)
        .await?
        .filter(|job| job.kind == kind)
        .ok_or_else(not_found)
}

/// GET /
pub async fn root() -> Json<Value> {
    Json(json!({
        "message": "Welcome to RoomAI API",
        "module": "roomai-api",
        "version": env!("CARGO_PKG_VERSION"),
        "health": "/health",
    }))
}
