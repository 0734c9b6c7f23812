//! Server-Sent Events for job progress

use axum::{
    extract::{Query, State},
    response::sse::{Event, Sse},
};
use futures::stream::Stream;
use serde::Deserialize;
use std::convert::Infallible;
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct JobEventsQuery {
    /// Only stream events of this job
    pub job_id: Option<Uuid>,
}

/// GET /api/v1/jobs/events
///
/// Streams JobCreated, JobProgress, StageSkipped, JobCompleted and JobFailed
/// with a 15 second heartbeat.
pub async fn job_events(
    State(state): State<AppState>,
    Query(query): Query<JobEventsQuery>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    roomai_common::sse::job_event_stream(&state.event_bus, query.job_id)
}
