//! Event types for the RoomAI event system
//!
//! Job lifecycle events are broadcast on an [`EventBus`] and serialized for
//! SSE transmission to polling-averse clients.

use crate::job::{JobKind, JobStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// RoomAI event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RoomAiEvent {
    /// Job accepted and stored as pending
    JobCreated {
        job_id: Uuid,
        kind: JobKind,
        timestamp: DateTime<Utc>,
    },

    /// Job progress advanced (or its current operation text changed)
    JobProgress {
        job_id: Uuid,
        kind: JobKind,
        status: JobStatus,
        /// 0-100, never decreasing within a job
        progress: u8,
        /// Current operation description
        stage: String,
        timestamp: DateTime<Utc>,
    },

    /// An optional stage failed and the pipeline continued without it
    StageSkipped {
        job_id: Uuid,
        kind: JobKind,
        stage: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Job finished with a result
    JobCompleted {
        job_id: Uuid,
        kind: JobKind,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// Job aborted
    JobFailed {
        job_id: Uuid,
        kind: JobKind,
        /// Stage that failed, when the failure came from a stage
        stage: Option<String>,
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl RoomAiEvent {
    /// Event type name (used as the SSE `event:` field)
    pub fn event_type(&self) -> &'static str {
        match self {
            RoomAiEvent::JobCreated { .. } => "JobCreated",
            RoomAiEvent::JobProgress { .. } => "JobProgress",
            RoomAiEvent::StageSkipped { .. } => "StageSkipped",
            RoomAiEvent::JobCompleted { .. } => "JobCompleted",
            RoomAiEvent::JobFailed { .. } => "JobFailed",
        }
    }

    /// Job the event belongs to
    pub fn job_id(&self) -> Uuid {
        match self {
            RoomAiEvent::JobCreated { job_id, .. }
            | RoomAiEvent::JobProgress { job_id, .. }
            | RoomAiEvent::StageSkipped { job_id, .. }
            | RoomAiEvent::JobCompleted { job_id, .. }
            | RoomAiEvent::JobFailed { job_id, .. } => *job_id,
        }
    }
}

/// Broadcast bus for job events
///
/// Cloning is cheap; all clones share one channel.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<RoomAiEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lag and lose the oldest events once `capacity`
    /// events are buffered.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<RoomAiEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: RoomAiEvent,
    ) -> Result<usize, broadcast::error::SendError<RoomAiEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: RoomAiEvent) {
        let _ = self.tx.send(event);
    }

    /// Get the current number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Get the configured channel capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribers_receive_emitted_events() {
        let bus = EventBus::new(10);
        let mut rx = bus.subscribe();
        let job_id = Uuid::new_v4();

        let delivered = bus
            .emit(RoomAiEvent::JobCreated {
                job_id,
                kind: JobKind::Analysis,
                timestamp: Utc::now(),
            })
            .unwrap();
        assert_eq!(delivered, 1);

        let event = rx.recv().await.unwrap();
        assert_eq!(event.event_type(), "JobCreated");
        assert_eq!(event.job_id(), job_id);
    }

    #[test]
    fn emit_without_subscribers_is_an_error_but_lossy_is_not() {
        let bus = EventBus::new(10);
        let event = RoomAiEvent::JobFailed {
            job_id: Uuid::new_v4(),
            kind: JobKind::Design,
            stage: Some("concepts".to_string()),
            error: "boom".to_string(),
            timestamp: Utc::now(),
        };
        assert!(bus.emit(event.clone()).is_err());
        bus.emit_lossy(event);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.capacity(), 10);
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let event = RoomAiEvent::JobProgress {
            job_id: Uuid::nil(),
            kind: JobKind::Analysis,
            status: JobStatus::Processing,
            progress: 50,
            stage: "Room analysis complete".to_string(),
            timestamp: Utc::now(),
        };
        let json: serde_json::Value = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "JobProgress");
        assert_eq!(json["kind"], "analysis");
        assert_eq!(json["status"], "processing");
        assert_eq!(json["progress"], 50);
    }
}
