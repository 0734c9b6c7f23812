//! Job record and partial updates
//!
//! Every store applies updates through [`JobRecord::apply`] (or an equivalent
//! guarded SQL statement) so the lifecycle rules hold regardless of backend:
//! - status only moves forward; a terminal job is never modified again
//! - progress never decreases and reaches 100 only on completion
//! - result is present iff completed, error iff failed

use chrono::{DateTime, Utc};
use roomai_common::{Error, JobKind, JobStatus, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Progress reported by a completed job
pub const COMPLETE_PROGRESS: u8 = 100;

/// Highest progress a job may show before it completes
pub const MAX_RUNNING_PROGRESS: u8 = 99;

const DEFAULT_FAILURE_MESSAGE: &str = "Job failed without an error message";

/// Stored job (one per submission)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    pub kind: JobKind,
    pub status: JobStatus,
    /// 0-100
    pub progress: u8,
    /// Current operation description
    pub stage: String,
    /// Submission input (opaque to the store)
    pub payload: Value,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobRecord {
    /// New pending job with a fresh identifier
    pub fn new(kind: JobKind, payload: Value) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            kind,
            status: JobStatus::Pending,
            progress: 0,
            stage: "Queued".to_string(),
            payload,
            result: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Apply a partial update, validating it first
    ///
    /// On error the record is left untouched.
    pub fn apply(&mut self, update: JobUpdate) -> Result<()> {
        let resolved = update.resolve_against(self)?;
        self.apply_resolved(resolved, Utc::now());
        Ok(())
    }

    /// Write already-validated values
    pub fn apply_resolved(&mut self, resolved: ResolvedUpdate, at: DateTime<Utc>) {
        self.status = resolved.status;
        self.progress = resolved.progress;
        if let Some(stage) = resolved.stage {
            self.stage = stage;
        }
        match resolved.status {
            JobStatus::Completed => {
                self.result = resolved.result;
                self.error = None;
            }
            JobStatus::Failed => {
                self.error = resolved.error;
                self.result = None;
            }
            _ => {}
        }
        self.updated_at = at;
    }
}

/// Partial job update; unset fields keep their stored value
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub progress: Option<u8>,
    pub stage: Option<String>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// Fully validated field values an update resolves to
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedUpdate {
    pub status: JobStatus,
    pub progress: u8,
    pub stage: Option<String>,
    pub result: Option<Value>,
    pub error: Option<String>,
}

impl JobUpdate {
    /// Progress (and operation text) within the current status
    pub fn progress(progress: u8, stage: impl Into<String>) -> Self {
        Self {
            progress: Some(progress),
            stage: Some(stage.into()),
            ..Default::default()
        }
    }

    /// Enter PROCESSING
    pub fn processing(progress: u8, stage: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Processing),
            ..Self::progress(progress, stage)
        }
    }

    /// Enter COMPLETED with the job result
    pub fn completed(result: Value) -> Self {
        Self {
            status: Some(JobStatus::Completed),
            progress: Some(COMPLETE_PROGRESS),
            stage: Some("Completed".to_string()),
            result: Some(result),
            ..Default::default()
        }
    }

    /// Enter FAILED with an error message; progress stays where it was
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: Some(JobStatus::Failed),
            stage: Some("Failed".to_string()),
            error: Some(error.into()),
            ..Default::default()
        }
    }

    /// Validate this update against the current record
    ///
    /// Shared by every store backend so the rules live in one place.
    pub fn resolve_against(self, current: &JobRecord) -> Result<ResolvedUpdate> {
        if current.is_terminal() {
            return Err(Error::InvalidTransition(format!(
                "job {} is already {}",
                current.id, current.status
            )));
        }

        let status = self.status.unwrap_or(current.status);
        if !current.status.can_transition_to(status) {
            return Err(Error::InvalidTransition(format!(
                "job {} cannot move from {} to {}",
                current.id, current.status, status
            )));
        }

        if self.result.is_some() && status != JobStatus::Completed {
            return Err(Error::InvalidInput(
                "a result can only be stored together with the completed status".to_string(),
            ));
        }
        if self.error.is_some() && status != JobStatus::Failed {
            return Err(Error::InvalidInput(
                "an error can only be stored together with the failed status".to_string(),
            ));
        }

        let result = match status {
            JobStatus::Completed => Some(self.result.ok_or_else(|| {
                Error::InvalidInput("a completed job requires a result".to_string())
            })?),
            _ => None,
        };

        let error = match status {
            JobStatus::Failed => Some(
                self.error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_FAILURE_MESSAGE.to_string()),
            ),
            _ => None,
        };

        let requested = self.progress.unwrap_or(current.progress);
        let progress = if status == JobStatus::Completed {
            COMPLETE_PROGRESS
        } else {
            requested.max(current.progress).min(MAX_RUNNING_PROGRESS)
        };

        Ok(ResolvedUpdate {
            status,
            progress,
            stage: self.stage,
            result,
            error,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending() -> JobRecord {
        JobRecord::new(JobKind::Analysis, json!({"language": "en"}))
    }

    #[test]
    fn new_job_is_pending_at_zero() {
        let job = pending();
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.progress, 0);
        assert!(job.result.is_none());
        assert!(job.error.is_none());
    }

    #[test]
    fn progress_never_decreases() {
        let mut job = pending();
        job.apply(JobUpdate::processing(50, "Analyzing")).unwrap();
        job.apply(JobUpdate::progress(20, "Late report")).unwrap();
        assert_eq!(job.progress, 50);
        assert_eq!(job.stage, "Late report");
    }

    #[test]
    fn progress_capped_below_100_until_completed() {
        let mut job = pending();
        job.apply(JobUpdate::processing(100, "Almost")).unwrap();
        assert_eq!(job.progress, MAX_RUNNING_PROGRESS);

        job.apply(JobUpdate::completed(json!({"ok": true}))).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, COMPLETE_PROGRESS);
        assert_eq!(job.result, Some(json!({"ok": true})));
    }

    #[test]
    fn failure_freezes_progress_and_records_error() {
        let mut job = pending();
        job.apply(JobUpdate::processing(20, "Vision")).unwrap();
        job.apply(JobUpdate::failed("vision provider unreachable")).unwrap();

        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.progress, 20);
        assert_eq!(job.error.as_deref(), Some("vision provider unreachable"));
        assert!(job.result.is_none());
    }

    #[test]
    fn empty_failure_message_is_replaced() {
        let mut job = pending();
        job.apply(JobUpdate::failed("  ")).unwrap();
        assert_eq!(job.error.as_deref(), Some(DEFAULT_FAILURE_MESSAGE));
    }

    #[test]
    fn terminal_jobs_reject_updates_and_stay_unchanged() {
        let mut job = pending();
        job.apply(JobUpdate::processing(10, "Start")).unwrap();
        job.apply(JobUpdate::completed(json!({}))).unwrap();
        let snapshot = job.clone();

        let err = job.apply(JobUpdate::failed("late")).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
        let err = job.apply(JobUpdate::progress(10, "again")).unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
        assert_eq!(job, snapshot);
    }

    #[test]
    fn processing_cannot_return_to_pending() {
        let mut job = pending();
        job.apply(JobUpdate::processing(10, "Start")).unwrap();
        let err = job
            .apply(JobUpdate {
                status: Some(JobStatus::Pending),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition(_)));
    }

    #[test]
    fn result_without_completion_is_rejected() {
        let mut job = pending();
        let err = job
            .apply(JobUpdate {
                result: Some(json!({})),
                ..JobUpdate::processing(10, "x")
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(job.status, JobStatus::Pending);
    }

    #[test]
    fn completion_without_result_is_rejected() {
        let mut job = pending();
        let err = job
            .apply(JobUpdate {
                status: Some(JobStatus::Completed),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
