//! Job pipelines
//!
//! A pipeline is an ordered list of [`Stage`]s run against a per-job state
//! value. [`PipelineRunner`] owns the job lifecycle around the stages:
//! - PROCESSING at 10% before the first stage
//! - progress reported at each stage's span boundaries
//! - each stage bounded by the configured stage timeout
//! - required stage failure (or a panic) marks the job FAILED
//! - optional stage failure is logged, announced as `StageSkipped`, and skipped
//! - COMPLETED at 100% with the result built by the pipeline's finish step

pub mod analysis;
pub mod design;
pub mod executor;
#[cfg(test)]
pub(crate) mod test_support;

pub use executor::JobExecutor;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use roomai_common::config::PipelineConfig;
use roomai_common::events::{EventBus, RoomAiEvent};
use roomai_common::JobKind;
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::{JobRecord, JobUpdate};
use crate::providers::{ProviderError, Providers};
use crate::storage::LocalStorage;
use crate::store::JobStore;

/// Progress a job shows once it is picked up
pub const STARTED_PROGRESS: u8 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageRequirement {
    /// Failure fails the job
    Required,
    /// Failure is logged and the pipeline continues
    Optional,
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Stage timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("Store error: {0}")]
    Store(#[from] roomai_common::Error),

    #[error("{0}")]
    Invalid(String),
}

/// One step of a pipeline over state `S`
#[async_trait]
pub trait Stage<S: Send>: Send + Sync {
    fn name(&self) -> &'static str;

    fn requirement(&self) -> StageRequirement;

    /// Progress at stage start and after it finishes
    fn progress_span(&self) -> (u8, u8);

    /// Operation text while the stage runs
    fn running_message(&self) -> &'static str;

    /// Operation text once the stage is done
    fn done_message(&self) -> &'static str;

    async fn run(&self, state: &mut S, progress: &ProgressReporter) -> Result<(), StageError>;
}

/// Writes job progress to the store and mirrors it on the event bus
#[derive(Clone)]
pub struct ProgressReporter {
    store: Arc<dyn JobStore>,
    events: EventBus,
    job_id: Uuid,
    kind: JobKind,
}

impl ProgressReporter {
    pub fn new(store: Arc<dyn JobStore>, events: EventBus, job_id: Uuid, kind: JobKind) -> Self {
        Self {
            store,
            events,
            job_id,
            kind,
        }
    }

    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    pub async fn report(
        &self,
        progress: u8,
        stage: impl Into<String>,
    ) -> Result<JobRecord, StageError> {
        let record = self
            .store
            .update(self.job_id, JobUpdate::progress(progress, stage))
            .await?;
        self.emit_progress(&record);
        Ok(record)
    }

    fn emit_progress(&self, record: &JobRecord) {
        self.events.emit_lossy(RoomAiEvent::JobProgress {
            job_id: record.id,
            kind: record.kind,
            status: record.status,
            progress: record.progress,
            stage: record.stage.clone(),
            timestamp: Utc::now(),
        });
    }

    fn skipped(&self, stage: &str, reason: &str) {
        self.events.emit_lossy(RoomAiEvent::StageSkipped {
            job_id: self.job_id,
            kind: self.kind,
            stage: stage.to_string(),
            reason: reason.to_string(),
            timestamp: Utc::now(),
        });
    }
}

/// Everything a pipeline needs besides its own input
#[derive(Clone)]
pub struct PipelineContext {
    pub store: Arc<dyn JobStore>,
    pub events: EventBus,
    pub providers: Providers,
    pub storage: LocalStorage,
    pub settings: PipelineConfig,
}

impl PipelineContext {
    pub fn runner(&self) -> PipelineRunner {
        PipelineRunner::new(
            self.store.clone(),
            self.events.clone(),
            Duration::from_secs(self.settings.stage_timeout_secs),
        )
    }
}

/// Failure of a pipeline run: the stage (if any) and the message
type RunFailure = (Option<&'static str>, String);

pub struct PipelineRunner {
    store: Arc<dyn JobStore>,
    events: EventBus,
    stage_timeout: Duration,
}

impl PipelineRunner {
    pub fn new(store: Arc<dyn JobStore>, events: EventBus, stage_timeout: Duration) -> Self {
        Self {
            store,
            events,
            stage_timeout,
        }
    }

    /// Run `stages` over `state` and record the outcome on the job
    ///
    /// Returns the job as stored after the terminal update.
    pub async fn run<S, F>(
        &self,
        job_id: Uuid,
        kind: JobKind,
        mut state: S,
        stages: Vec<Box<dyn Stage<S>>>,
        finish: F,
    ) -> roomai_common::Result<JobRecord>
    where
        S: Send,
        F: FnOnce(S) -> Result<Value, StageError> + Send,
    {
        let started = Instant::now();
        let reporter = ProgressReporter::new(self.store.clone(), self.events.clone(), job_id, kind);

        let record = match self
            .store
            .update(job_id, JobUpdate::processing(STARTED_PROGRESS, "Processing"))
            .await
        {
            Ok(record) => record,
            Err(e) => {
                let message = format!("Failed to start job: {}", e);
                return self.fail_after_store_error(job_id, kind, message, e).await;
            }
        };
        reporter.emit_progress(&record);
        info!(job_id = %job_id, kind = %kind, stages = stages.len(), "Pipeline started");

        let work = async {
            self.run_stages(&reporter, &mut state, &stages).await?;
            finish(state).map_err(|e| (None, e.to_string()))
        };

        let outcome = match AssertUnwindSafe(work).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => Err((None, format!("Pipeline panicked: {}", panic_message(&*panic)))),
        };

        match outcome {
            Ok(result) => {
                let record = match self.store.update(job_id, JobUpdate::completed(result)).await {
                    Ok(record) => record,
                    Err(e) => {
                        let message = format!("Failed to store result: {}", e);
                        return self.fail_after_store_error(job_id, kind, message, e).await;
                    }
                };
                let duration_ms = started.elapsed().as_millis() as u64;
                reporter.emit_progress(&record);
                self.events.emit_lossy(RoomAiEvent::JobCompleted {
                    job_id,
                    kind,
                    duration_ms,
                    timestamp: Utc::now(),
                });
                info!(job_id = %job_id, kind = %kind, duration_ms, "Pipeline completed");
                Ok(record)
            }
            Err((stage, message)) => self.fail(job_id, kind, stage, message).await,
        }
    }

    /// Try to leave the job FAILED after a lifecycle write was rejected
    ///
    /// Returns the original store error when the FAILED write is rejected too.
    async fn fail_after_store_error(
        &self,
        job_id: Uuid,
        kind: JobKind,
        message: String,
        cause: roomai_common::Error,
    ) -> roomai_common::Result<JobRecord> {
        match self.fail(job_id, kind, None, message).await {
            Ok(record) => Ok(record),
            Err(e) => {
                error!(job_id = %job_id, error = %e, "Could not mark job failed");
                Err(cause)
            }
        }
    }

    /// Mark a job FAILED unless it already reached a terminal state
    ///
    /// Used for pipelines that ended without recording an outcome.
    pub async fn fail_unfinished(&self, job_id: Uuid, kind: JobKind, message: String) {
        if let Ok(Some(job)) = self.store.get(job_id).await {
            if job.is_terminal() {
                return;
            }
        }
        if let Err(e) = self.fail(job_id, kind, None, message).await {
            error!(job_id = %job_id, error = %e, "Could not mark unfinished job failed");
        }
    }

    /// Mark a job FAILED and announce it
    pub async fn fail(
        &self,
        job_id: Uuid,
        kind: JobKind,
        stage: Option<&str>,
        message: String,
    ) -> roomai_common::Result<JobRecord> {
        error!(job_id = %job_id, kind = %kind, stage = ?stage, error = %message, "Pipeline failed");
        let record = self.store.update(job_id, JobUpdate::failed(message.clone())).await?;
        self.events.emit_lossy(RoomAiEvent::JobFailed {
            job_id,
            kind,
            stage: stage.map(str::to_string),
            error: message,
            timestamp: Utc::now(),
        });
        Ok(record)
    }

    async fn run_stages<S: Send>(
        &self,
        reporter: &ProgressReporter,
        state: &mut S,
        stages: &[Box<dyn Stage<S>>],
    ) -> Result<(), RunFailure> {
        for stage in stages {
            let name = stage.name();
            let (start, done) = stage.progress_span();
            reporter
                .report(start, stage.running_message())
                .await
                .map_err(|e| (Some(name), e.to_string()))?;

            let run = stage.run(state, reporter);
            let result = match tokio::time::timeout(self.stage_timeout, run).await {
                Ok(result) => result,
                Err(_) => Err(StageError::Timeout(self.stage_timeout)),
            };

            match result {
                Ok(()) => {
                    reporter
                        .report(done, stage.done_message())
                        .await
                        .map_err(|e| (Some(name), e.to_string()))?;
                }
                Err(e) if stage.requirement() == StageRequirement::Optional => {
                    warn!(
                        job_id = %reporter.job_id(),
                        stage = name,
                        error = %e,
                        "Optional stage failed, continuing"
                    );
                    reporter.skipped(name, &e.to_string());
                    reporter
                        .report(done, format!("{} skipped", name))
                        .await
                        .map_err(|e| (Some(name), e.to_string()))?;
                }
                Err(e) => return Err((Some(name), format!("{}: {}", name, e))),
            }
        }
        Ok(())
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
