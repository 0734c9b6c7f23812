//! In-process job executor
//!
//! Pipelines run as tokio tasks. A semaphore bounds how many run at once;
//! jobs beyond the limit stay PENDING until a permit frees up.
//!
//! A pipeline that returns an error or panics without recording an outcome
//! has its job marked FAILED through the recovery runner.

use futures::FutureExt;
use roomai_common::JobKind;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use uuid::Uuid;

use super::{panic_message, PipelineRunner};

#[derive(Clone)]
pub struct JobExecutor {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    recovery: Option<Arc<PipelineRunner>>,
}

impl JobExecutor {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            recovery: None,
        }
    }

    /// Mark jobs FAILED through `runner` when their pipeline ends abnormally
    pub fn with_recovery(mut self, runner: PipelineRunner) -> Self {
        self.recovery = Some(Arc::new(runner));
        self
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Pipelines currently holding a permit
    pub fn running(&self) -> usize {
        self.max_concurrent - self.semaphore.available_permits()
    }

    /// Spawn `pipeline` for `job_id` once a permit is available
    pub fn spawn<F>(&self, job_id: Uuid, kind: JobKind, pipeline: F) -> JoinHandle<()>
    where
        F: Future<Output = roomai_common::Result<()>> + Send + 'static,
    {
        let semaphore = self.semaphore.clone();
        let recovery = self.recovery.clone();
        tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    error!(job_id = %job_id, error = %e, "Executor closed, job not started");
                    return;
                }
            };
            debug!(job_id = %job_id, "Pipeline task started");

            let message = match AssertUnwindSafe(pipeline).catch_unwind().await {
                Ok(Ok(())) => return,
                Ok(Err(e)) => e.to_string(),
                Err(panic) => format!("Pipeline panicked: {}", panic_message(&*panic)),
            };
            error!(job_id = %job_id, error = %message, "Pipeline task failed");

            if let Some(runner) = recovery {
                runner.fail_unfinished(job_id, kind, message).await;
            }
        })
    }
}
