//! In-process job store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roomai_common::{Error, JobKind, Result};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::JobStore;
use crate::models::{JobRecord, JobUpdate};

/// Jobs kept in a map behind one lock; lost on restart
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, JobRecord>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn create(&self, kind: JobKind, payload: Value) -> Result<JobRecord> {
        let job = JobRecord::new(kind, payload);
        self.jobs.write().await.insert(job.id, job.clone());
        Ok(job)
    }

    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn update(&self, id: Uuid, update: JobUpdate) -> Result<JobRecord> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Job not found: {}", id)))?;
        job.apply(update)?;
        Ok(job.clone())
    }

    async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !(job.is_terminal() && job.updated_at < cutoff));
        Ok((before - jobs.len()) as u64)
    }

    async fn count_active(&self) -> Result<u64> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|job| !job.is_terminal())
            .count() as u64)
    }

    async fn fail_interrupted(&self, error: &str) -> Result<u64> {
        let mut jobs = self.jobs.write().await;
        let mut failed = 0;
        for job in jobs.values_mut().filter(|job| !job.is_terminal()) {
            job.apply(JobUpdate::failed(error))?;
            failed += 1;
        }
        Ok(failed)
    }
}
