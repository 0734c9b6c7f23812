//! Job persistence
//!
//! Stores are shared between HTTP handlers and running pipelines as
//! `Arc<dyn JobStore>`. Every update goes through the lifecycle rules in
//! [`JobUpdate::resolve_against`], so the two backends behave identically.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryJobStore;
pub use sqlite::SqliteJobStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roomai_common::config::{StoreBackend, TomlConfig};
use roomai_common::{JobKind, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use crate::models::{JobRecord, JobUpdate};

/// Error recorded on jobs found unfinished when the service starts
pub const INTERRUPTED_ERROR: &str = "Interrupted by restart";

/// Persistent job table
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new pending job
    async fn create(&self, kind: JobKind, payload: Value) -> Result<JobRecord>;

    /// Fetch a job; `Ok(None)` for an unknown id
    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>>;

    /// Apply a partial update atomically and return the stored record
    ///
    /// Fails with `NotFound` for an unknown id and `InvalidTransition`
    /// for a finished job.
    async fn update(&self, id: Uuid, update: JobUpdate) -> Result<JobRecord>;

    /// Delete finished jobs last updated before `cutoff`
    async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Number of pending or processing jobs
    async fn count_active(&self) -> Result<u64>;

    /// Mark every pending or processing job FAILED with `error`
    ///
    /// Run once at startup: no task from a previous process is left to
    /// finish those jobs.
    async fn fail_interrupted(&self, error: &str) -> Result<u64>;
}

/// Open the store selected by `[store] backend`
pub async fn build_store(config: &TomlConfig, root_folder: &Path) -> Result<Arc<dyn JobStore>> {
    match config.store.backend {
        StoreBackend::Memory => {
            tracing::info!("Using in-memory job store");
            Ok(Arc::new(MemoryJobStore::new()))
        }
        StoreBackend::Sqlite => {
            let path = config.database_path(root_folder);
            let store = SqliteJobStore::open(&path, config.store.max_lock_wait_ms).await?;
            tracing::info!(path = %path.display(), "Using SQLite job store");
            Ok(Arc::new(store))
        }
    }
}

/// Fail jobs left unfinished by a previous run of the service
pub async fn fail_interrupted_jobs(store: &dyn JobStore) -> Result<u64> {
    let failed = store.fail_interrupted(INTERRUPTED_ERROR).await?;
    if failed > 0 {
        tracing::warn!(jobs = failed, "Marked jobs from a previous run as failed");
    }
    Ok(failed)
}
