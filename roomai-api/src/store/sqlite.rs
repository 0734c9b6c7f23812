//! SQLite job store
//!
//! One `jobs` table. Updates are optimistic: the new values are computed from
//! the loaded row and written with a single `UPDATE ... WHERE status = ? AND
//! progress = ?`, so a concurrent writer can never be overwritten blindly.
//! A lost race re-reads the row and tries again.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use roomai_common::{Error, JobKind, JobStatus, Result};
use serde_json::Value;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;
use uuid::Uuid;

use super::JobStore;
use crate::models::{JobRecord, JobUpdate};
use crate::utils::retry_on_lock;

const MAX_CONNECTIONS: u32 = 8;
const MAX_GUARDED_ATTEMPTS: usize = 8;

const CREATE_JOBS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS jobs (
        id TEXT PRIMARY KEY NOT NULL,
        kind TEXT NOT NULL,
        status TEXT NOT NULL,
        progress INTEGER NOT NULL DEFAULT 0,
        stage TEXT NOT NULL,
        payload TEXT NOT NULL,
        result TEXT,
        error TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    )
"#;

const CREATE_STATUS_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_jobs_status_updated ON jobs (status, updated_at)";

/// Job store backed by a SQLite file
#[derive(Clone)]
pub struct SqliteJobStore {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl SqliteJobStore {
    /// Open (creating if missing) the database at `path`
    pub async fn open(path: &Path, max_lock_wait_ms: u64) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_millis(max_lock_wait_ms.min(1000)));

        let pool = SqlitePoolOptions::new()
            .max_connections(MAX_CONNECTIONS)
            .acquire_timeout(Duration::from_millis(max_lock_wait_ms.max(1000)))
            .connect_with(options)
            .await?;

        Self::from_pool(pool, max_lock_wait_ms).await
    }

    /// Use an existing pool, creating the schema if needed
    pub async fn from_pool(pool: SqlitePool, max_lock_wait_ms: u64) -> Result<Self> {
        sqlx::query(CREATE_JOBS_TABLE).execute(&pool).await?;
        sqlx::query(CREATE_STATUS_INDEX).execute(&pool).await?;
        Ok(Self {
            pool,
            max_lock_wait_ms,
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<JobRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, kind, status, progress, stage, payload, result, error,
                   created_at, updated_at
            FROM jobs
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_job).transpose()
    }

    async fn try_update(&self, id: Uuid, update: JobUpdate) -> Result<JobRecord> {
        for _ in 0..MAX_GUARDED_ATTEMPTS {
            let mut job = self
                .fetch(id)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Job not found: {}", id)))?;

            let previous_status = job.status;
            let previous_progress = job.progress;
            let resolved = update.clone().resolve_against(&job)?;
            job.apply_resolved(resolved, Utc::now());

            let result_json = job.result.as_ref().map(serde_json::to_string).transpose()?;

            let outcome = sqlx::query(
                r#"
                UPDATE jobs
                SET status = ?, progress = ?, stage = ?, result = ?, error = ?, updated_at = ?
                WHERE id = ? AND status = ? AND progress = ?
                "#,
            )
            .bind(job.status.as_str())
            .bind(job.progress as i64)
            .bind(&job.stage)
            .bind(&result_json)
            .bind(&job.error)
            .bind(timestamp(&job.updated_at))
            .bind(id.to_string())
            .bind(previous_status.as_str())
            .bind(previous_progress as i64)
            .execute(&self.pool)
            .await?;

            if outcome.rows_affected() == 1 {
                return Ok(job);
            }

            tracing::debug!(job_id = %id, "Job changed concurrently, re-reading before update");
        }

        Err(Error::Internal(format!(
            "Job {} kept changing during update ({} attempts)",
            id, MAX_GUARDED_ATTEMPTS
        )))
    }
}

#[async_trait]
impl JobStore for SqliteJobStore {
    async fn create(&self, kind: JobKind, payload: Value) -> Result<JobRecord> {
        let job = JobRecord::new(kind, payload);
        let id = job.id.to_string();
        let payload = serde_json::to_string(&job.payload)?;
        let created_at = timestamp(&job.created_at);

        retry_on_lock("create_job", self.max_lock_wait_ms, || async {
            sqlx::query(
                r#"
                INSERT INTO jobs (id, kind, status, progress, stage, payload, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(job.kind.as_str())
            .bind(job.status.as_str())
            .bind(job.progress as i64)
            .bind(&job.stage)
            .bind(&payload)
            .bind(&created_at)
            .bind(&created_at)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await?;

        Ok(job)
    }

    async fn get(&self, id: Uuid) -> Result<Option<JobRecord>> {
        self.fetch(id).await
    }

    async fn update(&self, id: Uuid, update: JobUpdate) -> Result<JobRecord> {
        retry_on_lock("update_job", self.max_lock_wait_ms, || {
            self.try_update(id, update.clone())
        })
        .await
    }

    async fn purge_terminal_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let cutoff = timestamp(&cutoff);
        retry_on_lock("purge_jobs", self.max_lock_wait_ms, || async {
            let outcome = sqlx::query(
                "DELETE FROM jobs WHERE status IN ('completed', 'failed') AND updated_at < ?",
            )
            .bind(&cutoff)
            .execute(&self.pool)
            .await?;
            Ok(outcome.rows_affected())
        })
        .await
    }

    async fn count_active(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM jobs WHERE status IN ('pending', 'processing')",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn fail_interrupted(&self, error: &str) -> Result<u64> {
        let now = timestamp(&Utc::now());
        retry_on_lock("fail_interrupted_jobs", self.max_lock_wait_ms, || async {
            let outcome = sqlx::query(
                r#"
                UPDATE jobs
                SET status = 'failed', stage = 'Failed', result = NULL, error = ?, updated_at = ?
                WHERE status IN ('pending', 'processing')
                "#,
            )
            .bind(error)
            .bind(&now)
            .execute(&self.pool)
            .await?;
            Ok(outcome.rows_affected())
        })
        .await
    }
}

/// Fixed-width UTC timestamps so text comparison orders correctly
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str, column: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

fn row_to_job(row: &SqliteRow) -> Result<JobRecord> {
    let id: String = row.try_get("id")?;
    let kind: String = row.try_get("kind")?;
    let status: String = row.try_get("status")?;
    let progress: i64 = row.try_get("progress")?;
    let payload: String = row.try_get("payload")?;
    let result: Option<String> = row.try_get("result")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(JobRecord {
        id: Uuid::parse_str(&id)
            .map_err(|e| Error::Internal(format!("Invalid job id {}: {}", id, e)))?,
        kind: kind.parse()?,
        status: status.parse::<JobStatus>()?,
        progress: progress.clamp(0, 100) as u8,
        stage: row.try_get("stage")?,
        payload: serde_json::from_str(&payload)?,
        result: result.as_deref().map(serde_json::from_str).transpose()?,
        error: row.try_get("error")?,
        created_at: parse_timestamp(&created_at, "created_at")?,
        updated_at: parse_timestamp(&updated_at, "updated_at")?,
    })
}
