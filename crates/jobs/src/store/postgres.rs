//! Postgres-backed job store.
//!
//! The one-active-job-per-key invariant is enforced by the database: the
//! `active_key` column is populated only while a job is non-terminal and
//! carries a unique index, so the conditional insert either wins or loses
//! atomically. Terminal transitions null the column out, freeing the key.
//!
//! The change feed is published process-locally after each committed write;
//! the API process that owns the pool serves the SSE stream from it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::instrument;
use uuid::Uuid;

use syncgate_core::{ProviderSlug, TenantId, UserId};
use syncgate_events::{EventBus, InMemoryEventBus, Subscription};

use crate::change::JobChange;
use crate::job::{JobId, SyncJob};

use super::{JobStats, JobStore, JobStoreError};

/// Postgres job store.
///
/// All queries are tenant-scoped in the WHERE clause; cross-tenant access is
/// reported as [`JobStoreError::TenantIsolation`] rather than not-found so
/// callers can tell probing from absence.
#[derive(Debug, Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
    feed: Arc<InMemoryEventBus<JobChange>>,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            feed: Arc::new(InMemoryEventBus::new()),
        }
    }

    /// Create the schema if it does not exist yet (dev/bootstrap path).
    pub async fn ensure_schema(&self) -> Result<(), JobStoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sync_jobs (
                id            UUID PRIMARY KEY,
                tenant_id     UUID NOT NULL,
                provider      TEXT NOT NULL,
                status        TEXT NOT NULL,
                progress      SMALLINT NOT NULL DEFAULT 0,
                attempts      INTEGER NOT NULL DEFAULT 0,
                max_attempts  INTEGER NOT NULL DEFAULT 3,
                started_at    TIMESTAMPTZ NULL,
                finished_at   TIMESTAMPTZ NULL,
                error_message TEXT NULL,
                payload       JSONB NOT NULL,
                result        JSONB NULL,
                created_by    UUID NOT NULL,
                created_at    TIMESTAMPTZ NOT NULL,
                active_key    TEXT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        sqlx::query(
            "CREATE UNIQUE INDEX IF NOT EXISTS sync_jobs_active_key_idx ON sync_jobs (active_key)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS sync_jobs_tenant_created_idx ON sync_jobs (tenant_id, created_at DESC)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("ensure_schema", e))?;

        Ok(())
    }

    fn publish(&self, change: JobChange) {
        if let Err(e) = self.feed.publish(change) {
            tracing::warn!(error = ?e, "job change feed publish failed");
        }
    }

    /// Load a row for update inside `tx`, enforcing tenant isolation and
    /// terminal immutability.
    async fn load_for_update(
        tx: &mut Transaction<'_, Postgres>,
        tenant_id: TenantId,
        job_id: JobId,
    ) -> Result<SyncJob, JobStoreError> {
        let row = sqlx::query("SELECT * FROM sync_jobs WHERE id = $1 FOR UPDATE")
            .bind(job_id.0)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| map_sqlx_error("load_for_update", e))?
            .ok_or(JobStoreError::NotFound(job_id))?;

        let job = row_to_job(&row)?;
        if job.tenant_id != tenant_id {
            return Err(JobStoreError::TenantIsolation);
        }
        if job.status.is_terminal() {
            return Err(JobStoreError::TerminalJob(job_id));
        }
        Ok(job)
    }

    /// Write the mutable fields of `job` back inside `tx`.
    async fn persist(
        tx: &mut Transaction<'_, Postgres>,
        job: &SyncJob,
    ) -> Result<(), JobStoreError> {
        let active_key = job
            .status
            .is_active()
            .then(|| active_key(job.tenant_id, &job.provider));

        sqlx::query(
            r#"
            UPDATE sync_jobs SET
                status = $2,
                progress = $3,
                attempts = $4,
                started_at = $5,
                finished_at = $6,
                error_message = $7,
                result = $8,
                active_key = $9
            WHERE id = $1
            "#,
        )
        .bind(job.id.0)
        .bind(job.status.as_str())
        .bind(job.progress as i16)
        .bind(job.attempts as i32)
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(job.error_message.as_deref())
        .bind(job.result.clone())
        .bind(active_key)
        .execute(&mut **tx)
        .await
        .map_err(|e| map_sqlx_error("persist", e))?;

        Ok(())
    }

    /// Guarded load-mutate-persist cycle shared by all worker transitions.
    async fn mutate<F>(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        f: F,
    ) -> Result<SyncJob, JobStoreError>
    where
        F: FnOnce(&mut SyncJob) + Send,
    {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin", e))?;

        let mut job = Self::load_for_update(&mut tx, tenant_id, job_id).await?;
        f(&mut job);
        Self::persist(&mut tx, &job).await?;

        tx.commit().await.map_err(|e| map_sqlx_error("commit", e))?;

        self.publish(JobChange::Update(job.clone()));
        Ok(job)
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    #[instrument(skip(self, job), fields(tenant_id = %job.tenant_id, provider = %job.provider))]
    async fn try_insert_active(&self, job: SyncJob) -> Result<SyncJob, JobStoreError> {
        let key = active_key(job.tenant_id, &job.provider);

        let inserted = sqlx::query(
            r#"
            INSERT INTO sync_jobs (
                id, tenant_id, provider, status, progress, attempts, max_attempts,
                started_at, finished_at, error_message, payload, result,
                created_by, created_at, active_key
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            ON CONFLICT (active_key) DO NOTHING
            "#,
        )
        .bind(job.id.0)
        .bind(*job.tenant_id.as_uuid())
        .bind(job.provider.as_str())
        .bind(job.status.as_str())
        .bind(job.progress as i16)
        .bind(job.attempts as i32)
        .bind(job.max_attempts as i32)
        .bind(job.started_at)
        .bind(job.finished_at)
        .bind(job.error_message.as_deref())
        .bind(job.payload.clone())
        .bind(job.result.clone())
        .bind(*job.created_by.as_uuid())
        .bind(job.created_at)
        .bind(job.status.is_active().then_some(key))
        .execute(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("try_insert_active", e))?;

        if inserted.rows_affected() == 0 {
            // Lost the conditional insert; report the winner.
            return match self.active_job(job.tenant_id, &job.provider).await? {
                Some(existing) => Err(JobStoreError::ActiveExists(Box::new(existing))),
                None => Err(JobStoreError::Storage(
                    "active-key conflict resolved concurrently; retry".to_string(),
                )),
            };
        }

        self.publish(JobChange::Insert(job.clone()));
        Ok(job)
    }

    async fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<SyncJob>, JobStoreError> {
        let row = sqlx::query("SELECT * FROM sync_jobs WHERE id = $1")
            .bind(job_id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("get", e))?;

        match row {
            None => Ok(None),
            Some(row) => {
                let job = row_to_job(&row)?;
                if job.tenant_id != tenant_id {
                    return Err(JobStoreError::TenantIsolation);
                }
                Ok(Some(job))
            }
        }
    }

    async fn active_job(
        &self,
        tenant_id: TenantId,
        provider: &ProviderSlug,
    ) -> Result<Option<SyncJob>, JobStoreError> {
        let row = sqlx::query("SELECT * FROM sync_jobs WHERE active_key = $1")
            .bind(active_key(tenant_id, provider))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| map_sqlx_error("active_job", e))?;

        row.as_ref().map(row_to_job).transpose()
    }

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<SyncJob>, JobStoreError> {
        let rows =
            sqlx::query("SELECT * FROM sync_jobs WHERE tenant_id = $1 ORDER BY created_at DESC")
                .bind(*tenant_id.as_uuid())
                .fetch_all(&self.pool)
                .await
                .map_err(|e| map_sqlx_error("list", e))?;

        rows.iter().map(row_to_job).collect()
    }

    async fn history(
        &self,
        tenant_id: TenantId,
        provider: &ProviderSlug,
    ) -> Result<Vec<SyncJob>, JobStoreError> {
        let rows = sqlx::query(
            "SELECT * FROM sync_jobs WHERE tenant_id = $1 AND provider = $2 ORDER BY created_at DESC",
        )
        .bind(*tenant_id.as_uuid())
        .bind(provider.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("history", e))?;

        rows.iter().map(row_to_job).collect()
    }

    #[instrument(skip(self), fields(tenant_id = %tenant_id, job_id = %job_id))]
    async fn reclaim(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<SyncJob, JobStoreError> {
        self.mutate(tenant_id, job_id, |job| job.fail(reason, now)).await
    }

    async fn mark_running(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        now: DateTime<Utc>,
    ) -> Result<SyncJob, JobStoreError> {
        self.mutate(tenant_id, job_id, |job| job.mark_running(now)).await
    }

    async fn record_progress(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        pct: u8,
    ) -> Result<SyncJob, JobStoreError> {
        self.mutate(tenant_id, job_id, |job| job.record_progress(pct)).await
    }

    async fn complete(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        result: serde_json::Value,
    ) -> Result<SyncJob, JobStoreError> {
        self.mutate(tenant_id, job_id, |job| job.complete(result, Utc::now()))
            .await
    }

    async fn fail(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        message: &str,
    ) -> Result<SyncJob, JobStoreError> {
        self.mutate(tenant_id, job_id, |job| job.fail(message, Utc::now()))
            .await
    }

    async fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        let rows = sqlx::query(
            "SELECT status, COUNT(*) AS n FROM sync_jobs WHERE tenant_id = $1 GROUP BY status",
        )
        .bind(*tenant_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("stats", e))?;

        let mut stats = JobStats::default();
        for row in rows {
            let status: String = row
                .try_get("status")
                .map_err(|e| map_sqlx_error("stats", e))?;
            let n: i64 = row.try_get("n").map_err(|e| map_sqlx_error("stats", e))?;
            let n = n.max(0) as usize;
            match status.as_str() {
                "pending" => stats.pending = n,
                "running" => stats.running = n,
                "success" => stats.success = n,
                "error" => stats.error = n,
                other => {
                    return Err(JobStoreError::Storage(format!(
                        "unexpected status in store: {other}"
                    )))
                }
            }
        }
        Ok(stats)
    }

    fn changes(&self) -> Subscription<JobChange> {
        self.feed.subscribe()
    }
}

fn active_key(tenant_id: TenantId, provider: &ProviderSlug) -> String {
    format!("{tenant_id}:{provider}")
}

fn row_to_job(row: &PgRow) -> Result<SyncJob, JobStoreError> {
    let get = |e: sqlx::Error| JobStoreError::Storage(format!("row decode: {e}"));

    let provider: String = row.try_get("provider").map_err(get)?;
    let provider = ProviderSlug::parse(&provider)
        .map_err(|e| JobStoreError::Storage(format!("invalid provider in store: {e}")))?;

    let status: String = row.try_get("status").map_err(get)?;
    let status = status
        .parse()
        .map_err(|e| JobStoreError::Storage(format!("invalid status in store: {e}")))?;

    let progress: i16 = row.try_get("progress").map_err(get)?;
    let attempts: i32 = row.try_get("attempts").map_err(get)?;
    let max_attempts: i32 = row.try_get("max_attempts").map_err(get)?;

    Ok(SyncJob {
        id: JobId::from_uuid(row.try_get::<Uuid, _>("id").map_err(get)?),
        tenant_id: TenantId::from_uuid(row.try_get::<Uuid, _>("tenant_id").map_err(get)?),
        provider,
        status,
        progress: progress.clamp(0, 100) as u8,
        attempts: attempts.max(0) as u32,
        max_attempts: max_attempts.max(0) as u32,
        started_at: row.try_get("started_at").map_err(get)?,
        finished_at: row.try_get("finished_at").map_err(get)?,
        error_message: row.try_get("error_message").map_err(get)?,
        payload: row.try_get("payload").map_err(get)?,
        result: row.try_get("result").map_err(get)?,
        created_by: UserId::from_uuid(row.try_get::<Uuid, _>("created_by").map_err(get)?),
        created_at: row.try_get("created_at").map_err(get)?,
    })
}

fn map_sqlx_error(op: &str, e: sqlx::Error) -> JobStoreError {
    JobStoreError::Storage(format!("{op}: {e}"))
}
