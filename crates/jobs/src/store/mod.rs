//! Job storage: the single source of truth for job state.
//!
//! Two read patterns back the admission gate: "any active job for a key"
//! (to decide reclaim vs. conflict vs. create) and the conditional insert
//! that makes the one-active-job-per-key rule a store guarantee rather than
//! a read-then-write convention.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use syncgate_core::{ProviderSlug, TenantId};
use syncgate_events::Subscription;

use crate::change::JobChange;
use crate::job::{JobId, SyncJob};

mod in_memory;
mod postgres;

pub use in_memory::InMemoryJobStore;
pub use postgres::PostgresJobStore;

/// Job store error.
#[derive(Debug, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),

    #[error("tenant isolation violation")]
    TenantIsolation,

    /// The conditional insert lost: an active job already holds the key.
    #[error("an active job already exists for this key: {}", .0.id)]
    ActiveExists(Box<SyncJob>),

    /// Mutation attempted on a terminal (immutable) job.
    #[error("job is terminal and immutable: {0}")]
    TerminalJob(JobId),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Per-status job counts for a tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct JobStats {
    pub pending: usize,
    pub running: usize,
    pub success: usize,
    pub error: usize,
}

/// Durable job storage plus the push-based change feed.
///
/// Every successful mutation emits a [`JobChange`] to all feed subscribers.
/// The feed is best-effort distribution; the store itself stays the source
/// of truth and clients re-fetch to recover from missed events.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Conditionally insert a new job: fails with [`JobStoreError::ActiveExists`]
    /// if a non-terminal job already holds the (tenant, provider) key.
    ///
    /// This is atomic with respect to concurrent inserts for the same key.
    async fn try_insert_active(&self, job: SyncJob) -> Result<SyncJob, JobStoreError>;

    /// Get a job by ID (tenant-isolated).
    async fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<SyncJob>, JobStoreError>;

    /// Any non-terminal job for the key, regardless of age.
    async fn active_job(
        &self,
        tenant_id: TenantId,
        provider: &ProviderSlug,
    ) -> Result<Option<SyncJob>, JobStoreError>;

    /// All jobs for the tenant, most recent first.
    async fn list(&self, tenant_id: TenantId) -> Result<Vec<SyncJob>, JobStoreError>;

    /// All jobs for one key, most recent first.
    async fn history(
        &self,
        tenant_id: TenantId,
        provider: &ProviderSlug,
    ) -> Result<Vec<SyncJob>, JobStoreError>;

    /// Force a stale active job to `error` (auto-heal). Admission-only.
    async fn reclaim(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<SyncJob, JobStoreError>;

    /// Worker transition: pending -> running.
    async fn mark_running(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        now: DateTime<Utc>,
    ) -> Result<SyncJob, JobStoreError>;

    /// Worker progress report; rejected on terminal jobs.
    async fn record_progress(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        pct: u8,
    ) -> Result<SyncJob, JobStoreError>;

    /// Worker transition: terminal success with a result blob.
    async fn complete(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        result: serde_json::Value,
    ) -> Result<SyncJob, JobStoreError>;

    /// Worker transition: terminal error with a message.
    async fn fail(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        message: &str,
    ) -> Result<SyncJob, JobStoreError>;

    /// Per-status counts for a tenant.
    async fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError>;

    /// Subscribe to the change feed (all tenants; consumers filter).
    fn changes(&self) -> Subscription<JobChange>;
}
