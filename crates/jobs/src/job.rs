//! The sync job entity and its lifecycle.

use core::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use syncgate_core::{DomainError, ProviderSlug, TenantId, UserId};

/// Age past which an active job is considered dead and may be reclaimed.
///
/// Shared by the admission gate and the client-side staleness filter so both
/// sides apply the same formula.
pub const STALE_AFTER_MINUTES: i64 = 15;

/// Unique job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for JobId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = Uuid::from_str(s).map_err(|e| DomainError::invalid_id(format!("JobId: {e}")))?;
        Ok(Self(uuid))
    }
}

/// Job execution status.
///
/// `Success` and `Error` are terminal; the row is immutable afterwards except
/// for being superseded by a newer job under the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created by admission, waiting for the worker to claim it
    Pending,
    /// Claimed and being executed by the worker
    Running,
    /// Completed successfully
    Success,
    /// Failed (worker error or auto-heal reclamation)
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Error)
    }

    /// Active = still occupying the key (pending or running).
    pub fn is_active(&self) -> bool {
        !self.is_terminal()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Error => "error",
        }
    }
}

impl FromStr for JobStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "success" => Ok(JobStatus::Success),
            "error" => Ok(JobStatus::Error),
            other => Err(DomainError::validation(format!("unknown job status: {other}"))),
        }
    }
}

/// A tenant-scoped integration sync job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    /// Unique job ID
    pub id: JobId,
    /// Tenant scope
    pub tenant_id: TenantId,
    /// Provider half of the (tenant, provider) key
    pub provider: ProviderSlug,
    /// Current status
    pub status: JobStatus,
    /// Progress percentage; cooperative monotonic contract with the worker
    pub progress: u8,
    /// Attempts so far (worker-owned bookkeeping)
    pub attempts: u32,
    /// Retry ceiling (worker-owned bookkeeping)
    pub max_attempts: u32,
    /// Set by the worker when it claims the job
    pub started_at: Option<DateTime<Utc>>,
    /// Set only on terminal transition
    pub finished_at: Option<DateTime<Utc>>,
    /// Set only when status becomes `error`
    pub error_message: Option<String>,
    /// Opaque worker input
    pub payload: serde_json::Value,
    /// Opaque worker output, populated only on success
    pub result: Option<serde_json::Value>,
    /// Actor who submitted the job
    pub created_by: UserId,
    /// Submission timestamp
    pub created_at: DateTime<Utc>,
}

impl SyncJob {
    /// Create a freshly submitted job (empty payload; the worker polls and
    /// claims pending jobs itself).
    pub fn submitted(tenant_id: TenantId, provider: ProviderSlug, created_by: UserId) -> Self {
        Self {
            id: JobId::new(),
            tenant_id,
            provider,
            status: JobStatus::Pending,
            progress: 0,
            attempts: 0,
            max_attempts: 3,
            started_at: None,
            finished_at: None,
            error_message: None,
            payload: serde_json::json!({}),
            result: None,
            created_by,
            created_at: Utc::now(),
        }
    }

    /// Age of the job: `now - (started_at ?? created_at)`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.started_at.unwrap_or(self.created_at))
    }

    /// An active job past the reclamation threshold is logically dead.
    ///
    /// Terminal jobs are never stale; they no longer occupy the key.
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.status.is_active() && self.age(now) > Duration::minutes(STALE_AFTER_MINUTES)
    }

    /// Worker claimed the job.
    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Running;
        self.started_at = Some(now);
        self.attempts += 1;
    }

    /// Worker progress report (clamped to 100).
    pub fn record_progress(&mut self, pct: u8) {
        self.progress = pct.min(100);
    }

    /// Worker finished successfully.
    pub fn complete(&mut self, result: serde_json::Value, now: DateTime<Utc>) {
        self.status = JobStatus::Success;
        self.progress = 100;
        self.result = Some(result);
        self.finished_at = Some(now);
    }

    /// Worker gave up, or admission reclaimed a stale run.
    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.status = JobStatus::Error;
        self.error_message = Some(message.into());
        self.finished_at = Some(now);
    }
}
