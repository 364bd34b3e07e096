//! In-memory job store for tests/dev.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use syncgate_core::{ProviderSlug, TenantId};
use syncgate_events::{EventBus, InMemoryEventBus, Subscription};

use crate::change::JobChange;
use crate::job::{JobId, JobStatus, SyncJob};

use super::{JobStats, JobStore, JobStoreError};

/// In-memory job store.
///
/// The conditional insert runs inside a single write-lock critical section,
/// which gives it the same atomicity the Postgres store gets from its unique
/// active-key index.
#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<JobId, SyncJob>>,
    feed: InMemoryEventBus<JobChange>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn publish(&self, change: JobChange) {
        // Feed distribution is best-effort; the store stays the source of
        // truth and clients re-fetch to recover.
        if let Err(e) = self.feed.publish(change) {
            tracing::warn!(error = ?e, "job change feed publish failed");
        }
    }

    /// Apply a guarded mutation to a non-terminal job and emit the update on
    /// the feed.
    fn mutate<F>(&self, tenant_id: TenantId, job_id: JobId, f: F) -> Result<SyncJob, JobStoreError>
    where
        F: FnOnce(&mut SyncJob),
    {
        let updated = {
            let mut jobs = self
                .jobs
                .write()
                .map_err(|e| JobStoreError::Storage(e.to_string()))?;

            let job = jobs.get_mut(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
            if job.tenant_id != tenant_id {
                return Err(JobStoreError::TenantIsolation);
            }
            if job.status.is_terminal() {
                return Err(JobStoreError::TerminalJob(job_id));
            }

            f(job);
            job.clone()
        };

        self.publish(JobChange::Update(updated.clone()));
        Ok(updated)
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn try_insert_active(&self, job: SyncJob) -> Result<SyncJob, JobStoreError> {
        let inserted = {
            let mut jobs = self
                .jobs
                .write()
                .map_err(|e| JobStoreError::Storage(e.to_string()))?;

            let existing = jobs.values().find(|j| {
                j.tenant_id == job.tenant_id
                    && j.provider == job.provider
                    && j.status.is_active()
            });
            if let Some(existing) = existing {
                return Err(JobStoreError::ActiveExists(Box::new(existing.clone())));
            }

            jobs.insert(job.id, job.clone());
            job
        };

        self.publish(JobChange::Insert(inserted.clone()));
        Ok(inserted)
    }

    async fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<SyncJob>, JobStoreError> {
        let jobs = self
            .jobs
            .read()
            .map_err(|e| JobStoreError::Storage(e.to_string()))?;
        match jobs.get(&job_id) {
            Some(job) if job.tenant_id == tenant_id => Ok(Some(job.clone())),
            Some(_) => Err(JobStoreError::TenantIsolation),
            None => Ok(None),
        }
    }

    async fn active_job(
        &self,
        tenant_id: TenantId,
        provider: &ProviderSlug,
    ) -> Result<Option<SyncJob>, JobStoreError> {
        let jobs = self
            .jobs
            .read()
            .map_err(|e| JobStoreError::Storage(e.to_string()))?;
        Ok(jobs
            .values()
            .find(|j| {
                j.tenant_id == tenant_id && &j.provider == provider && j.status.is_active()
            })
            .cloned())
    }

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<SyncJob>, JobStoreError> {
        let jobs = self
            .jobs
            .read()
            .map_err(|e| JobStoreError::Storage(e.to_string()))?;
        let mut result: Vec<_> = jobs
            .values()
            .filter(|j| j.tenant_id == tenant_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(result)
    }

    async fn history(
        &self,
        tenant_id: TenantId,
        provider: &ProviderSlug,
    ) -> Result<Vec<SyncJob>, JobStoreError> {
        let mut result = self.list(tenant_id).await?;
        result.retain(|j| &j.provider == provider);
        Ok(result)
    }

    async fn reclaim(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        reason: &str,
        now: DateTime<Utc>,
    ) -> Result<SyncJob, JobStoreError> {
        self.mutate(tenant_id, job_id, |job| job.fail(reason, now))
    }

    async fn mark_running(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        now: DateTime<Utc>,
    ) -> Result<SyncJob, JobStoreError> {
        self.mutate(tenant_id, job_id, |job| job.mark_running(now))
    }

    async fn record_progress(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        pct: u8,
    ) -> Result<SyncJob, JobStoreError> {
        self.mutate(tenant_id, job_id, |job| job.record_progress(pct))
    }

    async fn complete(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        result: serde_json::Value,
    ) -> Result<SyncJob, JobStoreError> {
        self.mutate(tenant_id, job_id, |job| job.complete(result, Utc::now()))
    }

    async fn fail(
        &self,
        tenant_id: TenantId,
        job_id: JobId,
        message: &str,
    ) -> Result<SyncJob, JobStoreError> {
        self.mutate(tenant_id, job_id, |job| job.fail(message, Utc::now()))
    }

    async fn stats(&self, tenant_id: TenantId) -> Result<JobStats, JobStoreError> {
        let jobs = self
            .jobs
            .read()
            .map_err(|e| JobStoreError::Storage(e.to_string()))?;

        let mut stats = JobStats::default();
        for job in jobs.values().filter(|j| j.tenant_id == tenant_id) {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Running => stats.running += 1,
                JobStatus::Success => stats.success += 1,
                JobStatus::Error => stats.error += 1,
            }
        }
        Ok(stats)
    }

    fn changes(&self) -> Subscription<JobChange> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use syncgate_core::UserId;

    use super::*;

    fn slug(s: &str) -> ProviderSlug {
        ProviderSlug::parse(s).unwrap()
    }

    fn submitted(tenant: TenantId, provider: &str) -> SyncJob {
        SyncJob::submitted(tenant, slug(provider), UserId::new())
    }

    #[tokio::test]
    async fn insert_then_get() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();

        let job = store.try_insert_active(submitted(tenant, "sefaz")).await.unwrap();
        let got = store.get(tenant, job.id).await.unwrap().unwrap();
        assert_eq!(got.id, job.id);
        assert_eq!(got.status, JobStatus::Pending);
    }

    #[tokio::test]
    async fn conditional_insert_rejects_second_active_job_for_key() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();

        let first = store.try_insert_active(submitted(tenant, "sefaz")).await.unwrap();
        let err = store
            .try_insert_active(submitted(tenant, "sefaz"))
            .await
            .unwrap_err();

        match err {
            JobStoreError::ActiveExists(existing) => assert_eq!(existing.id, first.id),
            other => panic!("expected ActiveExists, got {other:?}"),
        }
        assert_eq!(store.list(tenant).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn different_keys_do_not_conflict() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();

        store.try_insert_active(submitted(tenant, "sefaz")).await.unwrap();
        store.try_insert_active(submitted(tenant, "bank-feed")).await.unwrap();
        store
            .try_insert_active(submitted(TenantId::new(), "sefaz"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn terminal_job_frees_the_key() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();

        let job = store.try_insert_active(submitted(tenant, "sefaz")).await.unwrap();
        store.fail(tenant, job.id, "boom").await.unwrap();

        store.try_insert_active(submitted(tenant, "sefaz")).await.unwrap();
        assert_eq!(store.list(tenant).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn tenant_isolation_on_get_and_mutation() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let other = TenantId::new();

        let job = store.try_insert_active(submitted(tenant, "sefaz")).await.unwrap();

        assert!(matches!(
            store.get(other, job.id).await,
            Err(JobStoreError::TenantIsolation)
        ));
        assert!(matches!(
            store.fail(other, job.id, "nope").await,
            Err(JobStoreError::TenantIsolation)
        ));
    }

    #[tokio::test]
    async fn terminal_jobs_reject_further_mutation() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();

        let job = store.try_insert_active(submitted(tenant, "sefaz")).await.unwrap();
        store.complete(tenant, job.id, serde_json::json!({})).await.unwrap();

        assert!(matches!(
            store.record_progress(tenant, job.id, 50).await,
            Err(JobStoreError::TerminalJob(_))
        ));
        assert!(matches!(
            store.reclaim(tenant, job.id, "late", Utc::now()).await,
            Err(JobStoreError::TerminalJob(_))
        ));
    }

    #[tokio::test]
    async fn reclaim_sets_error_message_and_finished_at() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();

        let job = store.try_insert_active(submitted(tenant, "sefaz")).await.unwrap();
        let now = Utc::now();
        let reclaimed = store
            .reclaim(tenant, job.id, "auto-heal: job exceeded time threshold", now)
            .await
            .unwrap();

        assert_eq!(reclaimed.status, JobStatus::Error);
        assert_eq!(reclaimed.finished_at, Some(now));
        assert!(reclaimed.error_message.is_some());
    }

    #[tokio::test]
    async fn list_and_history_are_most_recent_first() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();

        let mut old = submitted(tenant, "sefaz");
        old.created_at = Utc::now() - chrono::Duration::hours(2);
        old.fail("done earlier", Utc::now() - chrono::Duration::hours(1));
        // Insert the terminal historical row directly through the map path:
        // the key is free, so the conditional insert accepts it.
        let old = store.try_insert_active(old).await.unwrap();

        let fresh = store.try_insert_active(submitted(tenant, "sefaz")).await.unwrap();
        let other = store.try_insert_active(submitted(tenant, "bank-feed")).await.unwrap();

        let all = store.list(tenant).await.unwrap();
        assert_eq!(all.len(), 3);
        assert!(all[0].created_at >= all[1].created_at);
        assert_eq!(all.last().unwrap().id, old.id);

        let history = store.history(tenant, &slug("sefaz")).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, fresh.id);
        assert!(!history.iter().any(|j| j.id == other.id));
    }

    #[tokio::test]
    async fn worker_transitions_update_bookkeeping() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();

        let job = store.try_insert_active(submitted(tenant, "sefaz")).await.unwrap();
        let t0 = Utc::now();

        let running = store.mark_running(tenant, job.id, t0).await.unwrap();
        assert_eq!(running.status, JobStatus::Running);
        assert_eq!(running.started_at, Some(t0));
        assert_eq!(running.attempts, 1);

        let progressed = store.record_progress(tenant, job.id, 60).await.unwrap();
        assert_eq!(progressed.progress, 60);

        let done = store
            .complete(tenant, job.id, serde_json::json!({"rows": 3}))
            .await
            .unwrap();
        assert_eq!(done.status, JobStatus::Success);
        assert_eq!(done.progress, 100);
        assert!(done.finished_at.is_some());
    }

    #[tokio::test]
    async fn stats_count_per_status() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();

        let a = store.try_insert_active(submitted(tenant, "a")).await.unwrap();
        let b = store.try_insert_active(submitted(tenant, "b")).await.unwrap();
        store.try_insert_active(submitted(tenant, "c")).await.unwrap();
        store.mark_running(tenant, a.id, Utc::now()).await.unwrap();
        store.fail(tenant, b.id, "boom").await.unwrap();

        let stats = store.stats(tenant).await.unwrap();
        assert_eq!(
            stats,
            JobStats {
                pending: 1,
                running: 1,
                success: 0,
                error: 1
            }
        );
    }

    #[tokio::test]
    async fn feed_emits_insert_and_update_changes() {
        let store = InMemoryJobStore::new();
        let tenant = TenantId::new();
        let sub = store.changes();

        let job = store.try_insert_active(submitted(tenant, "sefaz")).await.unwrap();
        store.record_progress(tenant, job.id, 10).await.unwrap();

        let first = sub.recv_timeout(StdDuration::from_secs(1)).unwrap();
        assert!(matches!(first, JobChange::Insert(ref j) if j.id == job.id));

        let second = sub.recv_timeout(StdDuration::from_secs(1)).unwrap();
        match second {
            JobChange::Update(j) => {
                assert_eq!(j.id, job.id);
                assert_eq!(j.progress, 10);
            }
            other => panic!("expected update, got {other:?}"),
        }
    }
}
