//! Push-feed reconciliation with a timed pull fallback.
//!
//! Two independent producers feed one idempotent merge: the change-feed pump
//! applies pushed records as they arrive, and a full-list refetch (scheduled
//! shortly after every successful submission) bounds the staleness left by
//! any missed event.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use syncgate_core::{ProviderSlug, TenantId};
use syncgate_events::{Subscription, TenantScoped};
use syncgate_jobs::{JobChange, JobId, JobStatus, SubmitReceipt, SyncJob};

use crate::view::JobFeedView;

/// Delay before the fallback refetch that follows a successful submission.
pub const REFETCH_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("network error: {0}")]
    Network(String),

    #[error("API error ({0}): {1}")]
    Api(u16, String),

    #[error("parse error: {0}")]
    Parse(String),
}

/// Result of a submission as seen by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// A new job was admitted.
    Submitted(SubmitReceipt),
    /// An active run already holds the key; informational, not a failure.
    AlreadyRunning { job_id: JobId, status: JobStatus },
}

/// Transport boundary to the admission surface.
#[async_trait]
pub trait SyncApi: Send + Sync {
    async fn submit(&self, provider: &ProviderSlug) -> Result<SubmitOutcome, SyncError>;

    async fn fetch_jobs(&self) -> Result<Vec<SyncJob>, SyncError>;
}

/// Per-session reconciler: owns the view, pumps the feed, submits jobs.
///
/// Constructed at session start with its collaborators passed in explicitly;
/// dropping it (and the feed subscription's bus) winds everything down.
pub struct JobReconciler {
    tenant_id: TenantId,
    api: Arc<dyn SyncApi>,
    view: Arc<RwLock<JobFeedView>>,
    refetch_delay: Duration,
}

impl JobReconciler {
    pub fn new(tenant_id: TenantId, api: Arc<dyn SyncApi>) -> Self {
        Self {
            tenant_id,
            api,
            view: Arc::new(RwLock::new(JobFeedView::new())),
            refetch_delay: REFETCH_DELAY,
        }
    }

    /// Shorten the fallback delay (tests).
    pub fn with_refetch_delay(mut self, delay: Duration) -> Self {
        self.refetch_delay = delay;
        self
    }

    /// Start draining a change-feed subscription into the view.
    ///
    /// Records for other tenants are dropped here; the view only ever holds
    /// this session's authorization boundary. The pump ends when the feed's
    /// publishing side goes away.
    pub fn attach_feed(&self, subscription: Subscription<JobChange>) -> tokio::task::JoinHandle<()> {
        let view = Arc::clone(&self.view);
        let tenant_id = self.tenant_id;

        tokio::task::spawn_blocking(move || loop {
            match subscription.recv_timeout(Duration::from_millis(500)) {
                Ok(change) => {
                    if change.tenant_id() != tenant_id {
                        continue;
                    }
                    match view.write() {
                        Ok(mut view) => view.apply(change),
                        Err(_) => break,
                    }
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => continue,
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => break,
            }
        })
    }

    /// Pull the full job list and replace the view (fallback producer).
    pub async fn refresh(&self) -> Result<(), SyncError> {
        let jobs = self.api.fetch_jobs().await?;
        if let Ok(mut view) = self.view.write() {
            view.replace_all(jobs);
        }
        Ok(())
    }

    /// Submit a sync job for `provider`.
    ///
    /// On success, schedules the fallback refetch after the configured delay.
    /// No placeholder row is inserted locally; the change feed (or the
    /// refetch) delivers the real record.
    pub async fn submit(&self, provider: &ProviderSlug) -> Result<SubmitOutcome, SyncError> {
        let outcome = self.api.submit(provider).await?;

        if let SubmitOutcome::Submitted(receipt) = &outcome {
            tracing::debug!(job_id = %receipt.job_id, provider = %provider, "sync job submitted");
            self.schedule_refetch();
        }

        Ok(outcome)
    }

    fn schedule_refetch(&self) {
        let api = Arc::clone(&self.api);
        let view = Arc::clone(&self.view);
        let delay = self.refetch_delay;

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match api.fetch_jobs().await {
                Ok(jobs) => {
                    if let Ok(mut view) = view.write() {
                        view.replace_all(jobs);
                    }
                }
                // Non-fatal: the push feed remains the primary producer.
                Err(e) => tracing::warn!(error = %e, "fallback job refetch failed"),
            }
        });
    }

    // ── view queries (owned snapshots) ───────────────────────────────────

    pub fn list(&self) -> Vec<SyncJob> {
        self.view
            .read()
            .map(|v| v.list().to_vec())
            .unwrap_or_default()
    }

    pub fn active_job(&self, provider: &ProviderSlug) -> Option<SyncJob> {
        self.view
            .read()
            .ok()
            .and_then(|v| v.active_job(provider, Utc::now()).cloned())
    }

    pub fn latest_job(&self, provider: &ProviderSlug) -> Option<SyncJob> {
        self.view
            .read()
            .ok()
            .and_then(|v| v.latest_job(provider).cloned())
    }

    pub fn history_for(&self, provider: &ProviderSlug) -> Vec<SyncJob> {
        self.view
            .read()
            .map(|v| v.history_for(provider).into_iter().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use syncgate_core::UserId;
    use syncgate_jobs::{InMemoryJobStore, JobStore};

    use super::*;

    struct FakeApi {
        outcome: Mutex<Option<SubmitOutcome>>,
        jobs: Mutex<Vec<SyncJob>>,
        fetches: Mutex<usize>,
    }

    impl FakeApi {
        fn submitting(receipt: SubmitReceipt) -> Self {
            Self {
                outcome: Mutex::new(Some(SubmitOutcome::Submitted(receipt))),
                jobs: Mutex::new(Vec::new()),
                fetches: Mutex::new(0),
            }
        }

        fn conflicting(job_id: JobId) -> Self {
            Self {
                outcome: Mutex::new(Some(SubmitOutcome::AlreadyRunning {
                    job_id,
                    status: JobStatus::Running,
                })),
                jobs: Mutex::new(Vec::new()),
                fetches: Mutex::new(0),
            }
        }

        fn set_jobs(&self, jobs: Vec<SyncJob>) {
            *self.jobs.lock().unwrap() = jobs;
        }

        fn fetch_count(&self) -> usize {
            *self.fetches.lock().unwrap()
        }
    }

    #[async_trait]
    impl SyncApi for FakeApi {
        async fn submit(&self, _provider: &ProviderSlug) -> Result<SubmitOutcome, SyncError> {
            Ok(self.outcome.lock().unwrap().clone().expect("outcome set"))
        }

        async fn fetch_jobs(&self) -> Result<Vec<SyncJob>, SyncError> {
            *self.fetches.lock().unwrap() += 1;
            Ok(self.jobs.lock().unwrap().clone())
        }
    }

    fn slug(s: &str) -> ProviderSlug {
        ProviderSlug::parse(s).unwrap()
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..200 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition did not become true within timeout");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn feed_pump_applies_only_this_tenants_changes() {
        let store = InMemoryJobStore::arc();
        let tenant = TenantId::new();
        let other = TenantId::new();

        let api = Arc::new(FakeApi::conflicting(JobId::new()));
        let reconciler = JobReconciler::new(tenant, api);
        let _pump = reconciler.attach_feed(store.changes());

        let mine = store
            .try_insert_active(SyncJob::submitted(tenant, slug("sefaz"), UserId::new()))
            .await
            .unwrap();
        store
            .try_insert_active(SyncJob::submitted(other, slug("sefaz"), UserId::new()))
            .await
            .unwrap();

        eventually(|| reconciler.list().len() == 1).await;
        assert_eq!(reconciler.list()[0].id, mine.id);
        assert!(reconciler.active_job(&slug("sefaz")).is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn feed_pump_applies_updates_in_place() {
        let store = InMemoryJobStore::arc();
        let tenant = TenantId::new();

        let api = Arc::new(FakeApi::conflicting(JobId::new()));
        let reconciler = JobReconciler::new(tenant, api);
        let _pump = reconciler.attach_feed(store.changes());

        let job = store
            .try_insert_active(SyncJob::submitted(tenant, slug("sefaz"), UserId::new()))
            .await
            .unwrap();
        store.record_progress(tenant, job.id, 75).await.unwrap();

        eventually(|| {
            reconciler
                .latest_job(&slug("sefaz"))
                .map(|j| j.progress == 75)
                .unwrap_or(false)
        })
        .await;
        assert_eq!(reconciler.list().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn successful_submit_schedules_the_fallback_refetch() {
        let tenant = TenantId::new();
        let job = SyncJob::submitted(tenant, slug("sefaz"), UserId::new());
        let receipt = SubmitReceipt {
            job_id: job.id,
            status: JobStatus::Pending,
        };

        let api = Arc::new(FakeApi::submitting(receipt));
        api.set_jobs(vec![job.clone()]);

        let reconciler = JobReconciler::new(tenant, api.clone())
            .with_refetch_delay(Duration::from_millis(20));

        let outcome = reconciler.submit(&slug("sefaz")).await.unwrap();
        assert!(matches!(outcome, SubmitOutcome::Submitted(_)));

        // No optimistic placeholder before the refetch lands.
        assert!(reconciler.list().is_empty());

        eventually(|| reconciler.list().len() == 1).await;
        assert_eq!(reconciler.list()[0].id, job.id);
        assert_eq!(api.fetch_count(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn conflict_surfaces_existing_job_without_refetch() {
        let tenant = TenantId::new();
        let existing = JobId::new();

        let api = Arc::new(FakeApi::conflicting(existing));
        let reconciler = JobReconciler::new(tenant, api.clone())
            .with_refetch_delay(Duration::from_millis(10));

        let outcome = reconciler.submit(&slug("sefaz")).await.unwrap();
        match outcome {
            SubmitOutcome::AlreadyRunning { job_id, status } => {
                assert_eq!(job_id, existing);
                assert_eq!(status, JobStatus::Running);
            }
            other => panic!("expected AlreadyRunning, got {other:?}"),
        }

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(api.fetch_count(), 0, "conflict must not trigger the fallback");
        assert!(reconciler.list().is_empty());
    }

    #[tokio::test]
    async fn refresh_replaces_the_view() {
        let tenant = TenantId::new();
        let api = Arc::new(FakeApi::conflicting(JobId::new()));
        let jobs = vec![
            SyncJob::submitted(tenant, slug("sefaz"), UserId::new()),
            SyncJob::submitted(tenant, slug("bank-feed"), UserId::new()),
        ];
        api.set_jobs(jobs.clone());

        let reconciler = JobReconciler::new(tenant, api);
        reconciler.refresh().await.unwrap();

        assert_eq!(reconciler.list().len(), 2);
        assert_eq!(reconciler.history_for(&slug("sefaz")).len(), 1);
    }
}
