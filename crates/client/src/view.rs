//! Local materialized view of the job collection.

use chrono::{DateTime, Utc};

use syncgate_core::ProviderSlug;
use syncgate_jobs::{JobChange, SyncJob};

/// Ordered collection of the session's visible jobs, keyed by id,
/// most-recent-first by `created_at`.
///
/// Changes are merged last-write-wins per record: applying the same event
/// twice, or an update that raced ahead of its insert, leaves the view in
/// the same state as the well-ordered delivery would. Position is assigned
/// on insert and kept on update (no re-sorting).
#[derive(Debug, Default, Clone)]
pub struct JobFeedView {
    jobs: Vec<SyncJob>,
}

impl JobFeedView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one change-feed record into the view (idempotent).
    pub fn apply(&mut self, change: JobChange) {
        match change {
            JobChange::Insert(job) | JobChange::Update(job) => {
                if let Some(existing) = self.jobs.iter_mut().find(|j| j.id == job.id) {
                    *existing = job;
                } else {
                    self.jobs.insert(0, job);
                }
            }
            JobChange::Delete(job) => {
                self.jobs.retain(|j| j.id != job.id);
            }
        }
    }

    /// Replace the whole view from a full refetch (pull fallback).
    pub fn replace_all(&mut self, mut jobs: Vec<SyncJob>) {
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        self.jobs = jobs;
    }

    /// Current materialized view, most recent first.
    pub fn list(&self) -> &[SyncJob] {
        &self.jobs
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// First active, non-stale job for the provider.
    ///
    /// Applies the same staleness formula the admission gate uses, so the UI
    /// never shows a "running" affordance for a job the server would already
    /// treat as reclaimable.
    pub fn active_job(&self, provider: &ProviderSlug, now: DateTime<Utc>) -> Option<&SyncJob> {
        self.jobs
            .iter()
            .find(|j| &j.provider == provider && j.status.is_active() && !j.is_stale(now))
    }

    /// Most recent job for the provider, regardless of status or age.
    pub fn latest_job(&self, provider: &ProviderSlug) -> Option<&SyncJob> {
        self.jobs.iter().find(|j| &j.provider == provider)
    }

    /// All jobs for the provider, most recent first.
    pub fn history_for(&self, provider: &ProviderSlug) -> Vec<&SyncJob> {
        self.jobs.iter().filter(|j| &j.provider == provider).collect()
    }

    /// True while any provider shows an active, non-stale job.
    pub fn any_active(&self, now: DateTime<Utc>) -> bool {
        self.jobs
            .iter()
            .any(|j| j.status.is_active() && !j.is_stale(now))
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use syncgate_core::{TenantId, UserId};
    use syncgate_jobs::STALE_AFTER_MINUTES;

    use super::*;

    fn slug(s: &str) -> ProviderSlug {
        ProviderSlug::parse(s).unwrap()
    }

    fn job(provider: &str) -> SyncJob {
        SyncJob::submitted(TenantId::new(), slug(provider), UserId::new())
    }

    #[test]
    fn insert_prepends_and_update_replaces_in_place() {
        let mut view = JobFeedView::new();
        let a = job("sefaz");
        let b = job("bank-feed");

        view.apply(JobChange::Insert(a.clone()));
        view.apply(JobChange::Insert(b.clone()));
        assert_eq!(view.list()[0].id, b.id);
        assert_eq!(view.list()[1].id, a.id);

        let mut a2 = a.clone();
        a2.record_progress(80);
        view.apply(JobChange::Update(a2));

        // Position kept, record replaced.
        assert_eq!(view.list()[1].id, a.id);
        assert_eq!(view.list()[1].progress, 80);
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn applying_the_same_update_twice_is_a_no_op() {
        let mut view = JobFeedView::new();
        let mut a = job("sefaz");
        view.apply(JobChange::Insert(a.clone()));

        a.record_progress(50);
        view.apply(JobChange::Update(a.clone()));
        let once = view.clone();
        view.apply(JobChange::Update(a));

        assert_eq!(view.len(), once.len());
        assert_eq!(
            serde_json::to_value(view.list()).unwrap(),
            serde_json::to_value(once.list()).unwrap()
        );
    }

    #[test]
    fn duplicate_insert_does_not_duplicate_the_row() {
        let mut view = JobFeedView::new();
        let a = job("sefaz");
        view.apply(JobChange::Insert(a.clone()));
        view.apply(JobChange::Insert(a));
        assert_eq!(view.len(), 1);
    }

    #[test]
    fn update_racing_ahead_of_its_insert_is_kept() {
        let mut view = JobFeedView::new();
        let mut a = job("sefaz");
        a.record_progress(30);

        // The update races ahead of its insert; it still lands as a row.
        view.apply(JobChange::Update(a.clone()));
        assert_eq!(view.len(), 1);
        assert_eq!(view.list()[0].progress, 30);
    }

    #[test]
    fn delete_removes_by_id() {
        let mut view = JobFeedView::new();
        let a = job("sefaz");
        view.apply(JobChange::Insert(a.clone()));
        view.apply(JobChange::Delete(a.clone()));
        assert!(view.is_empty());

        // Deleting again is a no-op.
        view.apply(JobChange::Delete(a));
        assert!(view.is_empty());
    }

    #[test]
    fn active_job_excludes_stale_rows_the_store_has_not_reclaimed() {
        let mut view = JobFeedView::new();
        let now = Utc::now();

        let mut stuck = job("sefaz");
        stuck.created_at = now - Duration::minutes(STALE_AFTER_MINUTES + 5);
        view.apply(JobChange::Insert(stuck));

        assert!(view.active_job(&slug("sefaz"), now).is_none());
        // ...but history and latest still see it.
        assert!(view.latest_job(&slug("sefaz")).is_some());
        assert_eq!(view.history_for(&slug("sefaz")).len(), 1);
    }

    #[test]
    fn active_job_finds_fresh_pending_run() {
        let mut view = JobFeedView::new();
        let now = Utc::now();
        let a = job("sefaz");
        view.apply(JobChange::Insert(a.clone()));

        let found = view.active_job(&slug("sefaz"), now).unwrap();
        assert_eq!(found.id, a.id);
        assert!(view.active_job(&slug("bank-feed"), now).is_none());
    }

    #[test]
    fn terminal_jobs_are_not_active() {
        let mut view = JobFeedView::new();
        let now = Utc::now();
        let mut a = job("sefaz");
        a.fail("boom", now);
        view.apply(JobChange::Insert(a));
        assert!(view.active_job(&slug("sefaz"), now).is_none());
    }

    #[test]
    fn replace_all_orders_most_recent_first() {
        let mut view = JobFeedView::new();
        let now = Utc::now();

        let mut old = job("sefaz");
        old.created_at = now - Duration::hours(1);
        let fresh = job("sefaz");

        view.replace_all(vec![old.clone(), fresh.clone()]);
        assert_eq!(view.list()[0].id, fresh.id);
        assert_eq!(view.list()[1].id, old.id);
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        fn pooled_jobs() -> Vec<SyncJob> {
            (0..4).map(|_| job("sefaz")).collect()
        }

        fn change_strategy(pool: Vec<SyncJob>) -> impl Strategy<Value = JobChange> {
            (0..pool.len(), 0u8..=100, 0..3u8).prop_map(move |(idx, progress, kind)| {
                let mut j = pool[idx].clone();
                j.record_progress(progress);
                match kind {
                    0 => JobChange::Insert(j),
                    1 => JobChange::Update(j),
                    _ => JobChange::Delete(j),
                }
            })
        }

        proptest! {
            /// Duplicated delivery of any change is indistinguishable from
            /// exactly-once delivery.
            #[test]
            fn duplicate_delivery_is_idempotent(
                seq in proptest::collection::vec(change_strategy(pooled_jobs()), 0..20)
            ) {
                let mut once = JobFeedView::new();
                let mut doubled = JobFeedView::new();

                for change in &seq {
                    once.apply(change.clone());
                    doubled.apply(change.clone());
                    doubled.apply(change.clone());
                }

                prop_assert_eq!(
                    serde_json::to_value(once.list()).unwrap(),
                    serde_json::to_value(doubled.list()).unwrap()
                );
            }

            /// The view never holds two rows with the same id.
            #[test]
            fn ids_stay_unique(
                seq in proptest::collection::vec(change_strategy(pooled_jobs()), 0..30)
            ) {
                let mut view = JobFeedView::new();
                for change in seq {
                    view.apply(change);
                }
                let mut ids: Vec<_> = view.list().iter().map(|j| j.id).collect();
                let total = ids.len();
                ids.sort_by_key(|id| id.0);
                ids.dedup();
                prop_assert_eq!(ids.len(), total);
            }
        }
    }
}
