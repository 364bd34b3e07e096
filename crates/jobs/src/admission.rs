//! Admission gate for sync job submissions.
//!
//! Stateless across requests; all coordination goes through the job store.
//! The store's conditional insert makes the one-active-job-per-key rule hold
//! even when two submissions race past the read below.

use std::sync::Arc;

use chrono::Utc;

use syncgate_core::{ProviderSlug, TenantId, UserId};

use crate::config::{ConfigStoreError, IntegrationConfigStore};
use crate::job::{JobId, JobStatus, SyncJob};
use crate::store::{JobStore, JobStoreError};
use crate::trigger::WorkerTrigger;

/// Synthetic error message written to reclaimed jobs.
pub const RECLAIM_MESSAGE: &str = "auto-heal: job exceeded time threshold";

/// What a successful submission returns to the caller.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SubmitReceipt {
    pub job_id: JobId,
    pub status: JobStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    /// The tenant has no configuration for this provider.
    #[error("integration is not configured for this tenant")]
    NotConfigured,

    /// Configuration exists but the integration is turned off.
    #[error("integration is disabled")]
    Disabled,

    /// A non-stale active job already holds the key. Informational for the
    /// caller, not a failure: the existing run is simply still in flight.
    #[error("a sync job is already active for this integration")]
    AlreadyActive { job: Box<SyncJob> },

    #[error("configuration lookup failed: {0}")]
    Config(#[from] ConfigStoreError),

    #[error("job store error: {0}")]
    Store(JobStoreError),
}

/// Gates creation of new jobs, reclaims stuck runs, and hands off execution.
pub struct AdmissionController {
    store: Arc<dyn JobStore>,
    configs: Arc<dyn IntegrationConfigStore>,
    trigger: Arc<dyn WorkerTrigger>,
}

impl AdmissionController {
    pub fn new(
        store: Arc<dyn JobStore>,
        configs: Arc<dyn IntegrationConfigStore>,
        trigger: Arc<dyn WorkerTrigger>,
    ) -> Self {
        Self {
            store,
            configs,
            trigger,
        }
    }

    /// Admit a sync job for (tenant, provider).
    ///
    /// Side effects: at most one insert, at most one forced reclamation, one
    /// best-effort outbound trigger call (never awaited by this request).
    pub async fn submit(
        &self,
        tenant_id: TenantId,
        provider: ProviderSlug,
        actor: UserId,
    ) -> Result<SubmitReceipt, AdmissionError> {
        let config = self
            .configs
            .get(tenant_id, &provider)
            .await?
            .ok_or(AdmissionError::NotConfigured)?;
        if !config.enabled {
            return Err(AdmissionError::Disabled);
        }

        let now = Utc::now();
        if let Some(active) = self
            .store
            .active_job(tenant_id, &provider)
            .await
            .map_err(AdmissionError::Store)?
        {
            if !active.is_stale(now) {
                return Err(AdmissionError::AlreadyActive {
                    job: Box::new(active),
                });
            }

            let reclaimed = self
                .store
                .reclaim(tenant_id, active.id, RECLAIM_MESSAGE, now)
                .await
                .map_err(AdmissionError::Store)?;
            tracing::warn!(
                tenant_id = %tenant_id,
                provider = %provider,
                job_id = %reclaimed.id,
                age_secs = active.age(now).num_seconds(),
                "reclaimed stale sync job"
            );
        }

        let job = SyncJob::submitted(tenant_id, provider, actor);
        let job = match self.store.try_insert_active(job).await {
            Ok(job) => job,
            // A concurrent submission won the key between our read and the
            // insert; surface the winner exactly like the fresh-job case.
            Err(JobStoreError::ActiveExists(existing)) => {
                return Err(AdmissionError::AlreadyActive { job: existing })
            }
            Err(e) => return Err(AdmissionError::Store(e)),
        };

        tracing::info!(
            tenant_id = %tenant_id,
            provider = %job.provider,
            job_id = %job.id,
            "sync job admitted"
        );

        self.dispatch_worker(job.id);

        Ok(SubmitReceipt {
            job_id: job.id,
            status: job.status,
        })
    }

    /// Fire the worker trigger without blocking the submission.
    ///
    /// A dispatch failure leaves the pending job with no guaranteed consumer
    /// until the next submission for its key; that gap is accepted and
    /// observable only through this log line.
    fn dispatch_worker(&self, job_id: JobId) {
        let trigger = Arc::clone(&self.trigger);
        tokio::spawn(async move {
            if let Err(e) = trigger.dispatch().await {
                tracing::warn!(
                    job_id = %job_id,
                    error = %e,
                    "worker trigger dispatch failed; job stays pending until the next submission"
                );
            }
        });
    }
}
