//! HTTP transport to the admission surface.

use async_trait::async_trait;
use serde::Deserialize;

use syncgate_core::ProviderSlug;
use syncgate_jobs::{JobId, JobStatus, SubmitReceipt, SyncJob};

use crate::reconciler::{SubmitOutcome, SyncApi, SyncError};

/// Bearer-authenticated client for the sync HTTP API.
pub struct HttpSyncApi {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpSyncApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ConflictBody {
    job_id: JobId,
    status: JobStatus,
}

#[derive(Debug, Deserialize)]
struct JobListBody {
    items: Vec<SyncJob>,
}

#[async_trait]
impl SyncApi for HttpSyncApi {
    async fn submit(&self, provider: &ProviderSlug) -> Result<SubmitOutcome, SyncError> {
        let url = format!("{}/integrations/{}/sync", self.base_url, provider);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            let receipt: SubmitReceipt = resp
                .json()
                .await
                .map_err(|e| SyncError::Parse(e.to_string()))?;
            return Ok(SubmitOutcome::Submitted(receipt));
        }

        // 409 is "already in progress": informational, not an error.
        if status.as_u16() == 409 {
            let body: ConflictBody = resp
                .json()
                .await
                .map_err(|e| SyncError::Parse(e.to_string()))?;
            return Ok(SubmitOutcome::AlreadyRunning {
                job_id: body.job_id,
                status: body.status,
            });
        }

        let text = resp.text().await.unwrap_or_default();
        Err(SyncError::Api(status.as_u16(), text))
    }

    async fn fetch_jobs(&self) -> Result<Vec<SyncJob>, SyncError> {
        let url = format!("{}/integrations/jobs", self.base_url);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| SyncError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(SyncError::Api(status, text));
        }

        let body: JobListBody = resp
            .json()
            .await
            .map_err(|e| SyncError::Parse(e.to_string()))?;
        Ok(body.items)
    }
}
