//! Outbound worker trigger.
//!
//! The worker is a separate process that polls and claims pending jobs; the
//! trigger is only a nudge so it wakes up promptly. No job payload travels
//! with the call.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("network error: {0}")]
    Network(String),

    #[error("worker endpoint returned {0}")]
    Status(u16),
}

/// Fire-and-forget invocation boundary for the worker process.
#[async_trait]
pub trait WorkerTrigger: Send + Sync {
    async fn dispatch(&self) -> Result<(), TriggerError>;
}

/// HTTP trigger: POST an empty JSON body to a fixed internal URL with a
/// privileged bearer credential. The response is not inspected beyond the
/// status code.
pub struct HttpWorkerTrigger {
    url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpWorkerTrigger {
    pub fn new(url: String, token: String) -> Self {
        Self {
            url,
            token,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl WorkerTrigger for HttpWorkerTrigger {
    async fn dispatch(&self) -> Result<(), TriggerError> {
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(&self.token)
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| TriggerError::Network(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(TriggerError::Status(resp.status().as_u16()));
        }
        Ok(())
    }
}

/// No-op trigger for tests and for running without a worker deployment.
#[derive(Debug, Default)]
pub struct NoopTrigger;

#[async_trait]
impl WorkerTrigger for NoopTrigger {
    async fn dispatch(&self) -> Result<(), TriggerError> {
        Ok(())
    }
}
