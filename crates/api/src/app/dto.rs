//! Request/response DTOs for the sync API.

use serde::{Deserialize, Serialize};

use syncgate_jobs::{IntegrationConfig, JobStats, SyncJob};

/// `GET /integrations/jobs` and `GET /integrations/:provider/jobs`.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub items: Vec<SyncJob>,
}

/// `GET /integrations/jobs/stats`.
#[derive(Debug, Serialize)]
pub struct JobStatsResponse {
    #[serde(flatten)]
    pub stats: JobStats,
}

/// `PUT /integrations/:provider/config`.
#[derive(Debug, Deserialize)]
pub struct UpsertConfigRequest {
    pub display_name: Option<String>,
    pub enabled: bool,
}

/// `GET`/`PUT /integrations/:provider/config` response.
#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    #[serde(flatten)]
    pub config: IntegrationConfig,
}
