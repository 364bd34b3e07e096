//! Integration sync endpoints: submission, job queries, configuration.

use std::sync::Arc;

use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};

use syncgate_auth::Permission;
use syncgate_core::{ProviderSlug, UserId};
use syncgate_jobs::{IntegrationConfig, IntegrationConfigStore, JobStore};

use crate::app::routes::common::CmdAuth;
use crate::app::routes::job_stream;
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::context::{PrincipalContext, TenantContext};

pub fn router() -> Router {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/stats", get(job_stats))
        .route("/jobs/stream", get(job_stream::stream_jobs))
        .route("/:provider/sync", post(submit_sync))
        .route("/:provider/jobs", get(provider_history))
        .route("/:provider/config", get(get_config).put(upsert_config))
}

/// POST /integrations/:provider/sync
///
/// Admission endpoint. `200 {job_id, status}` on success; `409` with the
/// existing job when a non-stale run already holds the key.
pub async fn submit_sync(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(provider): Path<String>,
) -> axum::response::Response {
    let provider: ProviderSlug = match provider.parse() {
        Ok(p) => p,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_provider", e.to_string())
        }
    };

    let cmd_auth = CmdAuth {
        inner: (),
        required: vec![Permission::new("integrations.sync")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let actor = UserId::from_uuid(*principal.principal_id().as_uuid());
    match services
        .admission()
        .submit(tenant.tenant_id(), provider, actor)
        .await
    {
        Ok(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
        Err(e) => errors::admission_error_to_response(e),
    }
}

/// GET /integrations/jobs: all jobs for the tenant, most recent first.
pub async fn list_jobs(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    match services.store().list(tenant.tenant_id()).await {
        Ok(items) => (StatusCode::OK, Json(dto::JobListResponse { items })).into_response(),
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()),
    }
}

/// GET /integrations/:provider/jobs: per-key history, most recent first.
pub async fn provider_history(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(provider): Path<String>,
) -> axum::response::Response {
    let provider: ProviderSlug = match provider.parse() {
        Ok(p) => p,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_provider", e.to_string())
        }
    };

    match services.store().history(tenant.tenant_id(), &provider).await {
        Ok(items) => (StatusCode::OK, Json(dto::JobListResponse { items })).into_response(),
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()),
    }
}

/// GET /integrations/jobs/stats: per-status counts for the tenant.
pub async fn job_stats(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
) -> axum::response::Response {
    match services.store().stats(tenant.tenant_id()).await {
        Ok(stats) => (StatusCode::OK, Json(dto::JobStatsResponse { stats })).into_response(),
        Err(e) => errors::json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string()),
    }
}

/// GET /integrations/:provider/config
pub async fn get_config(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Path(provider): Path<String>,
) -> axum::response::Response {
    let provider: ProviderSlug = match provider.parse() {
        Ok(p) => p,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_provider", e.to_string())
        }
    };

    match services.configs().get(tenant.tenant_id(), &provider).await {
        Ok(Some(config)) => (StatusCode::OK, Json(dto::ConfigResponse { config })).into_response(),
        Ok(None) => errors::json_error(
            StatusCode::NOT_FOUND,
            "not_configured",
            "integration is not configured for this tenant",
        ),
        Err(e) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "config_store_error",
            e.to_string(),
        ),
    }
}

/// PUT /integrations/:provider/config: enable/disable an integration.
pub async fn upsert_config(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(tenant): Extension<TenantContext>,
    Extension(principal): Extension<PrincipalContext>,
    Path(provider): Path<String>,
    Json(body): Json<dto::UpsertConfigRequest>,
) -> axum::response::Response {
    let provider: ProviderSlug = match provider.parse() {
        Ok(p) => p,
        Err(e) => {
            return errors::json_error(StatusCode::BAD_REQUEST, "invalid_provider", e.to_string())
        }
    };

    let cmd_auth = CmdAuth {
        inner: (),
        required: vec![Permission::new("integrations.manage")],
    };
    if let Err(e) = crate::authz::authorize_command(&tenant, &principal, &cmd_auth) {
        return errors::json_error(StatusCode::FORBIDDEN, "forbidden", e.to_string());
    }

    let config = IntegrationConfig {
        display_name: body
            .display_name
            .unwrap_or_else(|| provider.as_str().to_string()),
        provider,
        enabled: body.enabled,
    };

    match services.configs().upsert(tenant.tenant_id(), config.clone()).await {
        Ok(()) => (StatusCode::OK, Json(dto::ConfigResponse { config })).into_response(),
        Err(e) => errors::json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "config_store_error",
            e.to_string(),
        ),
    }
}
