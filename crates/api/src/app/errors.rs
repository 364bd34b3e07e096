use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

use syncgate_jobs::AdmissionError;

pub fn admission_error_to_response(err: AdmissionError) -> axum::response::Response {
    match err {
        AdmissionError::NotConfigured => json_error(
            StatusCode::NOT_FOUND,
            "not_configured",
            "integration is not configured for this tenant",
        ),
        AdmissionError::Disabled => json_error(
            StatusCode::BAD_REQUEST,
            "integration_disabled",
            "integration is disabled",
        ),
        // Informational contract: the caller learns which run holds the key.
        AdmissionError::AlreadyActive { job } => (
            StatusCode::CONFLICT,
            axum::Json(json!({
                "error": "sync_already_active",
                "job_id": job.id,
                "status": job.status,
            })),
        )
            .into_response(),
        AdmissionError::Config(e) => json_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "config_store_error",
            e.to_string(),
        ),
        AdmissionError::Store(e) => {
            json_error(StatusCode::INTERNAL_SERVER_ERROR, "store_error", e.to_string())
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> axum::response::Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}
