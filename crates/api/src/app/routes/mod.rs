use axum::{routing::get, Router};

pub mod common;
pub mod job_stream;
pub mod sync;
pub mod system;

/// Protected route tree (auth middleware is layered on by the app builder).
pub fn router() -> Router {
    Router::new()
        .route("/whoami", get(system::whoami))
        .nest("/integrations", sync::router())
}
