//! `syncgate-client` — client-side job reconciliation.
//!
//! Maintains a local materialized view of a tenant's sync jobs, kept current
//! by the push change feed with a timed pull fallback, and exposes the
//! derived queries interactive UIs need (active job for a key, latest job,
//! history).

pub mod http;
pub mod reconciler;
pub mod view;

pub use http::HttpSyncApi;
pub use reconciler::{JobReconciler, SubmitOutcome, SyncApi, SyncError, REFETCH_DELAY};
pub use view::JobFeedView;
