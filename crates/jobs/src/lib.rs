//! `syncgate-jobs` — integration job orchestration.
//!
//! ## Design
//!
//! - Jobs are tenant-scoped, keyed by (tenant, provider)
//! - At most one active (pending/running), non-stale job per key; the store
//!   enforces this with a conditional insert
//! - Stale active jobs (age > 15 min) are auto-healed on the next submission
//! - Execution belongs to an external worker, reached through a
//!   fire-and-forget trigger; the worker reports back by mutating job rows
//! - Every store mutation is pushed to subscribers as a change-feed record
//!
//! ## Components
//!
//! - `SyncJob`: the job entity and its lifecycle
//! - `JobStore`: persistence (in-memory or Postgres) plus the change feed
//! - `AdmissionController`: gates submissions, reclaims stuck runs
//! - `WorkerTrigger`: outbound nudge to the worker process
//! - `IntegrationConfigStore`: per-tenant provider configuration collaborator

pub mod admission;
pub mod change;
pub mod config;
pub mod job;
pub mod store;
pub mod trigger;

pub use admission::{AdmissionController, AdmissionError, SubmitReceipt, RECLAIM_MESSAGE};
pub use change::JobChange;
pub use config::{ConfigStoreError, IntegrationConfig, IntegrationConfigStore, InMemoryIntegrationConfigStore};
pub use job::{JobId, JobStatus, SyncJob, STALE_AFTER_MINUTES};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError, PostgresJobStore};
pub use trigger::{HttpWorkerTrigger, NoopTrigger, TriggerError, WorkerTrigger};
