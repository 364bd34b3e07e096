//! Change-feed records for the job collection.

use serde::{Deserialize, Serialize};

use syncgate_core::TenantId;
use syncgate_events::TenantScoped;

use crate::job::SyncJob;

/// A single change to the job collection, as pushed to subscribers.
///
/// Wire shape: `{"event_type": "insert" | "update" | "delete", "record": {...}}`.
/// Deletes never originate from this subsystem (history is retained) but the
/// protocol carries them so clients merge a complete contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "record", rename_all = "snake_case")]
pub enum JobChange {
    Insert(SyncJob),
    Update(SyncJob),
    Delete(SyncJob),
}

impl JobChange {
    pub fn record(&self) -> &SyncJob {
        match self {
            JobChange::Insert(job) | JobChange::Update(job) | JobChange::Delete(job) => job,
        }
    }

    /// Wire name of the change kind (`insert`/`update`/`delete`).
    pub fn kind(&self) -> &'static str {
        match self {
            JobChange::Insert(_) => "insert",
            JobChange::Update(_) => "update",
            JobChange::Delete(_) => "delete",
        }
    }
}

impl TenantScoped for JobChange {
    fn tenant_id(&self) -> TenantId {
        self.record().tenant_id
    }
}
