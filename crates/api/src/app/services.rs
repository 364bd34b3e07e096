//! Infrastructure wiring for the HTTP app.

use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use syncgate_jobs::{
    AdmissionController, HttpWorkerTrigger, InMemoryIntegrationConfigStore, InMemoryJobStore,
    IntegrationConfigStore, JobStore, NoopTrigger, PostgresJobStore, WorkerTrigger,
};

/// Shared service graph for request handlers.
///
/// Everything admission needs is wired here once at process start and passed
/// down as an explicit context object (no ambient globals).
pub struct AppServices {
    store: Arc<dyn JobStore>,
    configs: Arc<dyn IntegrationConfigStore>,
    admission: AdmissionController,
}

impl AppServices {
    pub fn new(
        store: Arc<dyn JobStore>,
        configs: Arc<dyn IntegrationConfigStore>,
        trigger: Arc<dyn WorkerTrigger>,
    ) -> Self {
        let admission = AdmissionController::new(store.clone(), configs.clone(), trigger);
        Self {
            store,
            configs,
            admission,
        }
    }

    /// In-memory store (tests/dev).
    pub fn in_memory(trigger: Arc<dyn WorkerTrigger>) -> Self {
        Self::new(
            InMemoryJobStore::arc(),
            Arc::new(InMemoryIntegrationConfigStore::new()),
            trigger,
        )
    }

    /// Postgres-backed job store. Integration configuration stays in-memory:
    /// it belongs to the settings surface, which owns its own persistence.
    pub async fn postgres(
        database_url: &str,
        trigger: Arc<dyn WorkerTrigger>,
    ) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(8)
            .connect(database_url)
            .await?;

        let store = PostgresJobStore::new(pool);
        store.ensure_schema().await?;

        Ok(Self::new(
            Arc::new(store),
            Arc::new(InMemoryIntegrationConfigStore::new()),
            trigger,
        ))
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    pub fn configs(&self) -> &Arc<dyn IntegrationConfigStore> {
        &self.configs
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }
}

/// Build services from the environment.
///
/// - `WORKER_TRIGGER_URL` / `WORKER_TRIGGER_TOKEN`: outbound worker nudge;
///   without a URL the dispatch is a no-op (dev/tests).
/// - `DATABASE_URL`: Postgres job store; without it the store is in-memory.
pub async fn build_services() -> AppServices {
    let trigger: Arc<dyn WorkerTrigger> = match std::env::var("WORKER_TRIGGER_URL") {
        Ok(url) => {
            let token = std::env::var("WORKER_TRIGGER_TOKEN").unwrap_or_else(|_| {
                tracing::warn!("WORKER_TRIGGER_TOKEN not set; using empty credential");
                String::new()
            });
            Arc::new(HttpWorkerTrigger::new(url, token))
        }
        Err(_) => {
            tracing::warn!("WORKER_TRIGGER_URL not set; worker dispatch is a no-op");
            Arc::new(NoopTrigger)
        }
    };

    match std::env::var("DATABASE_URL") {
        Ok(url) => match AppServices::postgres(&url, trigger.clone()).await {
            Ok(services) => services,
            Err(e) => {
                tracing::error!(error = %e, "postgres init failed; falling back to in-memory store");
                AppServices::in_memory(trigger)
            }
        },
        Err(_) => AppServices::in_memory(trigger),
    }
}
