//! Integration configuration collaborator.
//!
//! Whether a tenant may sync a given provider is decided by configuration
//! owned elsewhere (the settings surface of the control panel). Admission
//! only needs the lookup, so the boundary is a small trait.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use syncgate_core::{ProviderSlug, TenantId};

/// Per-tenant configuration of one integration provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationConfig {
    pub provider: ProviderSlug,
    pub display_name: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigStoreError {
    #[error("configuration storage error: {0}")]
    Storage(String),
}

/// Lookup boundary for integration configuration.
#[async_trait]
pub trait IntegrationConfigStore: Send + Sync {
    async fn get(
        &self,
        tenant_id: TenantId,
        provider: &ProviderSlug,
    ) -> Result<Option<IntegrationConfig>, ConfigStoreError>;

    async fn upsert(
        &self,
        tenant_id: TenantId,
        config: IntegrationConfig,
    ) -> Result<(), ConfigStoreError>;

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<IntegrationConfig>, ConfigStoreError>;
}

/// In-memory configuration store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryIntegrationConfigStore {
    inner: RwLock<HashMap<(TenantId, ProviderSlug), IntegrationConfig>>,
}

impl InMemoryIntegrationConfigStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntegrationConfigStore for InMemoryIntegrationConfigStore {
    async fn get(
        &self,
        tenant_id: TenantId,
        provider: &ProviderSlug,
    ) -> Result<Option<IntegrationConfig>, ConfigStoreError> {
        let map = self
            .inner
            .read()
            .map_err(|e| ConfigStoreError::Storage(e.to_string()))?;
        Ok(map.get(&(tenant_id, provider.clone())).cloned())
    }

    async fn upsert(
        &self,
        tenant_id: TenantId,
        config: IntegrationConfig,
    ) -> Result<(), ConfigStoreError> {
        let mut map = self
            .inner
            .write()
            .map_err(|e| ConfigStoreError::Storage(e.to_string()))?;
        map.insert((tenant_id, config.provider.clone()), config);
        Ok(())
    }

    async fn list(&self, tenant_id: TenantId) -> Result<Vec<IntegrationConfig>, ConfigStoreError> {
        let map = self
            .inner
            .read()
            .map_err(|e| ConfigStoreError::Storage(e.to_string()))?;
        let mut items: Vec<_> = map
            .iter()
            .filter(|((t, _), _)| *t == tenant_id)
            .map(|(_, v)| v.clone())
            .collect();
        items.sort_by(|a, b| a.provider.as_str().cmp(b.provider.as_str()));
        Ok(items)
    }
}
