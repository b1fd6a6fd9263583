//! Registry of known tenants and their isolation configuration.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::error::{CoreError, Result};
use crate::model::TenantConfig;

pub struct TenantRegistry {
    tenants: RwLock<HashMap<String, TenantConfig>>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a new tenant. Rejects a duplicate `tenant_id` rather than
    /// silently overwriting its configuration.
    pub async fn register(&self, config: TenantConfig) -> Result<()> {
        let mut tenants = self.tenants.write().await;
        if tenants.contains_key(&config.tenant_id) {
            return Err(CoreError::Validation(format!(
                "tenant {} is already registered",
                config.tenant_id
            )));
        }
        tenants.insert(config.tenant_id.clone(), config);
        Ok(())
    }

    /// Returns `true` if a tenant with this id was present and removed.
    pub async fn remove(&self, tenant_id: &str) -> bool {
        self.tenants.write().await.remove(tenant_id).is_some()
    }

    pub async fn get(&self, tenant_id: &str) -> Option<TenantConfig> {
        self.tenants.read().await.get(tenant_id).cloned()
    }

    pub async fn all(&self) -> Vec<TenantConfig> {
        self.tenants.read().await.values().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.tenants.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tenants.read().await.is_empty()
    }
}

impl Default for TenantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_registration_is_rejected() {
        let registry = TenantRegistry::new();
        registry.register(TenantConfig::new("acme", "acme_db")).await.unwrap();
        let result = registry.register(TenantConfig::new("acme", "acme_db")).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn remove_returns_whether_tenant_was_present() {
        let registry = TenantRegistry::new();
        registry.register(TenantConfig::new("acme", "acme_db")).await.unwrap();
        assert!(registry.remove("acme").await);
        assert!(!registry.remove("acme").await);
    }
}
