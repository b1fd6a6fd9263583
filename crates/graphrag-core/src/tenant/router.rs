//! Resolves a tenant id to its bound database and produces a connection.

use std::collections::HashMap;

use super::connection::TenantConnectionWrapper;
use super::registry::TenantRegistry;

const DEFAULT_DATABASE: &str = "neo4j";

pub struct TenantRouter<'a> {
    registry: &'a TenantRegistry,
}

impl<'a> TenantRouter<'a> {
    pub fn new(registry: &'a TenantRegistry) -> Self {
        Self { registry }
    }

    /// Resolves `tenant_id` to its bound database, falling back to
    /// `neo4j` when the tenant is unregistered (e.g. during bootstrap).
    pub async fn resolve_database(&self, tenant_id: &str) -> String {
        self.registry
            .get(tenant_id)
            .await
            .map(|t| t.database)
            .unwrap_or_else(|| DEFAULT_DATABASE.to_string())
    }

    pub async fn session_args(&self, tenant_id: &str) -> HashMap<String, String> {
        let database = self.resolve_database(tenant_id).await;
        HashMap::from([("database".to_string(), database)])
    }

    pub async fn get_connection(&self, tenant_id: &str) -> TenantConnectionWrapper {
        let database = self.resolve_database(tenant_id).await;
        TenantConnectionWrapper::new(tenant_id, database)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TenantConfig;

    #[tokio::test]
    async fn resolves_registered_tenant_database() {
        let registry = TenantRegistry::new();
        registry.register(TenantConfig::new("acme", "acme_db")).await.unwrap();
        let router = TenantRouter::new(&registry);
        assert_eq!(router.resolve_database("acme").await, "acme_db");
    }

    #[tokio::test]
    async fn unregistered_tenant_falls_back_to_neo4j() {
        let registry = TenantRegistry::new();
        let router = TenantRouter::new(&registry);
        assert_eq!(router.resolve_database("ghost").await, "neo4j");
    }

    #[tokio::test]
    async fn get_connection_binds_tenant_and_database() {
        let registry = TenantRegistry::new();
        registry.register(TenantConfig::new("acme", "acme_db")).await.unwrap();
        let router = TenantRouter::new(&registry);
        let conn = router.get_connection("acme").await;
        assert_eq!(conn.tenant_id(), "acme");
        assert_eq!(conn.database(), "acme_db");
    }
}
