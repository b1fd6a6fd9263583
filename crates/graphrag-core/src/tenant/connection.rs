//! Tenant-bound connection wrapper and graph-server edition gating.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::error::{CoreError, Result};

use super::registry::TenantRegistry;

/// A connection bound to exactly one tenant and database. The wrapper
/// itself carries no mutable state beyond the binding tuple, so it is
/// stateless beyond that and safe to share across tasks.
#[derive(Debug, Clone)]
pub struct TenantConnectionWrapper {
    bound_tenant_id: String,
    bound_database: String,
}

impl TenantConnectionWrapper {
    pub fn new(bound_tenant_id: impl Into<String>, bound_database: impl Into<String>) -> Self {
        Self {
            bound_tenant_id: bound_tenant_id.into(),
            bound_database: bound_database.into(),
        }
    }

    pub fn tenant_id(&self) -> &str {
        &self.bound_tenant_id
    }

    pub fn database(&self) -> &str {
        &self.bound_database
    }

    /// Every query dispatch must call this before running; a mismatch
    /// indicates an attempt to cross a tenant boundary and is never
    /// suppressed.
    pub fn validate_query_tenant(&self, tenant_id: &str) -> Result<()> {
        if tenant_id != self.bound_tenant_id {
            return Err(CoreError::TenantIsolationViolation(format!(
                "query tenant {tenant_id} does not match connection bound to {}",
                self.bound_tenant_id
            )));
        }
        Ok(())
    }

    pub fn validate_database(&self, database: &str) -> Result<()> {
        if database != self.bound_database {
            return Err(CoreError::TenantIsolationViolation(format!(
                "query database {database} does not match connection bound to {}",
                self.bound_database
            )));
        }
        Ok(())
    }
}

/// Graph-server edition probe, abstracted so tests can stub it without a
/// live driver.
#[async_trait]
pub trait GraphServerProbe: Send + Sync {
    async fn edition(&self) -> Result<String>;
}

/// Physical isolation requires an edition that supports multiple
/// databases. Community editions only support one; registering any
/// physical tenant against a community server is a configuration error
/// that must be caught before it silently falls back to shared storage.
pub async fn validate_physical_isolation_support(
    probe: &dyn GraphServerProbe,
    registry: &TenantRegistry,
) -> Result<()> {
    let has_physical = registry
        .all()
        .await
        .iter()
        .any(|t| t.isolation_mode == crate::model::IsolationMode::Physical);

    if !has_physical {
        return Ok(());
    }

    let edition = probe.edition().await?;
    if edition.eq_ignore_ascii_case("community") {
        return Err(CoreError::TenantIsolationViolation(
            "physical isolation requires a multi-database graph server edition".into(),
        ));
    }
    Ok(())
}

/// Detects pools that are live but no longer correspond to a registered
/// tenant — a sign of a leaked connection pool after tenant removal.
pub async fn detect_orphaned_pools(registry: &TenantRegistry, active_pool_tenant_ids: &[String]) -> Vec<String> {
    let registered: HashSet<String> = registry.all().await.into_iter().map(|t| t.tenant_id).collect();
    active_pool_tenant_ids
        .iter()
        .filter(|id| !registered.contains(*id))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TenantConfig;

    #[test]
    fn mismatched_tenant_is_rejected() {
        let wrapper = TenantConnectionWrapper::new("acme", "acme_db");
        assert!(wrapper.validate_query_tenant("acme").is_ok());
        assert!(matches!(
            wrapper.validate_query_tenant("globex"),
            Err(CoreError::TenantIsolationViolation(_))
        ));
    }

    #[test]
    fn mismatched_database_is_rejected() {
        let wrapper = TenantConnectionWrapper::new("acme", "acme_db");
        assert!(matches!(
            wrapper.validate_database("other_db"),
            Err(CoreError::TenantIsolationViolation(_))
        ));
    }

    struct FixedEdition(&'static str);
    #[async_trait]
    impl GraphServerProbe for FixedEdition {
        async fn edition(&self) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn physical_tenant_on_community_edition_fails() {
        let registry = TenantRegistry::new();
        registry.register(TenantConfig::new("acme", "acme_db")).await.unwrap();
        let probe = FixedEdition("community");
        assert!(validate_physical_isolation_support(&probe, &registry).await.is_err());
    }

    #[tokio::test]
    async fn physical_tenant_on_enterprise_edition_passes() {
        let registry = TenantRegistry::new();
        registry.register(TenantConfig::new("acme", "acme_db")).await.unwrap();
        let probe = FixedEdition("enterprise");
        assert!(validate_physical_isolation_support(&probe, &registry).await.is_ok());
    }

    #[tokio::test]
    async fn orphaned_pools_are_detected() {
        let registry = TenantRegistry::new();
        registry.register(TenantConfig::new("acme", "acme_db")).await.unwrap();
        let orphans = detect_orphaned_pools(&registry, &["acme".to_string(), "ghost".to_string()]).await;
        assert_eq!(orphans, vec!["ghost".to_string()]);
    }
}
