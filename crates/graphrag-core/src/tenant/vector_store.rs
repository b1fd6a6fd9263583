//! Tenant-aware vector search, isolated the same way as graph storage:
//! physical (per-tenant collection) in production, logical (shared
//! collection filtered by metadata) allowed only in development.

use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::config::DeploymentMode;
use crate::error::{CoreError, Result};
use crate::cache::similarity::cosine_similarity;
use crate::model::IsolationMode;

#[derive(Debug, Clone)]
struct VectorRecord {
    id: String,
    embedding: Vec<f32>,
    tenant_id: String,
}

pub fn resolve_collection_name(collection: &str, tenant_id: &str) -> String {
    format!("{collection}__{tenant_id}")
}

/// Development/testing vector store. Production deployments are expected
/// to back this capability with a real vector database; this store exists
/// to exercise the isolation-routing logic deterministically.
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<VectorRecord>>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
        }
    }

    pub async fn upsert(&self, collection: &str, id: &str, embedding: Vec<f32>, tenant_id: &str) {
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .push(VectorRecord { id: id.to_string(), embedding, tenant_id: tenant_id.to_string() });
    }

    /// Routes the search by isolation mode and deployment mode. Physical
    /// isolation always searches `resolve_collection_name(collection,
    /// tenant_id)`. Logical isolation searches the shared `collection`
    /// filtered by `tenant_id`, but is rejected outright in production.
    pub async fn search_with_tenant(
        &self,
        collection: &str,
        query_embedding: &[f32],
        tenant_id: &str,
        isolation_mode: IsolationMode,
        deployment_mode: DeploymentMode,
        top_k: usize,
    ) -> Result<Vec<(String, f32)>> {
        if isolation_mode == IsolationMode::Logical && deployment_mode.is_production() {
            return Err(CoreError::TenantIsolationViolation(
                "logical vector isolation is rejected in production".into(),
            ));
        }

        let collections = self.collections.read().await;

        let candidates: Vec<&VectorRecord> = match isolation_mode {
            IsolationMode::Physical => {
                let physical_name = resolve_collection_name(collection, tenant_id);
                collections.get(&physical_name).map(|v| v.iter().collect()).unwrap_or_default()
            }
            IsolationMode::Logical => collections
                .get(collection)
                .map(|records| records.iter().filter(|r| r.tenant_id == tenant_id).collect())
                .unwrap_or_default(),
        };

        let mut scored: Vec<(String, f32)> = candidates
            .into_iter()
            .map(|r| (r.id.clone(), cosine_similarity(&r.embedding, query_embedding)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        Ok(scored)
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn physical_isolation_only_sees_own_collection() {
        let store = InMemoryVectorStore::new();
        store.upsert(&resolve_collection_name("svc", "acme"), "a", vec![1.0, 0.0], "acme").await;
        store.upsert(&resolve_collection_name("svc", "globex"), "b", vec![1.0, 0.0], "globex").await;

        let hits = store
            .search_with_tenant("svc", &[1.0, 0.0], "acme", IsolationMode::Physical, DeploymentMode::Production, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "a");
    }

    #[tokio::test]
    async fn logical_isolation_rejected_in_production() {
        let store = InMemoryVectorStore::new();
        let result = store
            .search_with_tenant("svc", &[1.0, 0.0], "acme", IsolationMode::Logical, DeploymentMode::Production, 10)
            .await;
        assert!(matches!(result, Err(CoreError::TenantIsolationViolation(_))));
    }

    #[tokio::test]
    async fn logical_isolation_allowed_in_dev_and_filters_by_tenant() {
        let store = InMemoryVectorStore::new();
        store.upsert("shared", "a", vec![1.0, 0.0], "acme").await;
        store.upsert("shared", "b", vec![1.0, 0.0], "globex").await;

        let hits = store
            .search_with_tenant("shared", &[1.0, 0.0], "acme", IsolationMode::Logical, DeploymentMode::Dev, 10)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0, "a");
    }
}
