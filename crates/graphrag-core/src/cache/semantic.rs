//! Two-level semantic query cache: local L1 plus an optional shared L2
//! reached only through the invalidation stream (never scripted deletes).

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::model::EntryQuality;

use super::invalidation::InvalidationPublisher;
use super::singleflight::Singleflight;
use super::store::{CacheConfig, CacheMetrics, SemanticCacheStore};

pub struct SemanticCache {
    store: RwLock<SemanticCacheStore>,
    singleflight: Singleflight<String>,
    publisher: Option<Arc<dyn InvalidationPublisher>>,
}

impl SemanticCache {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            store: RwLock::new(SemanticCacheStore::new(config)),
            singleflight: Singleflight::new(),
            publisher: None,
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn InvalidationPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    fn coalescing_key(tenant_id: &str, acl_key: &str, key_hash: &str) -> String {
        format!("{tenant_id}:{acl_key}:{key_hash}")
    }

    pub async fn lookup(
        &self,
        embedding: &[f32],
        tenant_id: &str,
        acl_key: &str,
        current_node_ids: &[String],
    ) -> Option<serde_json::Value> {
        self.store.write().await.lookup(embedding, tenant_id, acl_key, current_node_ids)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn store(
        &self,
        key_hash: String,
        embedding: Vec<f32>,
        query: String,
        result: serde_json::Value,
        tenant_id: String,
        acl_key: String,
        node_ids: HashSet<String>,
        topology_hash: String,
        ttl_base_seconds: Option<u64>,
        quality: EntryQuality,
    ) {
        self.store.write().await.insert(
            key_hash,
            embedding,
            query,
            result,
            tenant_id,
            acl_key,
            node_ids,
            topology_hash,
            ttl_base_seconds,
            quality,
        );
    }

    /// Returns `(result, is_owner)`. `is_owner == true` means the caller
    /// must compute the value and call [`Self::notify_complete`] exactly
    /// once (store the result first on success).
    pub async fn lookup_or_wait(
        &self,
        embedding: &[f32],
        tenant_id: &str,
        acl_key: &str,
        key_hash: &str,
        current_node_ids: &[String],
    ) -> (Option<serde_json::Value>, bool) {
        loop {
            if let Some(hit) = self.lookup(embedding, tenant_id, acl_key, current_node_ids).await {
                return (Some(hit), false);
            }

            let key = Self::coalescing_key(tenant_id, acl_key, key_hash);
            if self.singleflight.acquire(key).await {
                // Re-check: another owner may have populated the entry
                // between our miss above and acquiring ownership.
                if let Some(hit) = self.lookup(embedding, tenant_id, acl_key, current_node_ids).await {
                    self.notify_complete(tenant_id, acl_key, key_hash, false).await;
                    return (Some(hit), false);
                }
                return (None, true);
            }
        }
    }

    pub async fn notify_complete(&self, tenant_id: &str, acl_key: &str, key_hash: &str, failed: bool) {
        let key = Self::coalescing_key(tenant_id, acl_key, key_hash);
        self.singleflight.complete(&key, failed).await;
    }

    pub async fn validate_topology(
        &self,
        tenant_id: &str,
        acl_key: &str,
        embedding: &[f32],
        current_node_ids: &[String],
    ) -> bool {
        self.store.read().await.validate_topology_for(tenant_id, acl_key, embedding, current_node_ids)
    }

    /// L1 eviction runs synchronously; the L2 publish is attempted but a
    /// failure there is non-fatal (L1 is already consistent).
    pub async fn invalidate_by_nodes(&self, node_ids: &[String]) -> usize {
        let removed = self.invalidate_by_nodes_local(node_ids).await;

        if let Some(publisher) = &self.publisher {
            if let Err(err) = publisher.publish(node_ids.to_vec()).await {
                tracing::warn!(error = %err, "failed to publish cache invalidation event, L1 already purged");
            }
        }

        removed
    }

    /// L1-only eviction, used both by the public invalidation path and by
    /// the invalidation worker applying a remote event.
    pub async fn invalidate_by_nodes_local(&self, node_ids: &[String]) -> usize {
        self.store.write().await.invalidate_by_nodes(node_ids)
    }

    pub async fn invalidate_stale_topologies(&self, current: &[String]) -> usize {
        self.store.write().await.invalidate_stale_topologies(current)
    }

    pub async fn metrics(&self) -> CacheMetrics {
        self.store.read().await.metrics()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    pub async fn get_valid_scores(&self) -> Vec<crate::model::CacheEntry> {
        self.store.read().await.get_valid_scores()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_caller_waits_then_sees_stored_result_after_owner_completes() {
        let cache = Arc::new(SemanticCache::new(CacheConfig::default()));

        let (first, is_owner) = cache
            .lookup_or_wait(&[1.0, 0.0], "acme", "acl", "k1", &[])
            .await;
        assert!(first.is_none());
        assert!(is_owner);

        let cache2 = cache.clone();
        let waiter = tokio::spawn(async move { cache2.lookup_or_wait(&[1.0, 0.0], "acme", "acl", "k1", &[]).await });

        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        cache
            .store(
                "k1".to_string(),
                vec![1.0, 0.0],
                "q".to_string(),
                serde_json::json!({"ok": true}),
                "acme".to_string(),
                "acl".to_string(),
                std::collections::HashSet::new(),
                String::new(),
                None,
                EntryQuality::Good,
            )
            .await;
        cache.notify_complete("acme", "acl", "k1", false).await;

        let (result, is_owner) = waiter.await.unwrap();
        assert_eq!(result, Some(serde_json::json!({"ok": true})));
        assert!(!is_owner);
    }

    #[tokio::test]
    async fn invalidate_by_nodes_decreases_size() {
        let cache = SemanticCache::new(CacheConfig::default());
        cache
            .store(
                "k1".to_string(),
                vec![1.0, 0.0, 0.0],
                "what calls auth?".to_string(),
                serde_json::json!({"a": "gw"}),
                "acme".to_string(),
                "".to_string(),
                std::collections::HashSet::from(["A".to_string(), "B".to_string()]),
                super::super::topology::compute_topology_hash(["A", "B"]),
                None,
                EntryQuality::Good,
            )
            .await;

        assert!(cache.validate_topology("acme", "", &[1.0, 0.0, 0.0], &["A".to_string(), "B".to_string()]).await);
        assert_eq!(
            cache.lookup(&[1.0, 0.0, 0.0], "acme", "", &["A".to_string(), "B".to_string()]).await,
            Some(serde_json::json!({"a": "gw"}))
        );

        let before = cache.len().await;
        cache.invalidate_by_nodes(&["A".to_string()]).await;
        let after = cache.len().await;
        assert_eq!(before - after, 1);
        assert!(cache.lookup(&[1.0, 0.0, 0.0], "acme", "", &[]).await.is_none());
    }
}
