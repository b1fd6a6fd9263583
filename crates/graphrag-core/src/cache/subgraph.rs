//! Cache for raw subgraph reads (pre-LLM, pre-synthesis). Keyed by a
//! tenant-prefixed hash of the traversal parameters so two tenants can never
//! collide on the same key, with a generation counter standing in for bulk
//! invalidation on schema/topology changes.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Mutex;

struct Entry {
    value: serde_json::Value,
    generation: u64,
    recency: u64,
}

/// LRU cache of raw subgraph payloads, generation-stamped so a single
/// `bump_generation` call invalidates every entry without a scan.
pub struct SubgraphCache {
    max_entries: usize,
    generation: AtomicU64,
    entries: Mutex<HashMap<String, Entry>>,
    recency_order: Mutex<BTreeMap<u64, String>>,
    next_tick: AtomicU64,
}

impl SubgraphCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            max_entries,
            generation: AtomicU64::new(0),
            entries: Mutex::new(HashMap::new()),
            recency_order: Mutex::new(BTreeMap::new()),
            next_tick: AtomicU64::new(0),
        }
    }

    pub fn scoped_key(tenant_id: &str, raw_key: &str) -> String {
        format!("{tenant_id}::{raw_key}")
    }

    pub async fn get(&self, tenant_id: &str, raw_key: &str) -> Option<serde_json::Value> {
        let key = Self::scoped_key(tenant_id, raw_key);
        let current_generation = self.generation.load(Ordering::Acquire);

        let mut entries = self.entries.lock().await;
        let Some(entry) = entries.get(&key) else { return None };
        if entry.generation != current_generation {
            let stale = entries.remove(&key).expect("just checked present");
            self.recency_order.lock().await.remove(&stale.recency);
            return None;
        }

        let value = entry.value.clone();
        let old_recency = entry.recency;
        let new_recency = self.next_tick.fetch_add(1, Ordering::AcqRel);
        entries.get_mut(&key).expect("just checked present").recency = new_recency;
        drop(entries);

        let mut recency_order = self.recency_order.lock().await;
        recency_order.remove(&old_recency);
        recency_order.insert(new_recency, key);

        Some(value)
    }

    pub async fn put(&self, tenant_id: &str, raw_key: &str, value: serde_json::Value) {
        let key = Self::scoped_key(tenant_id, raw_key);
        let generation = self.generation.load(Ordering::Acquire);
        let recency = self.next_tick.fetch_add(1, Ordering::AcqRel);

        let mut entries = self.entries.lock().await;
        let mut recency_order = self.recency_order.lock().await;

        if let Some(old) = entries.remove(&key) {
            recency_order.remove(&old.recency);
        }

        while entries.len() >= self.max_entries {
            let Some((&oldest_recency, oldest_key)) = recency_order.iter().next().map(|(t, k)| (t, k.clone())) else {
                break;
            };
            recency_order.remove(&oldest_recency);
            entries.remove(&oldest_key);
        }

        entries.insert(key.clone(), Entry { value, generation, recency });
        recency_order.insert(recency, key);
    }

    /// Invalidates every entry currently stored without a scan: the next
    /// `get` for any of them observes a stale generation and evicts lazily.
    pub fn bump_generation(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let cache = SubgraphCache::new(10);
        cache.put("acme", "traverse:A", serde_json::json!(["A", "B"])).await;
        assert_eq!(cache.get("acme", "traverse:A").await, Some(serde_json::json!(["A", "B"])));
    }

    #[tokio::test]
    async fn tenants_do_not_collide_on_same_raw_key() {
        let cache = SubgraphCache::new(10);
        cache.put("acme", "traverse:A", serde_json::json!("acme-result")).await;
        cache.put("globex", "traverse:A", serde_json::json!("globex-result")).await;
        assert_eq!(cache.get("acme", "traverse:A").await, Some(serde_json::json!("acme-result")));
        assert_eq!(cache.get("globex", "traverse:A").await, Some(serde_json::json!("globex-result")));
    }

    #[tokio::test]
    async fn bump_generation_invalidates_without_removal() {
        let cache = SubgraphCache::new(10);
        cache.put("acme", "traverse:A", serde_json::json!("v1")).await;
        cache.bump_generation();
        assert_eq!(cache.get("acme", "traverse:A").await, None);
    }

    #[tokio::test]
    async fn lru_eviction_drops_oldest_entry() {
        let cache = SubgraphCache::new(2);
        cache.put("t", "a", serde_json::json!(1)).await;
        cache.put("t", "b", serde_json::json!(2)).await;
        cache.put("t", "c", serde_json::json!(3)).await;

        assert_eq!(cache.len().await, 2);
        assert_eq!(cache.get("t", "a").await, None);
        assert_eq!(cache.get("t", "c").await, Some(serde_json::json!(3)));
    }
}
