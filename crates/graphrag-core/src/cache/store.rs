//! L1 semantic cache store: primary map plus the tenant/ACL, node, and LRU
//! indices kept in sync on every mutation.

use std::collections::{BTreeMap, HashMap, HashSet};

use rand::Rng;

use crate::model::{CacheEntry, EntryQuality};

use super::similarity::cosine_similarity;
use super::topology::validate_topology;

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub max_entries: usize,
    pub similarity_threshold: f32,
    pub default_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            similarity_threshold: 0.92,
            default_ttl_seconds: 300,
        }
    }
}

struct Indexed {
    entry: CacheEntry,
    recency: u64,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct CacheMetrics {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheMetrics {
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Local, single-process cache store. Every read/write path that touches
/// the primary map also updates `tenant_acl_index`, `node_index`, and the
/// recency order under the same lock, so the four structures never drift.
pub struct SemanticCacheStore {
    config: CacheConfig,
    primary: HashMap<String, Indexed>,
    tenant_acl_index: HashMap<(String, String), HashSet<String>>,
    node_index: HashMap<String, HashSet<String>>,
    recency_order: BTreeMap<u64, String>,
    next_tick: u64,
    metrics: CacheMetrics,
}

impl SemanticCacheStore {
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            primary: HashMap::new(),
            tenant_acl_index: HashMap::new(),
            node_index: HashMap::new(),
            recency_order: BTreeMap::new(),
            next_tick: 0,
            metrics: CacheMetrics::default(),
        }
    }

    fn now_millis() -> u64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("system clock before epoch")
            .as_millis() as u64
    }

    /// Jittered TTL within ±20% of `base_seconds`.
    fn jittered_ttl(base_seconds: u64) -> u64 {
        let jitter_fraction = rand::thread_rng().gen_range(-0.2..=0.2);
        let jittered = base_seconds as f64 * (1.0 + jitter_fraction);
        jittered.max(1.0) as u64
    }

    fn touch_recency(&mut self, key: &str) {
        if let Some(indexed) = self.primary.get_mut(key) {
            self.recency_order.remove(&indexed.recency);
            self.next_tick += 1;
            indexed.recency = self.next_tick;
            self.recency_order.insert(indexed.recency, key.to_string());
        }
    }

    fn remove_key(&mut self, key: &str) {
        if let Some(indexed) = self.primary.remove(key) {
            self.recency_order.remove(&indexed.recency);
            let scope = (indexed.entry.tenant_id.clone(), indexed.entry.acl_key.clone());
            if let Some(set) = self.tenant_acl_index.get_mut(&scope) {
                set.remove(key);
                if set.is_empty() {
                    self.tenant_acl_index.remove(&scope);
                }
            }
            for node_id in &indexed.entry.node_ids {
                if let Some(set) = self.node_index.get_mut(node_id) {
                    set.remove(key);
                    if set.is_empty() {
                        self.node_index.remove(node_id);
                    }
                }
            }
        }
    }

    fn evict_lru(&mut self) {
        if let Some((_, key)) = self.recency_order.iter().next().map(|(t, k)| (*t, k.clone())) {
            self.remove_key(&key);
            self.metrics.evictions += 1;
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert(
        &mut self,
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
        self.remove_key(&key_hash);

        while self.primary.len() >= self.config.max_entries {
            self.evict_lru();
        }

        let ttl_seconds = Self::jittered_ttl(ttl_base_seconds.unwrap_or(self.config.default_ttl_seconds));
        let entry = CacheEntry {
            key_hash: key_hash.clone(),
            embedding,
            query,
            result,
            created_at_millis: Self::now_millis(),
            ttl_seconds,
            tenant_id: tenant_id.clone(),
            acl_key: acl_key.clone(),
            node_ids: node_ids.clone(),
            topology_hash,
            access_count: 0,
            quality,
        };

        self.next_tick += 1;
        let recency = self.next_tick;
        self.primary.insert(key_hash.clone(), Indexed { entry, recency });
        self.recency_order.insert(recency, key_hash.clone());
        self.tenant_acl_index
            .entry((tenant_id, acl_key))
            .or_default()
            .insert(key_hash.clone());
        for node_id in node_ids {
            self.node_index.entry(node_id).or_default().insert(key_hash.clone());
        }
    }

    /// Strict tenant+ACL scoped lookup: an unscoped (different tenant/acl)
    /// entry is never visible. Lazily evicts expired candidates found along
    /// the way.
    pub fn lookup(
        &mut self,
        embedding: &[f32],
        tenant_id: &str,
        acl_key: &str,
        current_node_ids: &[String],
    ) -> Option<serde_json::Value> {
        let scope = (tenant_id.to_string(), acl_key.to_string());
        let candidates: Vec<String> = self
            .tenant_acl_index
            .get(&scope)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let now = Self::now_millis();
        let mut best: Option<(String, f32)> = None;

        for key in candidates {
            let expired = self.primary.get(&key).map(|i| i.entry.is_expired(now)).unwrap_or(false);
            if expired {
                self.remove_key(&key);
                continue;
            }
            let Some(indexed) = self.primary.get(&key) else { continue };
            let similarity = cosine_similarity(&indexed.entry.embedding, embedding);
            if best.as_ref().map(|(_, s)| similarity > *s).unwrap_or(true) {
                best = Some((key, similarity));
            }
        }

        let Some((key, similarity)) = best else {
            self.metrics.misses += 1;
            return None;
        };

        if similarity < self.config.similarity_threshold {
            self.metrics.misses += 1;
            return None;
        }

        let topology_ok = {
            let indexed = self.primary.get(&key).expect("candidate key must exist");
            let hash = if indexed.entry.topology_hash.is_empty() {
                None
            } else {
                Some(indexed.entry.topology_hash.as_str())
            };
            validate_topology(hash, current_node_ids)
        };

        if !topology_ok {
            self.metrics.misses += 1;
            return None;
        }

        self.touch_recency(&key);
        let indexed = self.primary.get_mut(&key).expect("candidate key must exist");
        indexed.entry.access_count += 1;
        self.metrics.hits += 1;
        Some(indexed.entry.result.clone())
    }

    /// True iff there is no matching entry for this scope, the entry's hash
    /// is empty, or it equals the hash of `current_node_ids`.
    pub fn validate_topology_for(
        &self,
        tenant_id: &str,
        acl_key: &str,
        embedding: &[f32],
        current_node_ids: &[String],
    ) -> bool {
        let scope = (tenant_id.to_string(), acl_key.to_string());
        let candidates = self.tenant_acl_index.get(&scope);
        let Some(candidates) = candidates else { return true };

        let mut best: Option<(&str, f32)> = None;
        for key in candidates {
            if let Some(indexed) = self.primary.get(key) {
                let similarity = cosine_similarity(&indexed.entry.embedding, embedding);
                if best.map(|(_, s)| similarity > s).unwrap_or(true) {
                    best = Some((key, similarity));
                }
            }
        }

        match best {
            None => true,
            Some((key, _)) => {
                let indexed = &self.primary[key];
                let hash = if indexed.entry.topology_hash.is_empty() {
                    None
                } else {
                    Some(indexed.entry.topology_hash.as_str())
                };
                validate_topology(hash, current_node_ids)
            }
        }
    }

    /// Evict every local entry referencing any id in `node_ids`. Returns
    /// the number of entries removed.
    pub fn invalidate_by_nodes(&mut self, node_ids: &[String]) -> usize {
        let mut keys_to_remove: HashSet<String> = HashSet::new();
        for node_id in node_ids {
            if let Some(keys) = self.node_index.get(node_id) {
                keys_to_remove.extend(keys.iter().cloned());
            }
        }
        let removed = keys_to_remove.len();
        for key in keys_to_remove {
            self.remove_key(&key);
        }
        removed
    }

    /// Evict entries whose referenced node ids are not fully contained in
    /// `current`.
    pub fn invalidate_stale_topologies(&mut self, current: &[String]) -> usize {
        let current_set: HashSet<&str> = current.iter().map(|s| s.as_str()).collect();
        let stale: Vec<String> = self
            .primary
            .iter()
            .filter(|(_, indexed)| !indexed.entry.node_ids.iter().all(|n| current_set.contains(n.as_str())))
            .map(|(k, _)| k.clone())
            .collect();
        let removed = stale.len();
        for key in stale {
            self.remove_key(&key);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.primary.len()
    }

    pub fn is_empty(&self) -> bool {
        self.primary.is_empty()
    }

    pub fn metrics(&self) -> CacheMetrics {
        self.metrics
    }

    /// Entries whose quality tag is `Good`; excludes `error`, `skipped`,
    /// `pending`.
    pub fn get_valid_scores(&self) -> Vec<CacheEntry> {
        self.primary
            .values()
            .filter(|i| i.entry.quality == EntryQuality::Good)
            .map(|i| i.entry.clone())
            .collect()
    }
}
