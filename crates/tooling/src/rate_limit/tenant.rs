//! Per-tenant adaptive rate limiting and query cost budgets.
//!
//! Wraps the plain [`super::RateLimiter`] token bucket with an AIMD refill
//! rate: every throttle halves `refill_rate` (down to `min_rate`), every
//! clean window nudges it back up by one unit (up to `max_rate`). Each
//! tenant gets its own bucket, evicted on an LRU basis once the registry
//! grows past `max_tenants`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;

/// Token bucket whose refill rate adapts to observed pressure.
///
/// `record_throttle` is called whenever a caller is denied a token;
/// `record_success` is called on a clean acquire. The rate never leaves
/// `[min_rate, max_rate]`.
pub struct AdaptiveTokenBucket {
    capacity: f64,
    min_rate: f64,
    max_rate: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl AdaptiveTokenBucket {
    pub fn new(capacity: f64, initial_rate: f64, min_rate: f64, max_rate: f64) -> Self {
        Self {
            capacity,
            min_rate,
            max_rate,
            state: Mutex::new(BucketState {
                tokens: capacity,
                refill_rate: initial_rate.clamp(min_rate, max_rate),
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill_locked(state: &mut BucketState, capacity: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * state.refill_rate).min(capacity);
        state.last_refill = now;
    }

    /// Try to take one token. Returns `false` if the bucket is empty and
    /// records the throttle as AIMD backpressure.
    pub async fn try_acquire(&self) -> bool {
        let mut state = self.state.lock().await;
        Self::refill_locked(&mut state, self.capacity);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            let new_rate = (state.refill_rate + 1.0).min(self.max_rate);
            state.refill_rate = new_rate;
            true
        } else {
            let new_rate = (state.refill_rate / 2.0).max(self.min_rate);
            state.refill_rate = new_rate;
            false
        }
    }

    /// Block until a token is available, sleeping only the computed
    /// shortfall rather than polling.
    pub async fn acquire(&self) {
        loop {
            let shortfall = {
                let mut state = self.state.lock().await;
                Self::refill_locked(&mut state, self.capacity);

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    state.refill_rate = (state.refill_rate + 1.0).min(self.max_rate);
                    return;
                }

                let deficit = 1.0 - state.tokens;
                let refill_rate = state.refill_rate.max(self.min_rate);
                deficit / refill_rate
            };
            tokio::time::sleep(Duration::from_secs_f64(shortfall.max(0.001))).await;
        }
    }

    pub async fn current_rate(&self) -> f64 {
        self.state.lock().await.refill_rate
    }

    pub async fn available(&self) -> f64 {
        let mut state = self.state.lock().await;
        Self::refill_locked(&mut state, self.capacity);
        state.tokens
    }
}

/// Registry of one [`AdaptiveTokenBucket`] per tenant, with LRU eviction
/// once the registry exceeds `max_tenants`.
pub struct TenantRateLimiter {
    capacity: f64,
    initial_rate: f64,
    min_rate: f64,
    max_rate: f64,
    max_tenants: usize,
    buckets: Mutex<HashMap<String, (Arc<AdaptiveTokenBucket>, Instant)>>,
}

impl TenantRateLimiter {
    pub fn new(capacity: f64, initial_rate: f64, min_rate: f64, max_rate: f64, max_tenants: usize) -> Self {
        Self {
            capacity,
            initial_rate,
            min_rate,
            max_rate,
            max_tenants,
            buckets: Mutex::new(HashMap::new()),
        }
    }

    async fn bucket_for(&self, tenant_id: &str) -> Arc<AdaptiveTokenBucket> {
        let mut buckets = self.buckets.lock().await;

        if let Some((bucket, last_used)) = buckets.get_mut(tenant_id) {
            *last_used = Instant::now();
            return bucket.clone();
        }

        if buckets.len() >= self.max_tenants {
            if let Some(lru_key) = buckets
                .iter()
                .min_by_key(|(_, (_, last_used))| *last_used)
                .map(|(k, _)| k.clone())
            {
                buckets.remove(&lru_key);
            }
        }

        let bucket = Arc::new(AdaptiveTokenBucket::new(
            self.capacity,
            self.initial_rate,
            self.min_rate,
            self.max_rate,
        ));
        buckets.insert(tenant_id.to_string(), (bucket.clone(), Instant::now()));
        bucket
    }

    pub async fn try_acquire(&self, tenant_id: &str) -> bool {
        self.bucket_for(tenant_id).await.try_acquire().await
    }

    pub async fn acquire(&self, tenant_id: &str) {
        self.bucket_for(tenant_id).await.acquire().await
    }

    pub async fn current_rate(&self, tenant_id: &str) -> f64 {
        self.bucket_for(tenant_id).await.current_rate().await
    }

    pub async fn tenant_count(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

/// Relative cost of a query, used to weight a tenant's sliding-window
/// budget rather than counting every query as equally expensive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryComplexity {
    EntityLookup,
    SingleHop,
    MultiHop,
    Aggregate,
}

/// Maps query shapes to a cost unit spent against a tenant's budget.
pub struct QueryCostModel;

impl QueryCostModel {
    pub fn cost_for(complexity: QueryComplexity) -> u32 {
        match complexity {
            QueryComplexity::EntityLookup => 1,
            QueryComplexity::SingleHop => 3,
            QueryComplexity::MultiHop => 10,
            QueryComplexity::Aggregate => 8,
        }
    }
}

struct TenantWindow {
    spend: Vec<(Instant, u32)>,
}

/// Sliding-window cost budget, keyed per tenant, spent in [`QueryCostModel`]
/// units rather than raw request counts.
pub struct CostBudget {
    max_cost: u32,
    window: Duration,
    tenants: Mutex<HashMap<String, TenantWindow>>,
}

impl CostBudget {
    pub fn new(max_cost: u32, window: Duration) -> Self {
        Self {
            max_cost,
            window,
            tenants: Mutex::new(HashMap::new()),
        }
    }

    /// Attempt to spend `cost` units for `tenant_id`. Returns `false` (and
    /// does not record the spend) if it would exceed the window's budget.
    pub async fn try_spend(&self, tenant_id: &str, cost: u32) -> bool {
        let mut tenants = self.tenants.lock().await;
        let now = Instant::now();
        let window = self.window;

        let entry = tenants
            .entry(tenant_id.to_string())
            .or_insert_with(|| TenantWindow { spend: Vec::new() });
        entry.spend.retain(|&(t, _)| now.duration_since(t) < window);

        let current: u32 = entry.spend.iter().map(|&(_, c)| c).sum();
        if current + cost > self.max_cost {
            return false;
        }

        entry.spend.push((now, cost));
        true
    }

    pub async fn remaining(&self, tenant_id: &str) -> u32 {
        let mut tenants = self.tenants.lock().await;
        let now = Instant::now();
        let window = self.window;

        let spent = tenants
            .get_mut(tenant_id)
            .map(|entry| {
                entry.spend.retain(|&(t, _)| now.duration_since(t) < window);
                entry.spend.iter().map(|&(_, c)| c).sum::<u32>()
            })
            .unwrap_or(0);

        self.max_cost.saturating_sub(spent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn throttle_halves_rate_and_success_restores_it() {
        let bucket = AdaptiveTokenBucket::new(1.0, 4.0, 1.0, 8.0);
        assert!(bucket.try_acquire().await);
        assert!(!bucket.try_acquire().await);
        assert_eq!(bucket.current_rate().await, 2.0);
    }

    #[tokio::test]
    async fn acquire_blocks_until_refill_then_succeeds() {
        let bucket = AdaptiveTokenBucket::new(1.0, 100.0, 1.0, 200.0);
        assert!(bucket.try_acquire().await);
        tokio::time::timeout(Duration::from_secs(1), bucket.acquire())
            .await
            .expect("acquire should complete once refill catches up");
    }

    #[tokio::test]
    async fn rate_never_drops_below_min() {
        let bucket = AdaptiveTokenBucket::new(1.0, 1.0, 1.0, 8.0);
        assert!(bucket.try_acquire().await);
        for _ in 0..5 {
            bucket.try_acquire().await;
        }
        assert_eq!(bucket.current_rate().await, 1.0);
    }

    #[tokio::test]
    async fn tenant_limiter_isolates_buckets_per_tenant() {
        let limiter = TenantRateLimiter::new(1.0, 2.0, 1.0, 8.0, 10);
        assert!(limiter.try_acquire("tenant-a").await);
        assert!(!limiter.try_acquire("tenant-a").await);
        assert!(limiter.try_acquire("tenant-b").await);
    }

    #[tokio::test]
    async fn tenant_limiter_evicts_lru_past_capacity() {
        let limiter = TenantRateLimiter::new(1.0, 1.0, 1.0, 4.0, 2);
        limiter.try_acquire("a").await;
        limiter.try_acquire("b").await;
        assert_eq!(limiter.tenant_count().await, 2);

        limiter.try_acquire("c").await;
        assert_eq!(limiter.tenant_count().await, 2);
    }

    #[tokio::test]
    async fn cost_budget_rejects_spend_past_window_cap() {
        let budget = CostBudget::new(10, Duration::from_secs(60));
        assert!(budget.try_spend("tenant-a", 8).await);
        assert!(!budget.try_spend("tenant-a", 5).await);
        assert!(budget.try_spend("tenant-a", 2).await);
        assert_eq!(budget.remaining("tenant-a").await, 0);
    }

    #[tokio::test]
    async fn cost_budget_tracks_tenants_independently() {
        let budget = CostBudget::new(5, Duration::from_secs(60));
        assert!(budget.try_spend("tenant-a", 5).await);
        assert!(budget.try_spend("tenant-b", 5).await);
    }

    #[test]
    fn query_cost_model_assigns_weights() {
        assert_eq!(QueryCostModel::cost_for(QueryComplexity::EntityLookup), 1);
        assert_eq!(QueryCostModel::cost_for(QueryComplexity::SingleHop), 3);
        assert_eq!(QueryCostModel::cost_for(QueryComplexity::MultiHop), 10);
        assert_eq!(QueryCostModel::cost_for(QueryComplexity::Aggregate), 8);
    }
}
