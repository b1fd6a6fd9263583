//! Two-level semantic query cache plus the raw subgraph read cache.

pub mod invalidation;
pub mod normalize;
pub mod semantic;
pub mod similarity;
pub mod singleflight;
pub mod store;
pub mod subgraph;
pub mod topology;

pub use invalidation::{
    CacheInvalidationWorker, InMemoryInvalidationBus, InvalidationConsumer, InvalidationEvent, InvalidationPublisher,
};
pub use normalize::normalize_query;
pub use semantic::SemanticCache;
pub use similarity::cosine_similarity;
pub use singleflight::Singleflight;
pub use store::{CacheConfig, CacheMetrics, SemanticCacheStore};
pub use subgraph::SubgraphCache;
pub use topology::{compute_topology_hash, validate_topology};
