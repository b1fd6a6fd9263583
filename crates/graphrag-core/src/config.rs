//! Environment-driven configuration and the production startup gate.

use graphrag_tooling::config::{get_env_bool, get_env_or, get_env_parse_or};

use crate::error::{CoreError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentMode {
    Dev,
    Production,
}

impl DeploymentMode {
    pub fn is_production(&self) -> bool {
        matches!(self, DeploymentMode::Production)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorSyncBackend {
    Memory,
    Kafka,
    Redis,
    Neo4j,
}

#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub deployment_mode: DeploymentMode,
    pub checkpoint_backend: String,
    pub checkpoint_dsn: Option<String>,
    pub tombstone_ttl_days: i64,
    pub tombstone_batch_size: usize,
    pub tombstone_max_batch_size: usize,
    pub tombstone_reap_interval_seconds: u64,
    pub candidate_limit: usize,
    pub query_cost_entity_lookup: u32,
    pub query_cost_single_hop: u32,
    pub query_cost_multi_hop: u32,
    pub query_cost_aggregate: u32,
    pub rag_low_relevance_threshold: f32,
    pub rag_enable_evaluation: bool,
    pub vector_sync_backend: VectorSyncBackend,
    pub vector_sync_kafka_topic: String,
    pub redis_url: Option<String>,
    pub max_inflight: usize,
    pub blob_store_is_object_store: bool,
    pub dedup_store_is_noop: bool,
    pub dlq_topic: Option<String>,
    pub dlq_fallback_path: Option<String>,
}

impl CoreConfig {
    /// Load from the environment, applying the documented defaults.
    pub fn from_env() -> Result<Self> {
        let deployment_mode = match get_env_or("DEPLOYMENT_MODE", "dev")
            .map_err(|e| CoreError::Validation(e.to_string()))?
            .to_lowercase()
            .as_str()
        {
            "production" => DeploymentMode::Production,
            _ => DeploymentMode::Dev,
        };

        let vector_sync_backend = match get_env_or("VECTOR_SYNC_BACKEND", "memory")
            .map_err(|e| CoreError::Validation(e.to_string()))?
            .to_lowercase()
            .as_str()
        {
            "kafka" => VectorSyncBackend::Kafka,
            "redis" => VectorSyncBackend::Redis,
            "neo4j" => VectorSyncBackend::Neo4j,
            _ => VectorSyncBackend::Memory,
        };

        Ok(Self {
            deployment_mode,
            checkpoint_backend: get_env_or("CHECKPOINT_BACKEND", "memory")
                .map_err(|e| CoreError::Validation(e.to_string()))?,
            checkpoint_dsn: std::env::var("CHECKPOINT_DSN").ok(),
            tombstone_ttl_days: get_env_parse_or("TOMBSTONE_TTL_DAYS", 7)
                .map_err(|e| CoreError::Validation(e.to_string()))?,
            tombstone_batch_size: get_env_parse_or("TOMBSTONE_BATCH_SIZE", 100)
                .map_err(|e| CoreError::Validation(e.to_string()))?,
            tombstone_max_batch_size: get_env_parse_or("TOMBSTONE_MAX_BATCH_SIZE", 2000)
                .map_err(|e| CoreError::Validation(e.to_string()))?,
            tombstone_reap_interval_seconds: get_env_parse_or("TOMBSTONE_REAP_INTERVAL_SECONDS", 3600)
                .map_err(|e| CoreError::Validation(e.to_string()))?,
            candidate_limit: get_env_parse_or("CANDIDATE_LIMIT", 50)
                .map_err(|e| CoreError::Validation(e.to_string()))?,
            query_cost_entity_lookup: get_env_parse_or("QUERY_COST_ENTITY_LOOKUP", 1)
                .map_err(|e| CoreError::Validation(e.to_string()))?,
            query_cost_single_hop: get_env_parse_or("QUERY_COST_SINGLE_HOP", 3)
                .map_err(|e| CoreError::Validation(e.to_string()))?,
            query_cost_multi_hop: get_env_parse_or("QUERY_COST_MULTI_HOP", 10)
                .map_err(|e| CoreError::Validation(e.to_string()))?,
            query_cost_aggregate: get_env_parse_or("QUERY_COST_AGGREGATE", 8)
                .map_err(|e| CoreError::Validation(e.to_string()))?,
            rag_low_relevance_threshold: get_env_parse_or("RAG_LOW_RELEVANCE_THRESHOLD", 0.3)
                .map_err(|e| CoreError::Validation(e.to_string()))?,
            rag_enable_evaluation: get_env_bool("RAG_ENABLE_EVALUATION")
                .map_err(|e| CoreError::Validation(e.to_string()))?
                .unwrap_or(true),
            vector_sync_backend,
            vector_sync_kafka_topic: get_env_or("VECTOR_SYNC_KAFKA_TOPIC", "graph.mutations")
                .map_err(|e| CoreError::Validation(e.to_string()))?,
            redis_url: std::env::var("REDIS_URL").ok(),
            max_inflight: get_env_parse_or("MAX_INFLIGHT", 0)
                .map_err(|e| CoreError::Validation(e.to_string()))?,
            blob_store_is_object_store: get_env_bool("BLOB_STORE_IS_OBJECT_STORE")
                .map_err(|e| CoreError::Validation(e.to_string()))?
                .unwrap_or(false),
            dedup_store_is_noop: get_env_bool("DEDUP_STORE_IS_NOOP")
                .map_err(|e| CoreError::Validation(e.to_string()))?
                .unwrap_or(true),
            dlq_topic: std::env::var("DLQ_TOPIC").ok(),
            dlq_fallback_path: std::env::var("DLQ_FALLBACK_PATH").ok(),
        })
    }

    /// Startup-time assertion run once at process boot. Refuses to start
    /// with a configuration that would silently violate a production
    /// invariant (volatile outbox drainer, logical vector isolation, a
    /// noop dedup store, or a missing DLQ topic).
    pub fn assert_production_invariants(&self) -> Result<()> {
        if !self.deployment_mode.is_production() {
            return Ok(());
        }

        if self.max_inflight == 0 {
            return Err(CoreError::ConfigViolation("MAX_INFLIGHT must be > 0 in production".into()));
        }
        if !self.blob_store_is_object_store {
            return Err(CoreError::ConfigViolation("blob store must be an object store in production".into()));
        }
        if self.dedup_store_is_noop {
            return Err(CoreError::ConfigViolation("dedup store must not be noop in production".into()));
        }
        if self.dlq_topic.is_none() {
            return Err(CoreError::ConfigViolation("DLQ topic is required in production".into()));
        }
        if self.dlq_fallback_path.is_some() {
            return Err(CoreError::ConfigViolation("DLQ fallback path is forbidden in production".into()));
        }
        Ok(())
    }

    pub fn query_cost(&self, complexity: graphrag_tooling::rate_limit::QueryComplexity) -> u32 {
        use graphrag_tooling::rate_limit::QueryComplexity::*;
        match complexity {
            EntityLookup => self.query_cost_entity_lookup,
            SingleHop => self.query_cost_single_hop,
            MultiHop => self.query_cost_multi_hop,
            Aggregate => self.query_cost_aggregate,
        }
    }
}
