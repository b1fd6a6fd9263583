//! Core entity and event types shared across the orchestration subsystems.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Isolation strategy bound to a tenant. Physical is the default; logical
/// must be opted into and logs a warning when constructed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IsolationMode {
    Physical,
    Logical,
}

impl Default for IsolationMode {
    fn default() -> Self {
        IsolationMode::Physical
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantConfig {
    pub tenant_id: String,
    pub isolation_mode: IsolationMode,
    pub database: String,
    pub max_concurrency: usize,
}

impl TenantConfig {
    pub fn new(tenant_id: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            isolation_mode: IsolationMode::default(),
            database: database.into(),
            max_concurrency: 8,
        }
    }

    pub fn logical(mut self) -> Self {
        tracing::warn!(tenant_id = %self.tenant_id, "constructing tenant with logical isolation mode");
        self.isolation_mode = IsolationMode::Logical;
        self
    }
}

/// Scoped entity id of the form `repository::namespace::name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityId(pub String);

impl EntityId {
    pub fn new(repository: &str, namespace: &str, name: &str) -> Self {
        Self(format!("{repository}::{namespace}::{name}"))
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEntity {
    pub id: EntityId,
    pub tenant_id: String,
    pub language: Option<String>,
    pub framework: Option<String>,
    pub owners: Vec<String>,
    pub acl_namespaces: Vec<String>,
    pub tombstoned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallEntity {
    pub id: EntityId,
    pub tenant_id: String,
    pub source: EntityId,
    pub target: EntityId,
    pub acl_namespaces: Vec<String>,
    pub tombstoned_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicEntity {
    pub id: EntityId,
    pub tenant_id: String,
    pub owners: Vec<String>,
    pub acl_namespaces: Vec<String>,
    pub tombstoned_at: Option<DateTime<Utc>>,
}

/// Outbox event lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxStatus {
    Pending,
    Claimed,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboxOperation {
    Upsert,
    Delete,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEvent {
    pub event_id: Uuid,
    pub collection: String,
    pub operation: OutboxOperation,
    pub pruned_ids: Vec<String>,
    pub vectors: Option<serde_json::Value>,
    pub status: OutboxStatus,
    pub retry_count: u32,
    pub claimed_by: Option<String>,
    pub claim_expires_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    pub fn new(collection: impl Into<String>, operation: OutboxOperation, pruned_ids: Vec<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            collection: collection.into(),
            operation,
            pruned_ids,
            vectors: None,
            status: OutboxStatus::Pending,
            retry_count: 0,
            claimed_by: None,
            claim_expires_at: None,
        }
    }
}

/// Mutation type as it appears on the bus; only tombstone/delete variants
/// trigger a downstream vector-index deletion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationType {
    NodeUpsert,
    EdgeUpsert,
    EdgeTombstone,
    NodeDelete,
}

impl MutationType {
    pub fn triggers_vector_deletion(&self) -> bool {
        matches!(self, MutationType::EdgeTombstone | MutationType::NodeDelete)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationEvent {
    pub event_id: Uuid,
    pub mutation_type: MutationType,
    pub entity_ids: Vec<String>,
    pub tenant_id: String,
    pub timestamp: DateTime<Utc>,
}

impl MutationEvent {
    pub fn new(mutation_type: MutationType, entity_ids: Vec<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            mutation_type,
            entity_ids,
            tenant_id: tenant_id.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Quality tag recorded alongside a cache entry's value so aggregate
/// scoring can exclude degraded reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryQuality {
    Good,
    Error,
    Skipped,
    Pending,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key_hash: String,
    pub embedding: Vec<f32>,
    pub query: String,
    pub result: serde_json::Value,
    pub created_at_millis: u64,
    pub ttl_seconds: u64,
    pub tenant_id: String,
    pub acl_key: String,
    pub node_ids: HashSet<String>,
    pub topology_hash: String,
    pub access_count: u64,
    pub quality: EntryQuality,
}

impl CacheEntry {
    pub fn is_expired(&self, now_millis: u64) -> bool {
        now_millis.saturating_sub(self.created_at_millis) > self.ttl_seconds * 1000
    }
}
