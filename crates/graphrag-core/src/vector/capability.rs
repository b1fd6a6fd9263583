//! Capability interfaces for the edges of the ingestion pipeline that sit
//! outside the orchestration core: raw-file storage and per-tenant data
//! access. Modeled as traits rather than a class hierarchy so a deployment
//! can swap backends without touching pipeline logic.

use async_trait::async_trait;

use crate::error::Result;

/// Optional indirection in front of raw file references; ingestion can read
/// straight off a filesystem path or through a blob store depending on
/// deployment.
#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Tenant-scoped read/write access to whatever store backs per-tenant
/// application data (distinct from the graph database itself).
#[async_trait]
pub trait TenantDataStore: Send + Sync {
    async fn get(&self, tenant_id: &str, key: &str) -> Result<Option<serde_json::Value>>;

    async fn put(&self, tenant_id: &str, key: &str, value: serde_json::Value) -> Result<()>;

    async fn delete(&self, tenant_id: &str, key: &str) -> Result<()>;
}
