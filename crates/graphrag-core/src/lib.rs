//! Multi-tenant GraphRAG orchestration core.
//!
//! This crate owns the pieces that sit between a query and an answer, and
//! between a raw document and a committed graph:
//!
//! - [`cache`] - two-level semantic query cache, raw subgraph cache, and the
//!   background worker that fans out invalidation between them
//! - [`outbox`] - durable event log for vector-index deletions, with a
//!   claim/lease drainer and a coalescing front-end
//! - [`vector`] - the message-bus alternative to the outbox, plus the
//!   capability interfaces (`BlobStore`, `TenantDataStore`) at the
//!   pipeline's edges
//! - [`tenant`] - registry, router, and connection wrapper enforcing
//!   per-tenant physical or logical isolation
//! - [`reaper`] - adaptive-batch background removal of expired tombstones
//! - [`pipeline`] - the staged, checkpointed ingestion pipeline
//! - [`embedding_batcher`] - bounded batching of embedding requests with
//!   rate-limit backoff
//! - [`evaluation`] - post-hoc RAG answer scoring and the evaluation store
//!   backing the query-evaluation contract
//! - [`tombstone_filter`] - query-time filtering of tombstoned candidates
//! - [`config`] - deployment-mode configuration and production invariants
//! - [`error`] - the shared error taxonomy
//! - [`model`] - data types shared across every module above

pub mod cache;
pub mod config;
pub mod embedding_batcher;
pub mod error;
pub mod evaluation;
pub mod model;
pub mod outbox;
pub mod pipeline;
pub mod reaper;
pub mod tenant;
pub mod tombstone_filter;
pub mod vector;

pub use config::{CoreConfig, DeploymentMode, VectorSyncBackend};
pub use embedding_batcher::{BatcherConfig, EmbeddingBatcher, EmbeddingProvider};
pub use error::{CoreError, Result};
pub use reaper::{ReaperMetrics, TombstoneReaper, TombstoneStore};
