//! Resumable ingestion checkpoints.
//!
//! A [`checkpoint::CheckpointStore`] persists the per-file progress of one
//! repository scan (`IngestionCheckpoint`) and the run-level lifecycle
//! record (`IngestionStatus`) that `thread_id` addresses. The in-memory
//! backend is for development and tests; production runs select the
//! PostgreSQL backend via `CHECKPOINT_BACKEND=postgres`.

pub mod error;
pub mod memory;
pub mod model;
pub mod postgres;
pub mod store;

pub use error::{CheckpointError, Result};
pub use memory::InMemoryCheckpointStore;
pub use model::{FileStatus, IngestionCheckpoint, IngestionStatus, RunState};
pub use postgres::PostgresCheckpointStore;
pub use store::CheckpointStore;

use std::sync::Arc;

/// Backend selector mirroring the `CHECKPOINT_BACKEND` environment variable.
#[derive(Debug, Clone)]
pub enum CheckpointBackend {
    Memory,
    Postgres { dsn: String },
}

/// Build the configured checkpoint store.
pub async fn build_checkpoint_store(backend: CheckpointBackend) -> Result<Arc<dyn CheckpointStore>> {
    match backend {
        CheckpointBackend::Memory => Ok(Arc::new(InMemoryCheckpointStore::new())),
        CheckpointBackend::Postgres { dsn } => {
            Ok(Arc::new(PostgresCheckpointStore::connect(&dsn).await?))
        }
    }
}
