//! Storage abstraction for ingestion checkpoints and run status.

use async_trait::async_trait;

use crate::error::Result;
use crate::model::{IngestionCheckpoint, IngestionStatus};

/// Persistence backend for [`IngestionCheckpoint`]s and [`IngestionStatus`].
///
/// Implementors are addressed by `thread_id`, the identifier of one
/// ingestion run. `close` is idempotent: callers may invoke it more than
/// once (e.g. once on normal shutdown, once from a signal handler) without
/// it raising.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save_checkpoint(&self, thread_id: &str, checkpoint: &IngestionCheckpoint) -> Result<()>;

    async fn load_checkpoint(&self, thread_id: &str) -> Result<Option<IngestionCheckpoint>>;

    async fn save_status(&self, status: &IngestionStatus) -> Result<()>;

    async fn load_status(&self, thread_id: &str) -> Result<Option<IngestionStatus>>;

    async fn close(&self) -> Result<()>;
}
