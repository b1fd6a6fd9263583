//! In-memory checkpoint storage for development and testing.
//!
//! Ephemeral: data is lost on process restart. Ideal for unit tests and
//! single-process development, not for production ingestion runs that must
//! survive a crash.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::model::{IngestionCheckpoint, IngestionStatus};
use crate::store::CheckpointStore;

#[derive(Default)]
pub struct InMemoryCheckpointStore {
    checkpoints: Arc<RwLock<HashMap<String, IngestionCheckpoint>>>,
    statuses: Arc<RwLock<HashMap<String, IngestionStatus>>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all stored state. Useful for test isolation.
    pub async fn clear(&self) {
        self.checkpoints.write().await.clear();
        self.statuses.write().await.clear();
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save_checkpoint(&self, thread_id: &str, checkpoint: &IngestionCheckpoint) -> Result<()> {
        self.checkpoints
            .write()
            .await
            .insert(thread_id.to_string(), checkpoint.clone());
        Ok(())
    }

    async fn load_checkpoint(&self, thread_id: &str) -> Result<Option<IngestionCheckpoint>> {
        Ok(self.checkpoints.read().await.get(thread_id).cloned())
    }

    async fn save_status(&self, status: &IngestionStatus) -> Result<()> {
        self.statuses
            .write()
            .await
            .insert(status.thread_id.clone(), status.clone());
        Ok(())
    }

    async fn load_status(&self, thread_id: &str) -> Result<Option<IngestionStatus>> {
        Ok(self.statuses.read().await.get(thread_id).cloned())
    }

    async fn close(&self) -> Result<()> {
        // Nothing to flush; safe to call any number of times.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::FileStatus;

    #[tokio::test]
    async fn save_and_load_round_trips() {
        let store = InMemoryCheckpointStore::new();
        let mut cp = IngestionCheckpoint::new();
        cp.mark("a.rs", FileStatus::Pending);
        store.save_checkpoint("thread-1", &cp).await.unwrap();

        let loaded = store.load_checkpoint("thread-1").await.unwrap().unwrap();
        assert_eq!(loaded.checkpoint_id, cp.checkpoint_id);
    }

    #[tokio::test]
    async fn double_close_does_not_raise() {
        let store = InMemoryCheckpointStore::new();
        store.close().await.unwrap();
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn missing_thread_returns_none() {
        let store = InMemoryCheckpointStore::new();
        assert!(store.load_checkpoint("nope").await.unwrap().is_none());
        assert!(store.load_status("nope").await.unwrap().is_none());
    }
}
