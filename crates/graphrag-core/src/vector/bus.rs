//! Message-bus path for vector sync: an alternative to the outbox for
//! deployments that stream mutation events directly to subscribers.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::error::Result;
use crate::model::MutationEvent;
use crate::outbox::VectorDeleter;

#[async_trait]
pub trait MutationConsumer: Send + Sync {
    /// Pull up to `batch_size` pending events; an empty vec means nothing
    /// is currently pending.
    async fn poll(&self, batch_size: usize) -> Result<Vec<MutationEvent>>;
}

/// In-process stand-in for a shared mutation stream (e.g. a Kafka topic).
pub struct InMemoryMutationBus {
    queue: Mutex<VecDeque<MutationEvent>>,
}

impl InMemoryMutationBus {
    pub fn new() -> Self {
        Self { queue: Mutex::new(VecDeque::new()) }
    }

    pub async fn publish(&self, events: Vec<MutationEvent>) {
        let mut queue = self.queue.lock().await;
        queue.extend(events);
    }
}

impl Default for InMemoryMutationBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MutationConsumer for InMemoryMutationBus {
    async fn poll(&self, batch_size: usize) -> Result<Vec<MutationEvent>> {
        let mut queue = self.queue.lock().await;
        let n = batch_size.min(queue.len());
        Ok(queue.drain(..n).collect())
    }
}

/// Consumes mutation events from a bus and applies vector-index deletions
/// for the subset that actually tombstones something. Events that don't
/// trigger a deletion (plain upserts) are acknowledged and dropped.
pub struct VectorSyncConsumer {
    consumer: Arc<dyn MutationConsumer>,
    deleter: Arc<dyn VectorDeleter>,
    collection: String,
    batch_size: usize,
    poll_interval: Duration,
    stopped: AtomicBool,
    stop_notify: Notify,
}

impl VectorSyncConsumer {
    pub fn new(
        consumer: Arc<dyn MutationConsumer>,
        deleter: Arc<dyn VectorDeleter>,
        collection: impl Into<String>,
        batch_size: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            consumer,
            deleter,
            collection: collection.into(),
            batch_size,
            poll_interval,
            stopped: AtomicBool::new(false),
            stop_notify: Notify::new(),
        }
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
    }

    pub async fn run(&self) {
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return;
            }
            if let Err(err) = self.process_once().await {
                tracing::warn!(error = %err, "vector sync consumer cycle failed");
            }
            tokio::select! {
                _ = self.stop_notify.notified() => return,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
    }

    /// One poll+apply cycle. Returns the number of ids actually deleted.
    pub async fn process_once(&self) -> Result<usize> {
        let events = self.consumer.poll(self.batch_size).await?;
        let mut deleted = 0;
        for event in &events {
            if !event.mutation_type.triggers_vector_deletion() {
                continue;
            }
            self.deleter.delete_ids(&self.collection, &event.entity_ids).await?;
            deleted += event.entity_ids.len();
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MutationType;
    use std::sync::Mutex as StdMutex;

    struct RecordingDeleter {
        deleted: StdMutex<Vec<String>>,
    }

    #[async_trait]
    impl VectorDeleter for RecordingDeleter {
        async fn delete_ids(&self, _collection: &str, ids: &[String]) -> Result<()> {
            self.deleted.lock().unwrap().extend(ids.iter().cloned());
            Ok(())
        }
    }

    #[tokio::test]
    async fn process_once_deletes_only_tombstone_events() {
        let bus = Arc::new(InMemoryMutationBus::new());
        bus.publish(vec![
            MutationEvent::new(MutationType::NodeUpsert, vec!["keep-1".into()], "acme"),
            MutationEvent::new(MutationType::EdgeTombstone, vec!["drop-1".into()], "acme"),
            MutationEvent::new(MutationType::NodeDelete, vec!["drop-2".into()], "acme"),
        ])
        .await;

        let deleter = Arc::new(RecordingDeleter { deleted: StdMutex::new(Vec::new()) });
        let consumer = VectorSyncConsumer::new(bus, deleter.clone(), "default", 10, Duration::from_secs(60));

        let count = consumer.process_once().await.unwrap();
        assert_eq!(count, 2);
        let deleted = deleter.deleted.lock().unwrap();
        assert!(deleted.contains(&"drop-1".to_string()));
        assert!(deleted.contains(&"drop-2".to_string()));
        assert!(!deleted.contains(&"keep-1".to_string()));
    }

    #[tokio::test]
    async fn process_once_is_noop_on_empty_bus() {
        let bus = Arc::new(InMemoryMutationBus::new());
        let deleter = Arc::new(RecordingDeleter { deleted: StdMutex::new(Vec::new()) });
        let consumer = VectorSyncConsumer::new(bus, deleter, "default", 10, Duration::from_secs(60));
        assert_eq!(consumer.process_once().await.unwrap(), 0);
    }
}
