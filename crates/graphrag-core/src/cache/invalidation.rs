//! L2 invalidation fan-out: a broadcast-style stream rather than scripted
//! per-key deletions, so invalidation converges across processes.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct InvalidationEvent {
    pub node_ids: Vec<String>,
}

#[async_trait]
pub trait InvalidationPublisher: Send + Sync {
    async fn publish(&self, node_ids: Vec<String>) -> Result<()>;
}

#[async_trait]
pub trait InvalidationConsumer: Send + Sync {
    /// Pull up to `batch_size` pending events; an empty vec means nothing
    /// is currently pending.
    async fn poll(&self, batch_size: usize) -> Result<Vec<InvalidationEvent>>;
}

/// In-process stand-in for a shared pub/sub stream (e.g. a Redis stream
/// consumer group). One publish call enqueues exactly one event; `poll`
/// drains in FIFO order up to `batch_size` at a time.
pub struct InMemoryInvalidationBus {
    queue: Mutex<VecDeque<InvalidationEvent>>,
}

impl InMemoryInvalidationBus {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
        }
    }
}

impl Default for InMemoryInvalidationBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InvalidationPublisher for InMemoryInvalidationBus {
    async fn publish(&self, node_ids: Vec<String>) -> Result<()> {
        self.queue.lock().await.push_back(InvalidationEvent { node_ids });
        Ok(())
    }
}

#[async_trait]
impl InvalidationConsumer for InMemoryInvalidationBus {
    async fn poll(&self, batch_size: usize) -> Result<Vec<InvalidationEvent>> {
        let mut queue = self.queue.lock().await;
        let n = batch_size.min(queue.len());
        Ok(queue.drain(..n).collect())
    }
}

/// Consumes the invalidation stream with a bounded poll loop, applying each
/// event's node ids to the local cache via "unlink" semantics: the local
/// eviction runs on a spawned task so a large scan never blocks the poll
/// loop itself.
pub struct CacheInvalidationWorker {
    consumer: Arc<dyn InvalidationConsumer>,
    cache: Arc<super::semantic::SemanticCache>,
    batch_size: usize,
    poll_interval: std::time::Duration,
    stopped: AtomicBool,
    stop_notify: Notify,
}

impl CacheInvalidationWorker {
    pub fn new(
        consumer: Arc<dyn InvalidationConsumer>,
        cache: Arc<super::semantic::SemanticCache>,
        batch_size: usize,
        poll_interval: std::time::Duration,
    ) -> Self {
        Self {
            consumer,
            cache,
            batch_size,
            poll_interval,
            stopped: AtomicBool::new(false),
            stop_notify: Notify::new(),
        }
    }

    /// Idempotent: calling `stop` twice is safe.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
        self.stop_notify.notify_waiters();
    }

    pub async fn run(&self) {
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return;
            }

            tokio::select! {
                _ = self.stop_notify.notified() => return,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }

            let events = match self.consumer.poll(self.batch_size).await {
                Ok(events) => events,
                Err(err) => {
                    tracing::warn!(error = %err, "invalidation stream poll failed, retrying next tick");
                    continue;
                }
            };

            for event in events {
                let cache = self.cache.clone();
                tokio::spawn(async move {
                    cache.invalidate_by_nodes_local(&event.node_ids).await;
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_poll_drains_fifo() {
        let bus = InMemoryInvalidationBus::new();
        bus.publish(vec!["A".to_string()]).await.unwrap();
        bus.publish(vec!["B".to_string()]).await.unwrap();

        let batch = bus.poll(1).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].node_ids, vec!["A".to_string()]);

        let batch = bus.poll(10).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].node_ids, vec!["B".to_string()]);
    }

    #[tokio::test]
    async fn poll_on_empty_queue_returns_empty() {
        let bus = InMemoryInvalidationBus::new();
        assert!(bus.poll(10).await.unwrap().is_empty());
    }
}
