//! Drains outbox events into the vector store with bounded, per-event retry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::error::{CoreError, Result};
use crate::model::OutboxEvent;

use super::store::OutboxStore;

/// Capability interface for applying an outbox event's pruned ids to the
/// vector index. Implementations are expected to be idempotent: the
/// claim/lease protocol does not guarantee exactly-once delivery.
#[async_trait]
pub trait VectorDeleter: Send + Sync {
    async fn delete_ids(&self, collection: &str, ids: &[String]) -> Result<()>;
}

pub struct OutboxDrainer {
    store: Arc<dyn OutboxStore>,
    deleter: Arc<dyn VectorDeleter>,
    max_retries: u32,
}

impl OutboxDrainer {
    pub fn new(store: Arc<dyn OutboxStore>, deleter: Arc<dyn VectorDeleter>, max_retries: u32) -> Self {
        Self { store, deleter, max_retries }
    }

    /// Refuses to build a volatile (in-memory) drainer in production: the
    /// factory gate lives here rather than in `OutboxDrainer::new` so tests
    /// can still construct one freely in dev mode.
    pub fn build(
        deployment_mode: crate::config::DeploymentMode,
        store: Arc<dyn OutboxStore>,
        is_durable: bool,
        deleter: Arc<dyn VectorDeleter>,
        max_retries: u32,
    ) -> Result<Self> {
        if deployment_mode.is_production() && !is_durable {
            return Err(CoreError::ConfigViolation(
                "outbox drainer must use a durable store in production".into(),
            ));
        }
        Ok(Self::new(store, deleter, max_retries))
    }

    /// One drain cycle. Loads pending events and attempts deletion for each;
    /// a failure on one event never blocks the others (partial-failure
    /// semantics). Returns the number of events successfully completed.
    pub async fn process_once(&self) -> Result<usize> {
        let pending = self.store.load_pending().await?;
        let mut completed = 0;

        for event in pending {
            match self.process_one(&event).await {
                Ok(true) => completed += 1,
                Ok(false) => {}
                Err(err) => {
                    tracing::error!(event_id = %event.event_id, error = %err, "outbox event processing failed unexpectedly");
                }
            }
        }

        Ok(completed)
    }

    async fn process_one(&self, event: &OutboxEvent) -> Result<bool> {
        match self.deleter.delete_ids(&event.collection, &event.pruned_ids).await {
            Ok(()) => {
                self.store.delete_event(event.event_id).await?;
                Ok(true)
            }
            Err(err) => {
                let retry_count = event.retry_count + 1;
                if retry_count >= self.max_retries {
                    tracing::error!(
                        event_id = %event.event_id,
                        retry_count,
                        error = %err,
                        "outbox event exceeded max retries, discarding to avoid poison-pill stall"
                    );
                    self.store.delete_event(event.event_id).await?;
                } else {
                    self.store.update_retry_count(event.event_id, retry_count).await?;
                }
                Ok(false)
            }
        }
    }
}

/// Periodic wrapper around [`OutboxDrainer::process_once`], reusing the
/// cooperative-cancellation shape of [`crate::cache::CacheInvalidationWorker`].
pub struct OutboxDrainerLoop {
    drainer: OutboxDrainer,
    interval: Duration,
    stopped: AtomicBool,
    stop_notify: Notify,
}

impl OutboxDrainerLoop {
    pub fn new(drainer: OutboxDrainer, interval: Duration) -> Self {
        Self {
            drainer,
            interval,
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

            tokio::select! {
                _ = self.stop_notify.notified() => return,
                _ = tokio::time::sleep(self.interval) => {}
            }

            if let Err(err) = self.drainer.process_once().await {
                tracing::warn!(error = %err, "outbox drain cycle failed, retrying next interval");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OutboxOperation;
    use crate::outbox::store::InMemoryOutboxStore;
    use std::sync::atomic::AtomicU32;

    struct FailNTimes {
        remaining: AtomicU32,
    }

    #[async_trait]
    impl VectorDeleter for FailNTimes {
        async fn delete_ids(&self, _collection: &str, _ids: &[String]) -> Result<()> {
            let remaining = self.remaining.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n == 0 { None } else { Some(n - 1) }
            });
            match remaining {
                Ok(_) => Err(CoreError::Transient("boom".into())),
                Err(_) => Ok(()),
            }
        }
    }

    #[tokio::test]
    async fn process_once_on_empty_store_returns_zero_and_no_call() {
        let store = Arc::new(InMemoryOutboxStore::new());
        struct NeverCalled;
        #[async_trait]
        impl VectorDeleter for NeverCalled {
            async fn delete_ids(&self, _c: &str, _i: &[String]) -> Result<()> {
                panic!("must not be called");
            }
        }
        let drainer = OutboxDrainer::new(store, Arc::new(NeverCalled), 3);
        assert_eq!(drainer.process_once().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn retries_then_discards_at_max_retries() {
        let store = Arc::new(InMemoryOutboxStore::new());
        let event = OutboxEvent::new("svc", OutboxOperation::Delete, vec!["id-1".to_string()]);
        let event_id = event.event_id;
        store.write_event(event).await.unwrap();

        let deleter = Arc::new(FailNTimes { remaining: AtomicU32::new(10) });
        let drainer = OutboxDrainer::new(store.clone(), deleter, 3);

        drainer.process_once().await.unwrap();
        assert_eq!(store.get(event_id).await.unwrap().retry_count, 1);

        drainer.process_once().await.unwrap();
        assert_eq!(store.get(event_id).await.unwrap().retry_count, 2);

        drainer.process_once().await.unwrap();
        assert!(store.get(event_id).await.is_none());
    }

    #[tokio::test]
    async fn eventual_success_deletes_outbox_row() {
        let store = Arc::new(InMemoryOutboxStore::new());
        let event = OutboxEvent::new("svc", OutboxOperation::Delete, vec!["id-1".to_string()]);
        store.write_event(event).await.unwrap();

        let deleter = Arc::new(FailNTimes { remaining: AtomicU32::new(0) });
        let drainer = OutboxDrainer::new(store.clone(), deleter, 3);

        let completed = drainer.process_once().await.unwrap();
        assert_eq!(completed, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn production_without_durable_store_refuses_construction() {
        let store = Arc::new(InMemoryOutboxStore::new());
        let deleter = Arc::new(FailNTimes { remaining: AtomicU32::new(0) });
        let result = OutboxDrainer::build(
            crate::config::DeploymentMode::Production,
            store,
            false,
            deleter,
            3,
        );
        assert!(matches!(result, Err(CoreError::ConfigViolation(_))));
    }
}
