//! In-memory front-end that batches outbox writes within a time window
//! before handing them to the durable store, trading a little latency for
//! far fewer small writes under bursty mutation traffic.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::error::Result;
use crate::model::OutboxEvent;

use super::store::OutboxStore;

/// Invoked with whatever overflowed `max_entries`; expected to persist it
/// directly to the durable store so nothing is lost.
pub type SpilloverCallback = Arc<dyn Fn(Vec<OutboxEvent>) + Send + Sync>;

pub struct CoalescingOutbox {
    store: Arc<dyn OutboxStore>,
    max_entries: usize,
    window: Duration,
    buffer: Mutex<Vec<OutboxEvent>>,
    spillover: SpilloverCallback,
}

impl CoalescingOutbox {
    pub fn new(store: Arc<dyn OutboxStore>, max_entries: usize, window: Duration, spillover: SpilloverCallback) -> Self {
        Self {
            store,
            max_entries,
            window,
            buffer: Mutex::new(Vec::new()),
            spillover,
        }
    }

    /// Buffers `event`, invoking the spillover callback with the oldest
    /// overflow entries if `max_entries` is exceeded.
    pub async fn enqueue(&self, event: OutboxEvent) {
        let mut buffer = self.buffer.lock().await;
        buffer.push(event);
        if buffer.len() > self.max_entries {
            let overflow: Vec<OutboxEvent> = buffer.drain(0..buffer.len() - self.max_entries).collect();
            (self.spillover)(overflow);
        }
    }

    /// Flushes whatever has accumulated to the durable store. Intended to
    /// be driven by a timer at `self.window` cadence.
    pub async fn flush(&self) -> Result<()> {
        let events: Vec<OutboxEvent> = {
            let mut buffer = self.buffer.lock().await;
            std::mem::take(&mut *buffer)
        };
        if events.is_empty() {
            return Ok(());
        }
        self.store.write_after_tx(events).await
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    pub async fn buffered_len(&self) -> usize {
        self.buffer.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OutboxOperation;
    use crate::outbox::store::InMemoryOutboxStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn flush_writes_buffered_events_to_durable_store() {
        let store = Arc::new(InMemoryOutboxStore::new());
        let spillover_calls = Arc::new(AtomicUsize::new(0));
        let counter = spillover_calls.clone();
        let outbox = CoalescingOutbox::new(
            store.clone(),
            10,
            Duration::from_millis(50),
            Arc::new(move |_events| {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );

        outbox.enqueue(OutboxEvent::new("svc", OutboxOperation::Delete, vec!["a".to_string()])).await;
        outbox.enqueue(OutboxEvent::new("svc", OutboxOperation::Delete, vec!["b".to_string()])).await;
        outbox.flush().await.unwrap();

        assert_eq!(store.len().await, 2);
        assert_eq!(outbox.buffered_len().await, 0);
        assert_eq!(spillover_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn overflow_past_max_entries_invokes_spillover() {
        let store = Arc::new(InMemoryOutboxStore::new());
        let spilled = Arc::new(AtomicUsize::new(0));
        let counter = spilled.clone();
        let outbox = CoalescingOutbox::new(
            store,
            1,
            Duration::from_secs(60),
            Arc::new(move |events| {
                counter.fetch_add(events.len(), Ordering::SeqCst);
            }),
        );

        outbox.enqueue(OutboxEvent::new("svc", OutboxOperation::Delete, vec!["a".to_string()])).await;
        outbox.enqueue(OutboxEvent::new("svc", OutboxOperation::Delete, vec!["b".to_string()])).await;

        assert_eq!(spilled.load(Ordering::SeqCst), 1);
        assert_eq!(outbox.buffered_len().await, 1);
    }
}
