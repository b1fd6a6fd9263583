//! Accumulates embedding requests into bounded batches, amortizing the
//! per-call overhead of the underlying embedding provider.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::error::{CoreError, Result};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

struct QueuedItem {
    text: String,
    respond: oneshot::Sender<Result<Vec<f32>>>,
}

#[derive(Debug, Clone, Copy)]
pub struct BatcherConfig {
    pub flush_interval: Duration,
    pub max_batch_size: usize,
    pub fill_wait: Duration,
    pub max_retries: u32,
    pub max_backoff: Duration,
}

impl Default for BatcherConfig {
    fn default() -> Self {
        Self {
            flush_interval: Duration::from_millis(50),
            max_batch_size: 32,
            fill_wait: Duration::from_millis(10),
            max_retries: 3,
            max_backoff: Duration::from_secs(5),
        }
    }
}

/// `submit` returns a future that resolves once the text's batch has been
/// embedded (or failed). The background loop is the only consumer of the
/// item queue.
pub struct EmbeddingBatcher {
    sender: mpsc::UnboundedSender<QueuedItem>,
    loop_handle: Mutex<Option<JoinHandle<()>>>,
    stopped: Arc<AtomicBool>,
}

impl EmbeddingBatcher {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: BatcherConfig) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let stopped = Arc::new(AtomicBool::new(false));
        let loop_handle = tokio::spawn(Self::run_loop(provider, config, receiver, stopped.clone()));
        Self {
            sender,
            loop_handle: Mutex::new(Some(loop_handle)),
            stopped,
        }
    }

    pub async fn submit(&self, text: String, _metadata: serde_json::Value) -> Result<Vec<f32>> {
        let (respond, receiver) = oneshot::channel();
        self.sender
            .send(QueuedItem { text, respond })
            .map_err(|_| CoreError::Transient("embedding batcher loop has shut down".into()))?;
        receiver.await.map_err(|_| CoreError::Transient("embedding batcher dropped the request".into()))?
    }

    /// Stops accepting new work, drains anything already queued in chunks
    /// of at most `max_batch_size`, and waits for the background loop to
    /// fully exit before returning.
    pub async fn close(&self) {
        self.stopped.store(true, Ordering::Release);
        let mut guard = self.loop_handle.lock().await;
        if let Some(handle) = guard.take() {
            let _ = handle.await;
        }
    }

    async fn run_loop(
        provider: Arc<dyn EmbeddingProvider>,
        config: BatcherConfig,
        mut receiver: mpsc::UnboundedReceiver<QueuedItem>,
        stopped: Arc<AtomicBool>,
    ) {
        loop {
            if stopped.load(Ordering::Acquire) {
                Self::drain_remaining(&provider, &config, &mut receiver).await;
                return;
            }

            let first = tokio::time::timeout(config.flush_interval, receiver.recv()).await;
            let first = match first {
                Ok(Some(item)) => item,
                Ok(None) => return,
                Err(_) => continue,
            };

            let mut batch = vec![first];
            while batch.len() < config.max_batch_size {
                match receiver.try_recv() {
                    Ok(item) => batch.push(item),
                    Err(_) => break,
                }
            }

            if batch.len() < config.max_batch_size && config.fill_wait > Duration::ZERO {
                if let Ok(Some(item)) = tokio::time::timeout(config.fill_wait, receiver.recv()).await {
                    batch.push(item);
                }
            }

            Self::process_batch(&provider, &config, batch).await;
        }
    }

    /// Runs after `close()` flips the stop flag: flushes whatever is still
    /// queued in chunks of at most `max_batch_size`, without waiting for
    /// more to arrive.
    async fn drain_remaining(
        provider: &Arc<dyn EmbeddingProvider>,
        config: &BatcherConfig,
        receiver: &mut mpsc::UnboundedReceiver<QueuedItem>,
    ) {
        loop {
            let mut batch = Vec::new();
            while batch.len() < config.max_batch_size {
                match receiver.try_recv() {
                    Ok(item) => batch.push(item),
                    Err(_) => break,
                }
            }
            if batch.is_empty() {
                return;
            }
            Self::process_batch(provider, config, batch).await;
        }
    }

    async fn process_batch(provider: &Arc<dyn EmbeddingProvider>, config: &BatcherConfig, batch: Vec<QueuedItem>) {
        let texts: Vec<String> = batch.iter().map(|i| i.text.clone()).collect();

        let mut attempt = 0u32;
        let mut backoff = Duration::from_millis(100);

        loop {
            match provider.embed(&texts).await {
                Ok(embeddings) if embeddings.len() == texts.len() => {
                    for (item, embedding) in batch.into_iter().zip(embeddings) {
                        let _ = item.respond.send(Ok(embedding));
                    }
                    return;
                }
                Ok(embeddings) => {
                    let err = CoreError::Validation(format!(
                        "embedding provider returned {} embeddings for {} texts",
                        embeddings.len(),
                        texts.len()
                    ));
                    Self::fail_all(batch, err);
                    return;
                }
                Err(CoreError::RateLimited(msg)) => {
                    attempt += 1;
                    if attempt > config.max_retries {
                        Self::fail_all(batch, CoreError::RateLimited(msg));
                        return;
                    }
                    let jitter = 1.0 + rand::thread_rng().gen_range(-0.1..=0.1);
                    let sleep_for = backoff.mul_f64(jitter).min(config.max_backoff);
                    tokio::time::sleep(sleep_for).await;
                    backoff = (backoff * 2).min(config.max_backoff);
                }
                Err(other) => {
                    Self::fail_all(batch, other);
                    return;
                }
            }
        }
    }

    fn fail_all(batch: Vec<QueuedItem>, err: CoreError) {
        let message = err.to_string();
        for item in batch {
            let _ = item.respond.send(Err(CoreError::Transient(message.clone())));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedProvider;
    #[async_trait]
    impl EmbeddingProvider for FixedProvider {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
        }
    }

    struct ShortProvider;
    #[async_trait]
    impl EmbeddingProvider for ShortProvider {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().take(texts.len().saturating_sub(1)).map(|t| vec![t.len() as f32]).collect())
        }
    }

    struct RateLimitedThenOk {
        calls: AtomicU32,
    }
    #[async_trait]
    impl EmbeddingProvider for RateLimitedThenOk {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(CoreError::RateLimited("throttled".into()))
            } else {
                Ok(texts.iter().map(|t| vec![t.len() as f32]).collect())
            }
        }
    }

    #[tokio::test]
    async fn submit_resolves_with_embedding() {
        let batcher = EmbeddingBatcher::new(
            Arc::new(FixedProvider),
            BatcherConfig { flush_interval: Duration::from_millis(10), ..Default::default() },
        );
        let result = batcher.submit("hello".to_string(), serde_json::json!(null)).await.unwrap();
        assert_eq!(result, vec![5.0]);
        batcher.close().await;
    }

    #[tokio::test]
    async fn length_mismatch_fails_the_whole_batch() {
        let batcher = EmbeddingBatcher::new(
            Arc::new(ShortProvider),
            BatcherConfig { flush_interval: Duration::from_millis(5), max_batch_size: 2, fill_wait: Duration::from_millis(20), ..Default::default() },
        );

        let a = batcher.submit("aa".to_string(), serde_json::json!(null));
        let b = batcher.submit("bb".to_string(), serde_json::json!(null));
        let (ra, rb) = tokio::join!(a, b);
        assert!(ra.is_err());
        assert!(rb.is_err());
        batcher.close().await;
    }

    #[tokio::test]
    async fn rate_limit_retries_then_succeeds() {
        let provider = Arc::new(RateLimitedThenOk { calls: AtomicU32::new(0) });
        let batcher = EmbeddingBatcher::new(
            provider,
            BatcherConfig {
                flush_interval: Duration::from_millis(5),
                max_retries: 2,
                max_backoff: Duration::from_millis(20),
                ..Default::default()
            },
        );
        let result = batcher.submit("hi".to_string(), serde_json::json!(null)).await.unwrap();
        assert_eq!(result, vec![2.0]);
        batcher.close().await;
    }
}
