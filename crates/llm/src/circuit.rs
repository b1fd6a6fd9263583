//! Per-backend circuit breaker.
//!
//! Tracks consecutive failures for one backend; once `failure_threshold` is
//! reached the breaker opens and fails fast until `reset_timeout` elapses.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{LlmError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
}

/// Thread-safe circuit breaker for a single backend.
///
/// `last_failure_time` is stored as milliseconds since an internal epoch
/// (an `Instant` captured at construction) so it fits in an `AtomicU64`.
pub struct CircuitBreaker {
    name: String,
    failure_threshold: u32,
    reset_timeout: Duration,
    failure_count: AtomicU32,
    last_failure_millis: AtomicU64,
    epoch: Instant,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, failure_threshold: u32, reset_timeout: Duration) -> Self {
        Self {
            name: name.into(),
            failure_threshold,
            reset_timeout,
            failure_count: AtomicU32::new(0),
            last_failure_millis: AtomicU64::new(0),
            epoch: Instant::now(),
        }
    }

    fn state(&self) -> CircuitState {
        let count = self.failure_count.load(Ordering::Acquire);
        if count < self.failure_threshold {
            return CircuitState::Closed;
        }
        let last_failure = self.last_failure_millis.load(Ordering::Acquire);
        let elapsed = self.epoch.elapsed().as_millis() as u64 - last_failure;
        if elapsed > self.reset_timeout.as_millis() as u64 {
            CircuitState::Closed
        } else {
            CircuitState::Open
        }
    }

    /// Check the breaker before issuing a call; fails fast while open.
    pub fn guard(&self) -> Result<()> {
        match self.state() {
            CircuitState::Closed => Ok(()),
            CircuitState::Open => Err(LlmError::ProviderUnavailable(self.name.clone())),
        }
    }

    pub fn record_success(&self) {
        self.failure_count.store(0, Ordering::Release);
    }

    pub fn record_failure(&self) {
        self.failure_count.fetch_add(1, Ordering::AcqRel);
        let now = self.epoch.elapsed().as_millis() as u64;
        self.last_failure_millis.store(now, Ordering::Release);
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Acquire)
    }
}

/// Run a call through a breaker, updating its state from the outcome.
pub async fn call_guarded<F, Fut, T>(breaker: &Arc<CircuitBreaker>, call: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    breaker.guard()?;
    match call().await {
        Ok(value) => {
            breaker.record_success();
            Ok(value)
        }
        Err(err) => {
            breaker.record_failure();
            Err(err)
        }
    }
}
