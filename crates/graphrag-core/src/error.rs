//! Error taxonomy shared across the orchestration core.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CoreError>;

#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed event or missing required field; recoverable by skip+log.
    #[error("validation error: {0}")]
    Validation(String),

    /// Downstream throttle; caller should retry with jittered backoff.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// Network/availability failure; retried or circuit-broken upstream.
    #[error("transient error: {0}")]
    Transient(String),

    /// Retry budget exhausted.
    #[error("permanent error: {0}")]
    Permanent(String),

    /// Cross-tenant or cross-database attempt. Always surfaced.
    #[error("tenant isolation violation: {0}")]
    TenantIsolationViolation(String),

    /// Production-mode invariant unmet; process must abort at startup.
    #[error("configuration violation: {0}")]
    ConfigViolation(String),

    /// Checkpoint/evaluation absent.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] graphrag_checkpoint::error::CheckpointError),

    #[error("llm error: {0}")]
    Llm(#[from] graphrag_llm::LlmError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// Caches and evaluators fail *open*; this marks which errors are safe
    /// to swallow into a fallback outcome rather than surfaced as a hard
    /// failure.
    pub fn fails_open(&self) -> bool {
        matches!(self, CoreError::RateLimited(_) | CoreError::Transient(_) | CoreError::NotFound(_))
    }
}
