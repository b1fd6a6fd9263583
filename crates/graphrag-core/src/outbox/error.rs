//! Outbox-specific error taxonomy, distinct from [`crate::error::CoreError`]
//! so drainer call sites can match on retryability without string-matching.

use thiserror::Error;

#[derive(Error, Debug)]
#[error("outbox write failed: {0}")]
pub struct OutboxWriteError(pub String);

#[derive(Error, Debug)]
#[error("downstream delete failed, will retry: {0}")]
pub struct DrainerTransientError(pub String);

#[derive(Error, Debug)]
#[error("retry budget exhausted for event {event_id}: {cause}")]
pub struct DrainerPermanentError {
    pub event_id: uuid::Uuid,
    pub cause: String,
}

#[derive(Error, Debug)]
#[error("claim lease expired mid-work for event {0}")]
pub struct ClaimLostError(pub uuid::Uuid);
