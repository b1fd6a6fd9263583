//! Transactional outbox: durable event log, claim/lease protocol, drainer,
//! and a coalescing front-end buffer.

pub mod coalescing;
pub mod drainer;
pub mod error;
pub mod store;

pub use coalescing::{CoalescingOutbox, SpilloverCallback};
pub use drainer::{OutboxDrainer, OutboxDrainerLoop, VectorDeleter};
pub use error::{ClaimLostError, DrainerPermanentError, DrainerTransientError, OutboxWriteError};
pub use store::{commit_topology_with_outbox, InMemoryOutboxStore, OutboxStore, OutboxTx, PostgresOutboxStore};
