//! Vector-sync consumption path and the capability interfaces at the
//! ingestion pipeline's edges.

pub mod bus;
pub mod capability;

pub use bus::{InMemoryMutationBus, MutationConsumer, VectorSyncConsumer};
pub use capability::{BlobStore, TenantDataStore};
