//! Multi-tenant isolation: registry, router, connection binding, query-time
//! filter injection, and tenant-scoped vector search.

pub mod connection;
pub mod filter;
pub mod registry;
pub mod router;
pub mod vector_store;

pub use connection::{detect_orphaned_pools, validate_physical_isolation_support, GraphServerProbe, TenantConnectionWrapper};
pub use filter::{build_tenant_params, inject_tenant_filter};
pub use registry::TenantRegistry;
pub use router::TenantRouter;
pub use vector_store::{resolve_collection_name, InMemoryVectorStore};
