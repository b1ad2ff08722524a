//! Append-only, tenant-scoped event store.
//!
//! Streams are addressed by `(tenant_id, aggregate_id)`. Besides the per-stream
//! sequence number, every stored event gets a store-wide `position`, which is
//! what read models use to catch up in commit order.

pub mod in_memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
