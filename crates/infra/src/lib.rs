//! Infrastructure for the consignment engine: the event store, the command
//! dispatcher, folio counters, and the catch-up read models.

pub mod command_dispatcher;
pub mod event_store;
pub mod folio;
pub mod projections;
pub mod read_model;

mod integration_tests;

pub use command_dispatcher::{CommandDispatcher, DispatchError, Dispatched, RetryPolicy};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent, UncommittedEvent};
pub use folio::{FolioSequencer, InMemoryFolioSequencer};
