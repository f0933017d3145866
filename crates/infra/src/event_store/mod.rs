//! Append-only event storage (the quantity ledger).

pub mod in_memory;
pub mod store;

pub use in_memory::InMemoryEventStore;
pub use store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
