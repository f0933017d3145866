//! Event abstractions for the quantity ledger.
//!
//! Every stock-affecting operation in the yard is recorded as an event; this
//! crate holds the domain-agnostic pieces: the [`Event`] trait, the
//! [`EventEnvelope`] persisted/published per event, and a minimal pub/sub
//! [`EventBus`] used to feed read-model projections.

pub mod bus;
pub mod envelope;
pub mod event;
pub mod in_memory_bus;

pub use bus::{EventBus, Subscription};
pub use envelope::EventEnvelope;
pub use event::Event;
pub use in_memory_bus::{InMemoryBusError, InMemoryEventBus};
