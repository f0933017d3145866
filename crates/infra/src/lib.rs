//! Infrastructure layer: the quantity ledger and everything derived from it.
//!
//! The event store is the append-only source of truth for every
//! stock-affecting event in the yard; the dispatcher runs commands through
//! it, and the projections maintain the disposable read models (lot
//! directory, remaining sorted stock, client balances, pending rejects).

pub mod command_dispatcher;
pub mod event_store;
pub mod projections;
pub mod read_model;
pub mod streams;
