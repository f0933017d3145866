//! Supplier/client registry.
//!
//! Suppliers deliver raw poles (and come back for their rejects); clients
//! have treatment batches run for them and carry stock balances. Both are
//! parties with contact details, modeled as one event-sourced aggregate.

pub mod party;

pub use party::{
    ContactInfo, Party, PartyCommand, PartyEvent, PartyKind, PartyRegistered, RegisterParty,
    UpdateContact,
};
