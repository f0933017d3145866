//! Aggregate type identifiers: one stream family per aggregate.
//!
//! Projections filter published envelopes by these names; the application
//! layer uses them when dispatching commands.

pub const PARTY: &str = "parties.party";
pub const UNSORTED_LOT: &str = "stock.lot";
pub const SORTED_LOT: &str = "stock.sorted";
pub const REJECTS: &str = "stock.rejects";
pub const TREATMENT_BATCH: &str = "treatment.batch";
pub const CLIENT_BALANCE: &str = "clientstock.balance";
