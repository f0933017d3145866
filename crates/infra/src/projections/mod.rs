//! Read-model projections over the quantity ledger.
//!
//! Projections consume published envelopes and maintain disposable,
//! rebuildable read models. Delivery is at-least-once, so every projection
//! deduplicates per `(stream, sequence number)` before applying; balance
//! deltas additionally commute, so arrival order across concurrent streams
//! does not matter.

pub mod client_balances;
pub mod cursor;
pub mod lot_directory;
pub mod party_directory;
pub mod pending_rejects;
pub mod sorted_lots;

use thiserror::Error;

pub use client_balances::{ClientBalanceReadModel, ClientBalancesProjection};
pub use cursor::{Advance, StreamCursors};
pub use lot_directory::{LotDirectoryProjection, UnsortedLotReadModel};
pub use party_directory::{PartyDirectoryProjection, PartyReadModel};
pub use pending_rejects::{PendingRejectsProjection, RejectReadModel};
pub use sorted_lots::{SortedLotReadModel, SortedLotsProjection};

#[derive(Debug, Error)]
pub enum ProjectionError {
    #[error("failed to deserialize event payload: {0}")]
    Deserialize(String),

    #[error("invalid sequence number {found} in published envelope")]
    InvalidSequence { found: u64 },
}
