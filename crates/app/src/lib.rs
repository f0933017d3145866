//! Application layer: the yard's operation surface.
//!
//! Ties the domain crates to the quantity ledger and read models, and
//! enforces role permissions on every operation.

pub mod dto;
pub mod error;
pub mod service;

pub use dto::{
    PendingReject, RejectedPoleView, SortOutcome, SortStockInput, TreatmentBatchView,
    TreatmentInput, TreatmentStock,
};
pub use error::OperationError;
pub use service::YardService;
