//! Treatment consumption domain (event-sourced).
//!
//! One chemical treatment run either consumes company-owned sorted stock or
//! treats poles a client brought in themselves. The two cases are split at
//! the type level so a client-owned batch can never carry a meaningless lot
//! reference.

pub mod batch;

pub use batch::{
    PoleCounts, RecordTreatment, StockOwnership, TreatmentBatch, TreatmentCommand, TreatmentEvent,
    TreatmentRecorded,
};
