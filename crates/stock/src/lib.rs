//! Stock intake and sorting domain (event-sourced).
//!
//! Raw poles arrive from suppliers as unsorted lots; the sorting engine
//! splits them into categorized lots and spins rejected poles off into a
//! collection-tracking flow. All business rules here are deterministic
//! domain logic (no IO, no storage).

pub mod category;
pub mod rejects;
pub mod sorted;
pub mod unsorted;

pub use category::{
    DIAMETER_MAX_MM, DIAMETER_MIN_MM, LengthUnit, PoleCategory, PoleSize, SortedAttributes,
};
pub use rejects::{
    MarkCollected, RecordRejects, RejectCommand, RejectEvent, RejectedPoleRecord, RejectsCollected,
    RejectsRecorded,
};
pub use sorted::{
    ConsumeSortedStock, EstablishSortedLot, SortedLot, SortedLotCommand, SortedLotEstablished,
    SortedLotEvent, SortedStockConsumed,
};
pub use unsorted::{
    AmendNotes, LotReceived, NotesAmended, ReceiveLot, SortStock, StockEvent, StockSorted,
    UnsortedLot, UnsortedLotCommand,
};
