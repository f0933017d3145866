//! Client stock ledger domain (event-sourced).
//!
//! One balance aggregate per client, holding running pole totals per
//! `(size class, bucket)` cell. Every mutation is a delta event on the
//! client's own stream, so concurrent updates serialize through the ledger
//! and no code path ever writes a whole balance row.

pub mod balance;

pub use balance::{
    AdjustBalance, BalanceAdjusted, BalanceCommand, BalanceEvent, ClientStockBalance,
    ManualStockRecorded, RecordDelivery, RecordManualEntry, SizeClass, StockBucket,
};
