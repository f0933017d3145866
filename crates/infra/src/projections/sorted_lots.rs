//! Sorted-lot availability projection.
//!
//! Sorted lot quantities are never physically reduced; a lot's remaining
//! stock is derived by aggregating every consumption recorded against it.
//! This projection consumes both `stock.lot` streams (lot creation) and
//! `stock.sorted` streams (the serialized consumption ledger).

use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use poleyard_core::{PartyId, SortedLotId, UnsortedLotId};
use poleyard_events::EventEnvelope;
use poleyard_stock::{SortedAttributes, SortedLotEvent, StockEvent};

use crate::read_model::ReadStore;
use crate::streams;

use super::ProjectionError;
use super::cursor::{Advance, StreamCursors};

/// Read model: one sorted lot with its derived consumption.
#[derive(Debug, Clone, PartialEq)]
pub struct SortedLotReadModel {
    pub sorted_lot_id: SortedLotId,
    pub source_lot_id: UnsortedLotId,
    pub supplier_id: PartyId,
    pub attributes: SortedAttributes,
    pub quantity: u32,
    /// Total taken by company-owned treatment batches.
    pub consumed: u32,
    pub sorting_date: NaiveDate,
    pub notes: Option<String>,
}

impl SortedLotReadModel {
    /// Stock still available for treatment.
    pub fn remaining(&self) -> u32 {
        self.quantity.saturating_sub(self.consumed)
    }
}

/// Projects sorted lots and their treatment consumption.
#[derive(Debug)]
pub struct SortedLotsProjection<S>
where
    S: ReadStore<SortedLotId, SortedLotReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> SortedLotsProjection<S>
where
    S: ReadStore<SortedLotId, SortedLotReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, sorted_lot_id: &SortedLotId) -> Option<SortedLotReadModel> {
        self.store.get(sorted_lot_id)
    }

    /// All sorted lots, most recent sorting first.
    pub fn list(&self) -> Vec<SortedLotReadModel> {
        let mut lots = self.store.list();
        lots.sort_by(|a, b| b.sorting_date.cmp(&a.sorting_date));
        lots
    }

    /// Apply a published envelope into the projection (idempotent).
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        match envelope.aggregate_type() {
            t if t == streams::UNSORTED_LOT => self.apply_stock(envelope),
            t if t == streams::SORTED_LOT => self.apply_consumption(envelope),
            _ => Ok(()),
        }
    }

    fn apply_stock(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if self
            .cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number())?
            == Advance::Replayed
        {
            return Ok(());
        }

        let event: StockEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        if let StockEvent::StockSorted(e) = event {
            self.store.upsert(
                e.sorted_lot_id,
                SortedLotReadModel {
                    sorted_lot_id: e.sorted_lot_id,
                    source_lot_id: e.lot_id,
                    supplier_id: e.supplier_id,
                    attributes: e.attributes,
                    quantity: e.quantity,
                    consumed: 0,
                    sorting_date: e.sorting_date,
                    notes: e.notes,
                },
            );
        }

        Ok(())
    }

    fn apply_consumption(&self, envelope: &EventEnvelope<JsonValue>) -> Result<(), ProjectionError> {
        if self
            .cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number())?
            == Advance::Replayed
        {
            return Ok(());
        }

        let event: SortedLotEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        // Lot creation is projected from the sort event; the sorted-lot
        // stream only contributes consumption.
        if let SortedLotEvent::SortedStockConsumed(e) = event {
            match self.store.get(&e.sorted_lot_id) {
                Some(mut lot) => {
                    lot.consumed += e.quantity;
                    self.store.upsert(e.sorted_lot_id, lot);
                }
                None => {
                    tracing::warn!(
                        sorted_lot_id = %e.sorted_lot_id,
                        "consumption recorded against an unknown sorted lot, skipping"
                    );
                }
            }
        }

        Ok(())
    }
}
