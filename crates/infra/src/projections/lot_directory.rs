//! Unsorted-lot directory projection.
//!
//! Queryable intake view: what arrived, from whom, and how much of it has
//! been sorted so far.

use chrono::NaiveDate;
use serde_json::Value as JsonValue;

use poleyard_core::{PartyId, UnsortedLotId};
use poleyard_events::EventEnvelope;
use poleyard_stock::StockEvent;

use crate::read_model::ReadStore;
use crate::streams;

use super::ProjectionError;
use super::cursor::{Advance, StreamCursors};

/// Read model: one received lot and its sorting progress.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsortedLotReadModel {
    pub lot_id: UnsortedLotId,
    pub supplier_id: PartyId,
    pub quantity: u32,
    pub sorted_total: u32,
    pub received_date: NaiveDate,
    pub notes: Option<String>,
}

impl UnsortedLotReadModel {
    pub fn remaining(&self) -> u32 {
        self.quantity.saturating_sub(self.sorted_total)
    }
}

/// Projects `stock.lot` streams into the lot directory.
#[derive(Debug)]
pub struct LotDirectoryProjection<S>
where
    S: ReadStore<UnsortedLotId, UnsortedLotReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> LotDirectoryProjection<S>
where
    S: ReadStore<UnsortedLotId, UnsortedLotReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, lot_id: &UnsortedLotId) -> Option<UnsortedLotReadModel> {
        self.store.get(lot_id)
    }

    /// All received lots, most recent intake first.
    pub fn list(&self) -> Vec<UnsortedLotReadModel> {
        let mut lots = self.store.list();
        lots.sort_by(|a, b| b.received_date.cmp(&a.received_date));
        lots
    }

    /// Apply a published envelope into the projection (idempotent).
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::UNSORTED_LOT {
            return Ok(());
        }
        if self
            .cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number())?
            == Advance::Replayed
        {
            return Ok(());
        }

        let event: StockEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        match event {
            StockEvent::LotReceived(e) => {
                self.store.upsert(
                    e.lot_id,
                    UnsortedLotReadModel {
                        lot_id: e.lot_id,
                        supplier_id: e.supplier_id,
                        quantity: e.quantity,
                        sorted_total: 0,
                        received_date: e.received_date,
                        notes: e.notes,
                    },
                );
            }
            StockEvent::StockSorted(e) => match self.store.get(&e.lot_id) {
                Some(mut lot) => {
                    lot.sorted_total += e.quantity;
                    self.store.upsert(e.lot_id, lot);
                }
                None => {
                    tracing::warn!(lot_id = %e.lot_id, "sorted event for unknown lot, skipping");
                }
            },
            StockEvent::NotesAmended(e) => match self.store.get(&e.lot_id) {
                Some(mut lot) => {
                    lot.notes = e.notes;
                    self.store.upsert(e.lot_id, lot);
                }
                None => {
                    tracing::warn!(lot_id = %e.lot_id, "notes amended for unknown lot, skipping");
                }
            },
        }

        Ok(())
    }
}
