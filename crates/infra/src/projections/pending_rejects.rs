//! Rejected-pole tracker projection.
//!
//! Queryable view of reject records: which rejected lots are still waiting
//! for their supplier to collect them, and which were already picked up.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value as JsonValue;

use poleyard_core::{PartyId, RejectRecordId, SortedLotId};
use poleyard_events::EventEnvelope;
use poleyard_stock::RejectEvent;

use crate::read_model::ReadStore;
use crate::streams;

use super::ProjectionError;
use super::cursor::{Advance, StreamCursors};

/// Read model: one reject record awaiting (or past) collection.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectReadModel {
    pub record_id: RejectRecordId,
    pub sorted_lot_id: SortedLotId,
    pub supplier_id: PartyId,
    pub quantity: u32,
    pub sorting_date: NaiveDate,
    pub collected_at: Option<DateTime<Utc>>,
    pub delivery_note_number: Option<String>,
}

impl RejectReadModel {
    pub fn is_pending(&self) -> bool {
        self.collected_at.is_none()
    }
}

/// Projects `stock.rejects` streams into the reject tracker.
#[derive(Debug)]
pub struct PendingRejectsProjection<S>
where
    S: ReadStore<RejectRecordId, RejectReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> PendingRejectsProjection<S>
where
    S: ReadStore<RejectRecordId, RejectReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, record_id: &RejectRecordId) -> Option<RejectReadModel> {
        self.store.get(record_id)
    }

    /// Uncollected records only, most recent sorting date first.
    pub fn pending(&self) -> Vec<RejectReadModel> {
        let mut records: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(RejectReadModel::is_pending)
            .collect();
        records.sort_by(|a, b| b.sorting_date.cmp(&a.sorting_date));
        records
    }

    /// Every record, collected or not, most recent sorting date first.
    pub fn list(&self) -> Vec<RejectReadModel> {
        let mut records = self.store.list();
        records.sort_by(|a, b| b.sorting_date.cmp(&a.sorting_date));
        records
    }

    /// Apply a published envelope into the projection (idempotent).
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::REJECTS {
            return Ok(());
        }
        if self
            .cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number())?
            == Advance::Replayed
        {
            return Ok(());
        }

        let event: RejectEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        match event {
            RejectEvent::RejectsRecorded(e) => {
                self.store.upsert(
                    e.record_id,
                    RejectReadModel {
                        record_id: e.record_id,
                        sorted_lot_id: e.sorted_lot_id,
                        supplier_id: e.supplier_id,
                        quantity: e.quantity,
                        sorting_date: e.sorting_date,
                        collected_at: None,
                        delivery_note_number: None,
                    },
                );
            }
            RejectEvent::RejectsCollected(e) => match self.store.get(&e.record_id) {
                Some(mut record) => {
                    record.collected_at = Some(e.collected_at);
                    record.delivery_note_number = Some(e.delivery_note_number);
                    self.store.upsert(e.record_id, record);
                }
                None => {
                    tracing::warn!(
                        record_id = %e.record_id,
                        "collection event for unknown reject record, skipping"
                    );
                }
            },
        }

        Ok(())
    }
}
