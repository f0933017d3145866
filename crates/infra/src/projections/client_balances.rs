//! Client stock balances projection.
//!
//! Tracks per-client running totals per `(size class, bucket)` cell. Every
//! balance event is a delta, applied through the read store's atomic
//! `update` primitive; there is no read-then-write of a whole row anywhere
//! on this path, so concurrent credits to the same client cannot lose
//! updates.

use std::collections::BTreeMap;

use serde_json::Value as JsonValue;

use poleyard_clientstock::{BalanceEvent, SizeClass, StockBucket};
use poleyard_core::PartyId;
use poleyard_events::EventEnvelope;

use crate::read_model::ReadStore;
use crate::streams;

use super::ProjectionError;
use super::cursor::{Advance, StreamCursors};

/// Read model: per-client balance across all cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientBalanceReadModel {
    pub client_id: Option<PartyId>,
    cells: BTreeMap<(SizeClass, StockBucket), i64>,
}

impl ClientBalanceReadModel {
    fn empty() -> Self {
        Self {
            client_id: None,
            cells: BTreeMap::new(),
        }
    }

    pub fn cell(&self, size: SizeClass, bucket: StockBucket) -> i64 {
        self.cells.get(&(size, bucket)).copied().unwrap_or(0)
    }

    pub fn bucket_total(&self, bucket: StockBucket) -> i64 {
        SizeClass::ALL
            .iter()
            .map(|size| self.cell(*size, bucket))
            .sum()
    }
}

/// Projects `clientstock.balance` streams into per-client balances.
#[derive(Debug)]
pub struct ClientBalancesProjection<S>
where
    S: ReadStore<PartyId, ClientBalanceReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> ClientBalancesProjection<S>
where
    S: ReadStore<PartyId, ClientBalanceReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    /// Balance for one client; a client with no history has all-zero cells.
    pub fn get(&self, client_id: PartyId) -> ClientBalanceReadModel {
        self.store.get(&client_id).unwrap_or_else(|| {
            let mut model = ClientBalanceReadModel::empty();
            model.client_id = Some(client_id);
            model
        })
    }

    /// Drop all state and re-apply a full envelope history.
    ///
    /// Read models are disposable; the ledger is the source of truth.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: Vec<EventEnvelope<JsonValue>>,
    ) -> Result<(), ProjectionError> {
        self.store.clear();
        self.cursors.reset();
        for envelope in &envelopes {
            self.apply_envelope(envelope)?;
        }
        Ok(())
    }

    /// Apply a published envelope into the projection (idempotent).
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::CLIENT_BALANCE {
            return Ok(());
        }
        if self
            .cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number())?
            == Advance::Replayed
        {
            return Ok(());
        }

        let event: BalanceEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        let client_id = event.client_id();
        let (size, bucket, delta) = event.delta();

        // Upsert-on-first-touch, then an atomic increment of one cell.
        self.store
            .update(client_id, ClientBalanceReadModel::empty, &mut |model| {
                model.client_id = Some(client_id);
                *model.cells.entry((size, bucket)).or_insert(0) += delta;
            });

        Ok(())
    }
}
