//! Party directory projection.
//!
//! Lookup view of registered suppliers and clients, joined into reject
//! collection lists and delivery paperwork by name and contact details.

use serde_json::Value as JsonValue;

use poleyard_core::PartyId;
use poleyard_events::EventEnvelope;
use poleyard_parties::{ContactInfo, PartyEvent, PartyKind};

use crate::read_model::ReadStore;
use crate::streams;

use super::ProjectionError;
use super::cursor::{Advance, StreamCursors};

/// Read model: one registered party.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartyReadModel {
    pub party_id: PartyId,
    pub kind: PartyKind,
    pub name: String,
    pub contact: ContactInfo,
}

/// Projects `parties.party` streams into the directory.
#[derive(Debug)]
pub struct PartyDirectoryProjection<S>
where
    S: ReadStore<PartyId, PartyReadModel>,
{
    store: S,
    cursors: StreamCursors,
}

impl<S> PartyDirectoryProjection<S>
where
    S: ReadStore<PartyId, PartyReadModel>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: StreamCursors::new(),
        }
    }

    pub fn get(&self, party_id: &PartyId) -> Option<PartyReadModel> {
        self.store.get(party_id)
    }

    /// Parties of one kind, sorted by name.
    pub fn list_by_kind(&self, kind: PartyKind) -> Vec<PartyReadModel> {
        let mut parties: Vec<_> = self
            .store
            .list()
            .into_iter()
            .filter(|p| p.kind == kind)
            .collect();
        parties.sort_by(|a, b| a.name.cmp(&b.name));
        parties
    }

    /// Apply a published envelope into the projection (idempotent).
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), ProjectionError> {
        if envelope.aggregate_type() != streams::PARTY {
            return Ok(());
        }
        if self
            .cursors
            .advance(envelope.aggregate_id(), envelope.sequence_number())?
            == Advance::Replayed
        {
            return Ok(());
        }

        let event: PartyEvent = serde_json::from_value(envelope.payload().clone())
            .map_err(|e| ProjectionError::Deserialize(e.to_string()))?;

        match event {
            PartyEvent::PartyRegistered(e) => {
                self.store.upsert(
                    e.party_id,
                    PartyReadModel {
                        party_id: e.party_id,
                        kind: e.kind,
                        name: e.name,
                        contact: e.contact,
                    },
                );
            }
            PartyEvent::ContactUpdated(e) => match self.store.get(&e.party_id) {
                Some(mut party) => {
                    party.contact = e.contact;
                    self.store.upsert(e.party_id, party);
                }
                None => {
                    tracing::warn!(party_id = %e.party_id, "contact update for unknown party, skipping");
                }
            },
        }

        Ok(())
    }
}
