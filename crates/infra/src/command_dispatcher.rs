//! Command execution pipeline (application-level orchestration).
//!
//! One consistent lifecycle for every aggregate:
//!
//! ```text
//! Command
//!   ↓
//! 1. Load events from the ledger
//!   ↓
//! 2. Rehydrate aggregate (apply history)
//!   ↓
//! 3. Handle command (pure decision logic, produces events)
//!   ↓
//! 4. Append events (append-only, optimistic concurrency check)
//!   ↓
//! 5. Publish events to the bus (projections update)
//! ```
//!
//! Events are appended before publication; if the append fails nothing is
//! published, and if publication fails the events are already durable and
//! can be republished (at-least-once, idempotent consumers).

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use poleyard_core::{Aggregate, AggregateId, DomainError, ExpectedVersion};
use poleyard_events::{EventBus, EventEnvelope};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

#[derive(Debug)]
pub enum DispatchError {
    /// Optimistic concurrency failure (e.g. stale aggregate version).
    Concurrency(String),
    /// Domain validation failure (deterministic).
    Validation(String),
    /// Domain invariant failure (deterministic).
    InvariantViolation(String),
    /// Domain authorization failure.
    Unauthorized,
    /// Domain-level not found.
    NotFound,
    /// Not enough stock to satisfy the command.
    NoStockAvailable { requested: u32, available: u32 },
    /// A reject record was already marked collected.
    AlreadyCollected,
    /// Failed to deserialize historical event payloads into the aggregate
    /// event type.
    Deserialize(String),
    /// Persisting to the event store failed.
    Store(EventStoreError),
    /// Publication failed after a successful append (at-least-once; retry
    /// may duplicate).
    Publish(String),
}

impl From<EventStoreError> for DispatchError {
    fn from(value: EventStoreError) -> Self {
        match &value {
            EventStoreError::Concurrency(msg) => DispatchError::Concurrency(msg.clone()),
            _ => DispatchError::Store(value),
        }
    }
}

impl From<DomainError> for DispatchError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) => DispatchError::Validation(msg),
            DomainError::InvariantViolation(msg) => DispatchError::InvariantViolation(msg),
            DomainError::Conflict(msg) => DispatchError::Concurrency(msg),
            DomainError::Unauthorized => DispatchError::Unauthorized,
            DomainError::NotFound => DispatchError::NotFound,
            DomainError::InvalidId(msg) => DispatchError::Validation(msg),
            DomainError::NoStockAvailable {
                requested,
                available,
            } => DispatchError::NoStockAvailable {
                requested,
                available,
            },
            DomainError::AlreadyCollected => DispatchError::AlreadyCollected,
        }
    }
}

/// Reusable command execution engine for event-sourced aggregates.
///
/// Sits between the application layer and the ledger; generic over the
/// store and bus so tests can run fully in memory.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self { store, bus }
    }

    pub fn into_parts(self) -> (S, B) {
        (self.store, self.bus)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Dispatch a command through the full pipeline.
    ///
    /// The `make_aggregate` closure lets domain code control aggregate
    /// initialization (e.g. `UnsortedLot::empty(id)`) while the dispatcher
    /// stays generic. Returns the committed events with assigned sequence
    /// numbers.
    ///
    /// Concurrency is optimistic: the current stream version is expected on
    /// append, and a concurrent writer surfaces as
    /// [`DispatchError::Concurrency`]; callers retry by re-dispatching.
    pub fn dispatch<A>(
        &self,
        aggregate_id: AggregateId,
        aggregate_type: impl Into<String>,
        command: A::Command,
        make_aggregate: impl FnOnce(AggregateId) -> A,
    ) -> Result<Vec<StoredEvent>, DispatchError>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: poleyard_events::Event + Serialize + DeserializeOwned,
    {
        // 1) Load history (streams are namespaced by aggregate type)
        let aggregate_type = aggregate_type.into();
        let history = self.store.load_stream(&aggregate_type, aggregate_id)?;
        validate_loaded_stream(aggregate_id, &history)?;
        let expected = ExpectedVersion::Exact(stream_version(&history));

        // 2) Rehydrate aggregate
        let mut aggregate = make_aggregate(aggregate_id);
        apply_history::<A>(&mut aggregate, &history)?;

        // 3) Decide events (no mutation)
        let decided = aggregate.handle(&command).map_err(DispatchError::from)?;
        if decided.is_empty() {
            return Ok(vec![]);
        }

        // 4) Persist (append-only, optimistic)
        let uncommitted = decided
            .iter()
            .map(|ev| {
                UncommittedEvent::from_typed(
                    aggregate_id,
                    aggregate_type.clone(),
                    Uuid::now_v7(),
                    ev,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let committed = self.store.append(uncommitted, expected)?;

        // 5) Publish committed events (after append)
        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| DispatchError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }
}

fn stream_version(stream: &[StoredEvent]) -> u64 {
    stream.last().map(|e| e.sequence_number).unwrap_or(0)
}

fn validate_loaded_stream(
    aggregate_id: AggregateId,
    stream: &[StoredEvent],
) -> Result<(), DispatchError> {
    // Ensure the stream belongs to the requested aggregate and is
    // monotonically increasing by sequence number, even if a buggy backend
    // returns something else.
    let mut last = 0u64;
    for (idx, e) in stream.iter().enumerate() {
        if e.aggregate_id != aggregate_id {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                format!("loaded stream contains wrong aggregate_id at index {idx}"),
            )));
        }
        if e.sequence_number == 0 {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                "stored event has sequence_number=0".to_string(),
            )));
        }
        if e.sequence_number <= last {
            return Err(DispatchError::Store(EventStoreError::InvalidAppend(
                format!(
                    "non-monotonic sequence_number in loaded stream (last={last}, found={})",
                    e.sequence_number
                ),
            )));
        }
        last = e.sequence_number;
    }
    Ok(())
}

fn apply_history<A>(aggregate: &mut A, history: &[StoredEvent]) -> Result<(), DispatchError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    // Ensure deterministic ordering.
    let mut sorted = history.to_vec();
    sorted.sort_by_key(|e| e.sequence_number);

    for stored in sorted {
        let ev: A::Event = serde_json::from_value(stored.payload)
            .map_err(|e| DispatchError::Deserialize(e.to_string()))?;
        aggregate.apply(&ev);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    use poleyard_clientstock::{AdjustBalance, BalanceCommand, ClientStockBalance, SizeClass, StockBucket};
    use poleyard_core::PartyId;
    use poleyard_events::InMemoryEventBus;

    use crate::event_store::InMemoryEventStore;
    use crate::streams;

    fn dispatcher() -> CommandDispatcher<
        Arc<InMemoryEventStore>,
        Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>,
    > {
        CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryEventBus::new()),
        )
    }

    fn adjust(client_id: PartyId, delta: i64) -> BalanceCommand {
        BalanceCommand::AdjustBalance(AdjustBalance {
            client_id,
            size: SizeClass::Telecom,
            bucket: StockBucket::Treated,
            delta,
            occurred_at: Utc::now(),
        })
    }

    #[test]
    fn dispatch_appends_and_publishes() {
        let dispatcher = dispatcher();
        let client_id = PartyId::new();

        let committed = dispatcher
            .dispatch::<ClientStockBalance>(
                client_id.into(),
                streams::CLIENT_BALANCE,
                adjust(client_id, 5),
                |_| ClientStockBalance::empty(client_id),
            )
            .unwrap();

        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].sequence_number, 1);
        assert_eq!(committed[0].event_type, "clientstock.balance.adjusted");
    }

    #[test]
    fn rehydration_sees_prior_events() {
        let dispatcher = dispatcher();
        let client_id = PartyId::new();

        dispatcher
            .dispatch::<ClientStockBalance>(
                client_id.into(),
                streams::CLIENT_BALANCE,
                adjust(client_id, 5),
                |_| ClientStockBalance::empty(client_id),
            )
            .unwrap();

        // Debiting 5 only works if the first event was applied on rehydrate.
        let committed = dispatcher
            .dispatch::<ClientStockBalance>(
                client_id.into(),
                streams::CLIENT_BALANCE,
                adjust(client_id, -5),
                |_| ClientStockBalance::empty(client_id),
            )
            .unwrap();
        assert_eq!(committed[0].sequence_number, 2);

        // A further debit must fail in the domain.
        let err = dispatcher
            .dispatch::<ClientStockBalance>(
                client_id.into(),
                streams::CLIENT_BALANCE,
                adjust(client_id, -1),
                |_| ClientStockBalance::empty(client_id),
            )
            .unwrap_err();
        assert!(matches!(err, DispatchError::Validation(_)));
    }

    #[test]
    fn balance_stream_does_not_rehydrate_from_the_party_stream() {
        // A client's balance stream is keyed by the party id. Registering
        // the party first must not put `PartyRegistered` in front of the
        // balance aggregate's history.
        use poleyard_parties::{ContactInfo, Party, PartyCommand, PartyKind, RegisterParty};

        let dispatcher = dispatcher();
        let client_id = PartyId::new();

        dispatcher
            .dispatch::<Party>(
                client_id.into(),
                streams::PARTY,
                PartyCommand::RegisterParty(RegisterParty {
                    party_id: client_id,
                    kind: PartyKind::Client,
                    name: "Mutare Grid Works".to_string(),
                    contact: ContactInfo::default(),
                    occurred_at: Utc::now(),
                }),
                |_| Party::empty(client_id),
            )
            .unwrap();

        let committed = dispatcher
            .dispatch::<ClientStockBalance>(
                client_id.into(),
                streams::CLIENT_BALANCE,
                adjust(client_id, 5),
                |_| ClientStockBalance::empty(client_id),
            )
            .unwrap();

        // Fresh stream for the balance side: sequence starts at 1.
        assert_eq!(committed[0].sequence_number, 1);
        assert_eq!(committed[0].aggregate_type, streams::CLIENT_BALANCE);
    }
}
