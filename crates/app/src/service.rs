//! The operation surface of the yard.
//!
//! [`YardService`] wires the quantity ledger (event store + dispatcher), the
//! event bus and the read-model projections into one facade. Every operation
//! takes the caller's [`Role`] and enforces the matching permission before
//! touching any aggregate; reads and writes both go through here.
//!
//! Projections are fed by draining the bus subscription after each append,
//! so a successful operation returns with its own effects visible in the
//! read models.

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, Utc};
use serde_json::Value as JsonValue;

use poleyard_auth::{Role, authorize, permissions};
use poleyard_clientstock::{
    AdjustBalance, BalanceCommand, ClientStockBalance, RecordDelivery, RecordManualEntry,
    SizeClass, StockBucket,
};
use poleyard_core::{
    Aggregate, PartyId, RejectRecordId, SortedLotId, TreatmentBatchId, UnsortedLotId,
};
use poleyard_events::{EventBus, EventEnvelope, InMemoryEventBus, Subscription};
use poleyard_infra::command_dispatcher::{CommandDispatcher, DispatchError};
use poleyard_infra::event_store::{InMemoryEventStore, StoredEvent};
use poleyard_infra::projections::{
    ClientBalanceReadModel, ClientBalancesProjection, LotDirectoryProjection,
    PartyDirectoryProjection, PartyReadModel, PendingRejectsProjection, RejectReadModel,
    SortedLotReadModel, SortedLotsProjection, UnsortedLotReadModel,
};
use poleyard_infra::read_model::InMemoryReadStore;
use poleyard_infra::streams;
use poleyard_parties::{ContactInfo, Party, PartyCommand, PartyKind, RegisterParty, UpdateContact};
use poleyard_stock::{
    AmendNotes, ConsumeSortedStock, EstablishSortedLot, MarkCollected, PoleCategory, ReceiveLot,
    RecordRejects, RejectCommand, RejectedPoleRecord, SortStock, SortedLot, SortedLotCommand,
    StockEvent, UnsortedLot, UnsortedLotCommand,
};
use poleyard_treatment::{RecordTreatment, StockOwnership, TreatmentBatch, TreatmentCommand};

use crate::dto::{
    PendingReject, RejectedPoleView, SortOutcome, SortStockInput, TreatmentBatchView,
    TreatmentInput, TreatmentStock,
};
use crate::error::OperationError;

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Dispatcher = CommandDispatcher<Arc<InMemoryEventStore>, Bus>;
type Store<K, V> = Arc<InMemoryReadStore<K, V>>;

/// Retry bound for optimistic appends on contended client streams. The
/// bound only guards against livelock; exhaustion surfaces as `Conflict`.
const MAX_APPEND_RETRIES: u32 = 64;

pub struct YardService {
    dispatcher: Dispatcher,
    subscription: Mutex<Subscription<EventEnvelope<JsonValue>>>,

    parties: PartyDirectoryProjection<Store<PartyId, PartyReadModel>>,
    lots: LotDirectoryProjection<Store<UnsortedLotId, UnsortedLotReadModel>>,
    sorted: SortedLotsProjection<Store<SortedLotId, SortedLotReadModel>>,
    rejects: PendingRejectsProjection<Store<RejectRecordId, RejectReadModel>>,
    balances: ClientBalancesProjection<Store<PartyId, ClientBalanceReadModel>>,
}

impl YardService {
    /// Fully in-memory wiring: store, bus and read models.
    pub fn in_memory() -> Self {
        let store = Arc::new(InMemoryEventStore::new());
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let subscription = Mutex::new(bus.subscribe());

        Self {
            dispatcher: CommandDispatcher::new(store, bus),
            subscription,
            parties: PartyDirectoryProjection::new(Arc::new(InMemoryReadStore::new())),
            lots: LotDirectoryProjection::new(Arc::new(InMemoryReadStore::new())),
            sorted: SortedLotsProjection::new(Arc::new(InMemoryReadStore::new())),
            rejects: PendingRejectsProjection::new(Arc::new(InMemoryReadStore::new())),
            balances: ClientBalancesProjection::new(Arc::new(InMemoryReadStore::new())),
        }
    }

    // ----- party registry -----

    pub fn register_party(
        &self,
        role: Role,
        kind: PartyKind,
        name: impl Into<String>,
        contact: ContactInfo,
    ) -> Result<PartyId, OperationError> {
        authorize(role, &permissions::PARTIES_REGISTER)?;

        let party_id = PartyId::new();
        self.dispatcher.dispatch::<Party>(
            party_id.into(),
            streams::PARTY,
            PartyCommand::RegisterParty(RegisterParty {
                party_id,
                kind,
                name: name.into(),
                contact,
                occurred_at: Utc::now(),
            }),
            |_| Party::empty(party_id),
        )?;
        self.pump();

        Ok(party_id)
    }

    pub fn update_party_contact(
        &self,
        role: Role,
        party_id: PartyId,
        contact: ContactInfo,
    ) -> Result<(), OperationError> {
        authorize(role, &permissions::PARTIES_REGISTER)?;

        self.dispatcher.dispatch::<Party>(
            party_id.into(),
            streams::PARTY,
            PartyCommand::UpdateContact(UpdateContact {
                party_id,
                contact,
                occurred_at: Utc::now(),
            }),
            |_| Party::empty(party_id),
        )?;
        self.pump();

        Ok(())
    }

    // ----- intake and sorting -----

    pub fn receive_unsorted_lot(
        &self,
        role: Role,
        supplier_id: PartyId,
        quantity: u32,
        received_date: NaiveDate,
        notes: Option<String>,
    ) -> Result<UnsortedLotId, OperationError> {
        authorize(role, &permissions::STOCK_RECEIVE)?;

        let lot_id = UnsortedLotId::new();
        self.dispatcher.dispatch::<UnsortedLot>(
            lot_id.into(),
            streams::UNSORTED_LOT,
            UnsortedLotCommand::ReceiveLot(ReceiveLot {
                lot_id,
                supplier_id,
                quantity,
                received_date,
                notes,
                occurred_at: Utc::now(),
            }),
            |_| UnsortedLot::empty(lot_id),
        )?;
        self.pump();

        Ok(lot_id)
    }

    pub fn amend_lot_notes(
        &self,
        role: Role,
        lot_id: UnsortedLotId,
        notes: Option<String>,
    ) -> Result<(), OperationError> {
        authorize(role, &permissions::STOCK_RECEIVE)?;

        self.dispatcher.dispatch::<UnsortedLot>(
            lot_id.into(),
            streams::UNSORTED_LOT,
            UnsortedLotCommand::AmendNotes(AmendNotes {
                lot_id,
                notes,
                occurred_at: Utc::now(),
            }),
            |_| UnsortedLot::empty(lot_id),
        )?;
        self.pump();

        Ok(())
    }

    /// Apply one sorting decision to an unsorted lot.
    ///
    /// Sorting more than the lot's remaining quantity fails with
    /// `NoStockAvailable`. A committed sort opens the sorted lot's own
    /// stream, which later serializes treatment consumption; sorting into
    /// the rejected category additionally opens a collection record for the
    /// supplier. Those follow-up appends go to their own streams, and if
    /// one fails after the sort committed the operation surfaces
    /// `Consistency`.
    pub fn sort_stock(
        &self,
        role: Role,
        input: SortStockInput,
    ) -> Result<SortOutcome, OperationError> {
        authorize(role, &permissions::STOCK_SORT)?;

        let sorted_lot_id = SortedLotId::new();
        let committed = self.dispatcher.dispatch::<UnsortedLot>(
            input.lot_id.into(),
            streams::UNSORTED_LOT,
            UnsortedLotCommand::SortStock(SortStock {
                lot_id: input.lot_id,
                sorted_lot_id,
                category: input.category,
                size: input.size,
                length_value: input.length_value,
                diameter_mm: input.diameter_mm,
                quantity: input.quantity,
                sorting_date: input.sorting_date,
                notes: input.notes,
                occurred_at: Utc::now(),
            }),
            |_| UnsortedLot::empty(input.lot_id),
        )?;
        self.pump();

        let established = self.dispatcher.dispatch::<SortedLot>(
            sorted_lot_id.into(),
            streams::SORTED_LOT,
            SortedLotCommand::EstablishSortedLot(EstablishSortedLot {
                sorted_lot_id,
                category: input.category,
                quantity: input.quantity,
                occurred_at: Utc::now(),
            }),
            |_| SortedLot::empty(sorted_lot_id),
        );
        if let Err(e) = established {
            tracing::error!(
                lot_id = %input.lot_id,
                %sorted_lot_id,
                error = ?e,
                "sort committed but sorted lot stream append failed"
            );
            return Err(OperationError::Consistency(format!(
                "sorted lot {sorted_lot_id} committed without its own stream: {e:?}"
            )));
        }
        self.pump();

        let mut reject_record_id = None;
        if input.category == PoleCategory::Rejected {
            let supplier_id = sorted_event_supplier(&committed)?;
            let record_id = RejectRecordId::new();

            let recorded = self.dispatcher.dispatch::<RejectedPoleRecord>(
                record_id.into(),
                streams::REJECTS,
                RejectCommand::RecordRejects(RecordRejects {
                    record_id,
                    sorted_lot_id,
                    supplier_id,
                    quantity: input.quantity,
                    sorting_date: input.sorting_date,
                    occurred_at: Utc::now(),
                }),
                |_| RejectedPoleRecord::empty(record_id),
            );
            if let Err(e) = recorded {
                tracing::error!(
                    lot_id = %input.lot_id,
                    %sorted_lot_id,
                    error = ?e,
                    "sort committed but reject record append failed"
                );
                return Err(OperationError::Consistency(format!(
                    "sorted lot {sorted_lot_id} committed without its reject record: {e:?}"
                )));
            }
            reject_record_id = Some(record_id);
            self.pump();
        }

        let sorted_lot = self
            .sorted
            .get(&sorted_lot_id)
            .ok_or_else(|| OperationError::Ledger("sorted lot not visible after append".into()))?;

        Ok(SortOutcome {
            sorted_lot,
            reject_record_id,
        })
    }

    // ----- treatment -----

    /// Record one cylinder run.
    ///
    /// Company-owned runs consume from a sorted lot through the lot's own
    /// stream, so two concurrent runs serialize on its optimistic append
    /// and the loser re-checks against committed consumption; a shortage
    /// fails with `NoStockAvailable` and rejected lots cannot be treated at
    /// all. Client-owned runs carry no lot reference and credit the
    /// client's treated balance per size class.
    pub fn record_treatment(
        &self,
        role: Role,
        input: TreatmentInput,
    ) -> Result<TreatmentBatchView, OperationError> {
        authorize(role, &permissions::TREATMENT_RECORD)?;

        let ownership = match &input.stock {
            TreatmentStock::CompanyOwned {
                sorted_lot_id,
                quantity_consumed,
            } => StockOwnership::CompanyOwned {
                sorted_lot_id: *sorted_lot_id,
                quantity_consumed: *quantity_consumed,
            },
            TreatmentStock::ClientOwned { credits } => {
                validate_credits(credits, input.pole_counts.total())?;
                StockOwnership::ClientOwned
            }
        };

        let batch_id = TreatmentBatchId::new();
        let record = RecordTreatment {
            batch_id,
            treatment_date: input.treatment_date,
            cylinder: input.cylinder.clone(),
            client_id: input.client_id,
            chemical: input.chemical.clone(),
            chemical_strength_pct: input.chemical_strength_pct,
            water_added_liters: input.water_added_liters,
            kegs_added: input.kegs_added,
            kegs_remaining: input.kegs_remaining,
            pole_counts: input.pole_counts,
            ownership,
            occurred_at: Utc::now(),
        };

        // Decide the batch before touching any stream; a run the domain
        // would reject must never consume stock.
        TreatmentBatch::empty(batch_id)
            .handle(&TreatmentCommand::RecordTreatment(record.clone()))
            .map_err(DispatchError::from)?;

        if let Some((sorted_lot_id, quantity)) = ownership.consumption() {
            self.dispatch_with_retry(|| {
                self.dispatcher.dispatch::<SortedLot>(
                    sorted_lot_id.into(),
                    streams::SORTED_LOT,
                    SortedLotCommand::ConsumeSortedStock(ConsumeSortedStock {
                        sorted_lot_id,
                        batch_id,
                        quantity,
                        occurred_at: Utc::now(),
                    }),
                    |_| SortedLot::empty(sorted_lot_id),
                )
            })?;
        }

        let recorded = self.dispatcher.dispatch::<TreatmentBatch>(
            batch_id.into(),
            streams::TREATMENT_BATCH,
            TreatmentCommand::RecordTreatment(record),
            |_| TreatmentBatch::empty(batch_id),
        );
        if let Err(e) = recorded {
            tracing::error!(
                %batch_id,
                client_id = %input.client_id,
                error = ?e,
                "stock consumed but treatment batch append failed"
            );
            return Err(OperationError::Consistency(format!(
                "stock consumed for batch {batch_id} but the batch append failed: {e:?}"
            )));
        }
        self.pump();

        // Client-owned runs credit the treated balance per size class; the
        // batch is already committed, so a failed credit is partial
        // application and must be reconciled.
        if let TreatmentStock::ClientOwned { credits } = &input.stock {
            for (size, quantity) in credits {
                let credited = self.adjust_with_retry(
                    input.client_id,
                    BalanceCommand::AdjustBalance(AdjustBalance {
                        client_id: input.client_id,
                        size: *size,
                        bucket: StockBucket::Treated,
                        delta: i64::from(*quantity),
                        occurred_at: Utc::now(),
                    }),
                );
                if let Err(e) = credited {
                    tracing::error!(
                        %batch_id,
                        client_id = %input.client_id,
                        size = %size,
                        error = ?e,
                        "treatment committed but client credit append failed"
                    );
                    return Err(OperationError::Consistency(format!(
                        "batch {batch_id} committed but crediting {quantity} x {size} failed: {e:?}"
                    )));
                }
            }
            self.pump();
        }

        Ok(TreatmentBatchView {
            batch_id,
            treatment_date: input.treatment_date,
            cylinder: input.cylinder,
            client_id: input.client_id,
            pole_counts: input.pole_counts,
            ownership,
        })
    }

    // ----- client stock ledger -----

    pub fn adjust_client_balance(
        &self,
        role: Role,
        client_id: PartyId,
        size: SizeClass,
        bucket: StockBucket,
        delta: i64,
    ) -> Result<ClientBalanceReadModel, OperationError> {
        authorize(role, &permissions::BALANCES_ADJUST)?;

        self.adjust_with_retry(
            client_id,
            BalanceCommand::AdjustBalance(AdjustBalance {
                client_id,
                size,
                bucket,
                delta,
                occurred_at: Utc::now(),
            }),
        )?;
        self.pump();

        Ok(self.balances.get(client_id))
    }

    pub fn record_manual_stock_entry(
        &self,
        role: Role,
        client_id: PartyId,
        size: SizeClass,
        quantity: u32,
        notes: Option<String>,
    ) -> Result<ClientBalanceReadModel, OperationError> {
        authorize(role, &permissions::BALANCES_ADJUST)?;

        self.adjust_with_retry(
            client_id,
            BalanceCommand::RecordManualEntry(RecordManualEntry {
                client_id,
                size,
                quantity,
                notes,
                occurred_at: Utc::now(),
            }),
        )?;
        self.pump();

        Ok(self.balances.get(client_id))
    }

    /// Move treated stock out of the yard: debit treated, credit delivered.
    ///
    /// One command on the client's stream decides both deltas, and the
    /// batch append commits them together; the debit enforces
    /// non-negativity, so a delivery can never exceed the treated balance
    /// and can never be half applied.
    pub fn record_delivery(
        &self,
        role: Role,
        client_id: PartyId,
        size: SizeClass,
        quantity: u32,
    ) -> Result<ClientBalanceReadModel, OperationError> {
        authorize(role, &permissions::DELIVERY_RECORD)?;

        self.adjust_with_retry(
            client_id,
            BalanceCommand::RecordDelivery(RecordDelivery {
                client_id,
                size,
                quantity,
                occurred_at: Utc::now(),
            }),
        )?;
        self.pump();

        Ok(self.balances.get(client_id))
    }

    pub fn client_stock_summary(
        &self,
        role: Role,
        client_id: PartyId,
    ) -> Result<ClientBalanceReadModel, OperationError> {
        authorize(role, &permissions::BALANCES_READ)?;
        self.pump();
        Ok(self.balances.get(client_id))
    }

    // ----- rejected poles -----

    pub fn mark_rejected_poles_collected(
        &self,
        role: Role,
        record_id: RejectRecordId,
        delivery_note_number: impl Into<String>,
    ) -> Result<RejectedPoleView, OperationError> {
        authorize(role, &permissions::REJECTS_COLLECT)?;

        let now = Utc::now();
        self.dispatcher.dispatch::<RejectedPoleRecord>(
            record_id.into(),
            streams::REJECTS,
            RejectCommand::MarkCollected(MarkCollected {
                record_id,
                delivery_note_number: delivery_note_number.into(),
                collected_at: now,
                occurred_at: now,
            }),
            |_| RejectedPoleRecord::empty(record_id),
        )?;
        self.pump();

        self.rejects
            .get(&record_id)
            .map(RejectedPoleView::from)
            .ok_or(OperationError::NotFound)
    }

    /// Uncollected reject records, most recent sorting date first, with the
    /// supplier's name and contact joined in for the pickup chase.
    pub fn list_pending_rejected_poles(
        &self,
        role: Role,
    ) -> Result<Vec<PendingReject>, OperationError> {
        authorize(role, &permissions::REJECTS_READ)?;
        self.pump();

        Ok(self
            .rejects
            .pending()
            .into_iter()
            .map(|record| {
                let supplier = self.parties.get(&record.supplier_id);
                PendingReject {
                    record,
                    supplier_name: supplier.as_ref().map(|p| p.name.clone()),
                    supplier_contact: supplier.map(|p| p.contact),
                }
            })
            .collect())
    }

    // ----- lot queries -----

    pub fn unsorted_lot(
        &self,
        role: Role,
        lot_id: UnsortedLotId,
    ) -> Result<UnsortedLotReadModel, OperationError> {
        authorize(role, &permissions::STOCK_READ)?;
        self.pump();
        self.lots.get(&lot_id).ok_or(OperationError::NotFound)
    }

    pub fn list_unsorted_lots(&self, role: Role) -> Result<Vec<UnsortedLotReadModel>, OperationError> {
        authorize(role, &permissions::STOCK_READ)?;
        self.pump();
        Ok(self.lots.list())
    }

    pub fn sorted_lot(
        &self,
        role: Role,
        sorted_lot_id: SortedLotId,
    ) -> Result<SortedLotReadModel, OperationError> {
        authorize(role, &permissions::STOCK_READ)?;
        self.pump();
        self.sorted.get(&sorted_lot_id).ok_or(OperationError::NotFound)
    }

    pub fn list_sorted_lots(&self, role: Role) -> Result<Vec<SortedLotReadModel>, OperationError> {
        authorize(role, &permissions::STOCK_READ)?;
        self.pump();
        Ok(self.sorted.list())
    }

    // ----- internals -----

    /// Re-dispatch on optimistic concurrency failures, up to the retry
    /// bound; every retry reloads the stream so the domain re-checks
    /// against the committed history.
    fn dispatch_with_retry(
        &self,
        mut attempt: impl FnMut() -> Result<Vec<StoredEvent>, DispatchError>,
    ) -> Result<(), OperationError> {
        let mut attempts = 0;
        loop {
            match attempt() {
                Ok(_) => return Ok(()),
                Err(DispatchError::Concurrency(msg)) => {
                    attempts += 1;
                    if attempts >= MAX_APPEND_RETRIES {
                        return Err(OperationError::Conflict(msg));
                    }
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn adjust_with_retry(
        &self,
        client_id: PartyId,
        command: BalanceCommand,
    ) -> Result<(), OperationError> {
        self.dispatch_with_retry(|| {
            self.dispatcher.dispatch::<ClientStockBalance>(
                client_id.into(),
                streams::CLIENT_BALANCE,
                command.clone(),
                |_| ClientStockBalance::empty(client_id),
            )
        })
    }

    /// Drain published envelopes into the read models.
    ///
    /// Projections are idempotent and tolerate out-of-order arrival across
    /// streams, so any thread may drain on behalf of all of them.
    fn pump(&self) {
        let subscription = self
            .subscription
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        while let Ok(envelope) = subscription.try_recv() {
            self.route(&envelope);
        }
    }

    fn route(&self, envelope: &EventEnvelope<JsonValue>) {
        let applied = match envelope.aggregate_type() {
            streams::PARTY => self.parties.apply_envelope(envelope),
            streams::UNSORTED_LOT => self
                .lots
                .apply_envelope(envelope)
                .and_then(|_| self.sorted.apply_envelope(envelope)),
            streams::SORTED_LOT => self.sorted.apply_envelope(envelope),
            streams::REJECTS => self.rejects.apply_envelope(envelope),
            streams::CLIENT_BALANCE => self.balances.apply_envelope(envelope),
            _ => Ok(()),
        };

        if let Err(e) = applied {
            tracing::warn!(
                aggregate_type = envelope.aggregate_type(),
                aggregate_id = %envelope.aggregate_id(),
                sequence_number = envelope.sequence_number(),
                error = %e,
                "projection apply failed"
            );
        }
    }
}

fn sorted_event_supplier(committed: &[StoredEvent]) -> Result<PartyId, OperationError> {
    for stored in committed {
        let event: StockEvent = serde_json::from_value(stored.payload.clone())
            .map_err(|e| OperationError::Ledger(e.to_string()))?;
        if let StockEvent::StockSorted(e) = event {
            return Ok(e.supplier_id);
        }
    }
    Err(OperationError::Ledger(
        "sort dispatch committed no sorted event".to_string(),
    ))
}

fn validate_credits(credits: &[(SizeClass, u32)], pole_total: u64) -> Result<(), OperationError> {
    if credits.is_empty() {
        return Err(OperationError::Validation(
            "client-owned treatment must credit at least one size class".to_string(),
        ));
    }
    // Summed wide so caller-supplied counts cannot wrap into a spurious
    // match against the batch total.
    let mut total: u64 = 0;
    for (size, quantity) in credits {
        if *quantity == 0 {
            return Err(OperationError::Validation(format!(
                "credit for {size} must be positive"
            )));
        }
        total += u64::from(*quantity);
    }
    if total != pole_total {
        return Err(OperationError::Validation(format!(
            "credits total {total} but the batch contains {pole_total} poles"
        )));
    }
    Ok(())
}
