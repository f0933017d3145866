use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use poleyard_core::{Aggregate, AggregateRoot, DomainError, PartyId, RejectRecordId, SortedLotId};
use poleyard_events::Event;

/// Aggregate root: RejectedPoleRecord.
///
/// Tracks a rejected lot awaiting physical collection by its supplier.
/// One transition only: recorded → collected. Collection is terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedPoleRecord {
    id: RejectRecordId,
    sorted_lot_id: Option<SortedLotId>,
    supplier_id: Option<PartyId>,
    quantity: u32,
    sorting_date: Option<NaiveDate>,
    collected_at: Option<DateTime<Utc>>,
    delivery_note_number: Option<String>,
    version: u64,
    recorded: bool,
}

impl RejectedPoleRecord {
    /// Create an empty, not-yet-recorded aggregate instance for rehydration.
    pub fn empty(id: RejectRecordId) -> Self {
        Self {
            id,
            sorted_lot_id: None,
            supplier_id: None,
            quantity: 0,
            sorting_date: None,
            collected_at: None,
            delivery_note_number: None,
            version: 0,
            recorded: false,
        }
    }

    pub fn id_typed(&self) -> RejectRecordId {
        self.id
    }

    pub fn supplier_id(&self) -> Option<PartyId> {
        self.supplier_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn is_collected(&self) -> bool {
        self.collected_at.is_some()
    }

    pub fn collected_at(&self) -> Option<DateTime<Utc>> {
        self.collected_at
    }

    pub fn delivery_note_number(&self) -> Option<&str> {
        self.delivery_note_number.as_deref()
    }
}

impl AggregateRoot for RejectedPoleRecord {
    type Id = RejectRecordId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordRejects (issued by the sort operation, never a hidden
/// storage side effect).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordRejects {
    pub record_id: RejectRecordId,
    pub sorted_lot_id: SortedLotId,
    pub supplier_id: PartyId,
    pub quantity: u32,
    pub sorting_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: MarkCollected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkCollected {
    pub record_id: RejectRecordId,
    pub delivery_note_number: String,
    pub collected_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectCommand {
    RecordRejects(RecordRejects),
    MarkCollected(MarkCollected),
}

/// Event: RejectsRecorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectsRecorded {
    pub record_id: RejectRecordId,
    pub sorted_lot_id: SortedLotId,
    pub supplier_id: PartyId,
    pub quantity: u32,
    pub sorting_date: NaiveDate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RejectsCollected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectsCollected {
    pub record_id: RejectRecordId,
    pub delivery_note_number: String,
    pub collected_at: DateTime<Utc>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RejectEvent {
    RejectsRecorded(RejectsRecorded),
    RejectsCollected(RejectsCollected),
}

impl Event for RejectEvent {
    fn event_type(&self) -> &'static str {
        match self {
            RejectEvent::RejectsRecorded(_) => "stock.rejects.recorded",
            RejectEvent::RejectsCollected(_) => "stock.rejects.collected",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            RejectEvent::RejectsRecorded(e) => e.occurred_at,
            RejectEvent::RejectsCollected(e) => e.occurred_at,
        }
    }
}

impl Aggregate for RejectedPoleRecord {
    type Command = RejectCommand;
    type Event = RejectEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            RejectEvent::RejectsRecorded(e) => {
                self.id = e.record_id;
                self.sorted_lot_id = Some(e.sorted_lot_id);
                self.supplier_id = Some(e.supplier_id);
                self.quantity = e.quantity;
                self.sorting_date = Some(e.sorting_date);
                self.recorded = true;
            }
            RejectEvent::RejectsCollected(e) => {
                self.collected_at = Some(e.collected_at);
                self.delivery_note_number = Some(e.delivery_note_number.clone());
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            RejectCommand::RecordRejects(cmd) => {
                if self.recorded {
                    return Err(DomainError::conflict("reject record already exists"));
                }
                if cmd.quantity == 0 {
                    return Err(DomainError::validation("quantity must be positive"));
                }
                Ok(vec![RejectEvent::RejectsRecorded(RejectsRecorded {
                    record_id: cmd.record_id,
                    sorted_lot_id: cmd.sorted_lot_id,
                    supplier_id: cmd.supplier_id,
                    quantity: cmd.quantity,
                    sorting_date: cmd.sorting_date,
                    occurred_at: cmd.occurred_at,
                })])
            }
            RejectCommand::MarkCollected(cmd) => {
                if !self.recorded {
                    return Err(DomainError::not_found());
                }
                if self.is_collected() {
                    // Terminal state. A second collection attempt is an
                    // explicit error rather than a silent success.
                    return Err(DomainError::AlreadyCollected);
                }
                if cmd.delivery_note_number.trim().is_empty() {
                    return Err(DomainError::validation(
                        "delivery note number must be set before collection",
                    ));
                }
                Ok(vec![RejectEvent::RejectsCollected(RejectsCollected {
                    record_id: cmd.record_id,
                    delivery_note_number: cmd.delivery_note_number.clone(),
                    collected_at: cmd.collected_at,
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}
