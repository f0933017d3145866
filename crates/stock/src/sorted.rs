use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use poleyard_core::{Aggregate, AggregateRoot, DomainError, SortedLotId, TreatmentBatchId};
use poleyard_events::Event;

use crate::category::PoleCategory;

/// Aggregate root: SortedLot.
///
/// A categorized quantity of poles carved out of an unsorted lot. Treatment
/// consumption is a command on this aggregate so the shortage check (never
/// consume more than the lot holds) is a single-stream invariant: concurrent
/// treatments serialize on this stream's optimistic append, and the loser
/// re-checks against the winner's committed consumption.
#[derive(Debug, Clone, PartialEq)]
pub struct SortedLot {
    id: SortedLotId,
    category: Option<PoleCategory>,
    quantity: u32,
    consumed: u32,
    version: u64,
    established: bool,
}

impl SortedLot {
    pub fn empty(id: SortedLotId) -> Self {
        Self {
            id,
            category: None,
            quantity: 0,
            consumed: 0,
            version: 0,
            established: false,
        }
    }

    pub fn id_typed(&self) -> SortedLotId {
        self.id
    }

    pub fn category(&self) -> Option<PoleCategory> {
        self.category
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Poles consumed by treatment so far.
    pub fn consumed(&self) -> u32 {
        self.consumed
    }

    /// Poles still available for treatment.
    pub fn remaining(&self) -> u32 {
        self.quantity.saturating_sub(self.consumed)
    }
}

impl AggregateRoot for SortedLot {
    type Id = SortedLotId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: EstablishSortedLot (open the lot's stream after a sort).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstablishSortedLot {
    pub sorted_lot_id: SortedLotId,
    pub category: PoleCategory,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConsumeSortedStock (a company-owned treatment takes poles).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumeSortedStock {
    pub sorted_lot_id: SortedLotId,
    pub batch_id: TreatmentBatchId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SortedLotCommand {
    EstablishSortedLot(EstablishSortedLot),
    ConsumeSortedStock(ConsumeSortedStock),
}

/// Event: SortedLotEstablished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortedLotEstablished {
    pub sorted_lot_id: SortedLotId,
    pub category: PoleCategory,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

/// Event: SortedStockConsumed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortedStockConsumed {
    pub sorted_lot_id: SortedLotId,
    pub batch_id: TreatmentBatchId,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SortedLotEvent {
    SortedLotEstablished(SortedLotEstablished),
    SortedStockConsumed(SortedStockConsumed),
}

impl Event for SortedLotEvent {
    fn event_type(&self) -> &'static str {
        match self {
            SortedLotEvent::SortedLotEstablished(_) => "stock.sorted.established",
            SortedLotEvent::SortedStockConsumed(_) => "stock.sorted.consumed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            SortedLotEvent::SortedLotEstablished(e) => e.occurred_at,
            SortedLotEvent::SortedStockConsumed(e) => e.occurred_at,
        }
    }
}

impl Aggregate for SortedLot {
    type Command = SortedLotCommand;
    type Event = SortedLotEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            SortedLotEvent::SortedLotEstablished(e) => {
                self.id = e.sorted_lot_id;
                self.category = Some(e.category);
                self.quantity = e.quantity;
                self.consumed = 0;
                self.established = true;
            }
            SortedLotEvent::SortedStockConsumed(e) => {
                self.consumed += e.quantity;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            SortedLotCommand::EstablishSortedLot(cmd) => self.handle_establish(cmd),
            SortedLotCommand::ConsumeSortedStock(cmd) => self.handle_consume(cmd),
        }
    }
}

impl SortedLot {
    fn ensure_lot_id(&self, sorted_lot_id: SortedLotId) -> Result<(), DomainError> {
        if self.id != sorted_lot_id {
            return Err(DomainError::invariant("sorted_lot_id mismatch"));
        }
        Ok(())
    }

    fn handle_establish(&self, cmd: &EstablishSortedLot) -> Result<Vec<SortedLotEvent>, DomainError> {
        if self.established {
            return Err(DomainError::conflict("sorted lot already established"));
        }
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        Ok(vec![SortedLotEvent::SortedLotEstablished(
            SortedLotEstablished {
                sorted_lot_id: cmd.sorted_lot_id,
                category: cmd.category,
                quantity: cmd.quantity,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_consume(&self, cmd: &ConsumeSortedStock) -> Result<Vec<SortedLotEvent>, DomainError> {
        if !self.established {
            return Err(DomainError::not_found());
        }
        self.ensure_lot_id(cmd.sorted_lot_id)?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }
        if self.category.is_some_and(|c| c.is_rejected()) {
            return Err(DomainError::validation("rejected poles cannot be treated"));
        }

        let remaining = self.remaining();
        if cmd.quantity > remaining {
            return Err(DomainError::no_stock(cmd.quantity, remaining));
        }

        Ok(vec![SortedLotEvent::SortedStockConsumed(
            SortedStockConsumed {
                sorted_lot_id: cmd.sorted_lot_id,
                batch_id: cmd.batch_id,
                quantity: cmd.quantity,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}
