use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use poleyard_core::{Aggregate, AggregateRoot, DomainError, PartyId, SortedLotId, UnsortedLotId};
use poleyard_events::Event;

use crate::category::{PoleCategory, PoleSize, SortedAttributes};

/// Aggregate root: UnsortedLot.
///
/// A quantity of raw poles received from one supplier. Sorting decisions are
/// commands on this aggregate so the over-sorting check (never sort more
/// than was received) is a single-stream invariant: the lot's own event
/// history is the authoritative count of what has been sorted out of it.
#[derive(Debug, Clone, PartialEq)]
pub struct UnsortedLot {
    id: UnsortedLotId,
    supplier_id: Option<PartyId>,
    quantity: u32,
    sorted_total: u32,
    received_date: Option<NaiveDate>,
    notes: Option<String>,
    version: u64,
    received: bool,
}

impl UnsortedLot {
    /// Create an empty, not-yet-received aggregate instance for rehydration.
    pub fn empty(id: UnsortedLotId) -> Self {
        Self {
            id,
            supplier_id: None,
            quantity: 0,
            sorted_total: 0,
            received_date: None,
            notes: None,
            version: 0,
            received: false,
        }
    }

    pub fn id_typed(&self) -> UnsortedLotId {
        self.id
    }

    pub fn supplier_id(&self) -> Option<PartyId> {
        self.supplier_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    /// Poles sorted out of this lot so far.
    pub fn sorted_total(&self) -> u32 {
        self.sorted_total
    }

    /// Poles still awaiting sorting.
    pub fn remaining(&self) -> u32 {
        self.quantity.saturating_sub(self.sorted_total)
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }
}

impl AggregateRoot for UnsortedLot {
    type Id = UnsortedLotId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ReceiveLot (intake from a supplier).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiveLot {
    pub lot_id: UnsortedLotId,
    pub supplier_id: PartyId,
    pub quantity: u32,
    pub received_date: NaiveDate,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SortStock (categorize part of the lot).
///
/// The caller supplies raw attributes; validation against the category rules
/// happens here, and the length unit is derived from the category.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortStock {
    pub lot_id: UnsortedLotId,
    pub sorted_lot_id: SortedLotId,
    pub category: PoleCategory,
    pub size: Option<PoleSize>,
    pub length_value: Option<f64>,
    pub diameter_mm: Option<u16>,
    pub quantity: u32,
    pub sorting_date: NaiveDate,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: AmendNotes (the only mutable intake field).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AmendNotes {
    pub lot_id: UnsortedLotId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UnsortedLotCommand {
    ReceiveLot(ReceiveLot),
    SortStock(SortStock),
    AmendNotes(AmendNotes),
}

/// Event: LotReceived.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotReceived {
    pub lot_id: UnsortedLotId,
    pub supplier_id: PartyId,
    pub quantity: u32,
    pub received_date: NaiveDate,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: StockSorted.
///
/// Carries the supplier resolved transitively through the lot, so downstream
/// consumers (the reject tracker in particular) never have to join back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockSorted {
    pub lot_id: UnsortedLotId,
    pub sorted_lot_id: SortedLotId,
    pub supplier_id: PartyId,
    pub attributes: SortedAttributes,
    pub quantity: u32,
    pub sorting_date: NaiveDate,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: NotesAmended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotesAmended {
    pub lot_id: UnsortedLotId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StockEvent {
    LotReceived(LotReceived),
    StockSorted(StockSorted),
    NotesAmended(NotesAmended),
}

impl Event for StockEvent {
    fn event_type(&self) -> &'static str {
        match self {
            StockEvent::LotReceived(_) => "stock.lot.received",
            StockEvent::StockSorted(_) => "stock.lot.sorted",
            StockEvent::NotesAmended(_) => "stock.lot.notes_amended",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            StockEvent::LotReceived(e) => e.occurred_at,
            StockEvent::StockSorted(e) => e.occurred_at,
            StockEvent::NotesAmended(e) => e.occurred_at,
        }
    }
}

impl Aggregate for UnsortedLot {
    type Command = UnsortedLotCommand;
    type Event = StockEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            StockEvent::LotReceived(e) => {
                self.id = e.lot_id;
                self.supplier_id = Some(e.supplier_id);
                self.quantity = e.quantity;
                self.sorted_total = 0;
                self.received_date = Some(e.received_date);
                self.notes = e.notes.clone();
                self.received = true;
            }
            StockEvent::StockSorted(e) => {
                self.sorted_total += e.quantity;
            }
            StockEvent::NotesAmended(e) => {
                self.notes = e.notes.clone();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            UnsortedLotCommand::ReceiveLot(cmd) => self.handle_receive(cmd),
            UnsortedLotCommand::SortStock(cmd) => self.handle_sort(cmd),
            UnsortedLotCommand::AmendNotes(cmd) => self.handle_amend_notes(cmd),
        }
    }
}

impl UnsortedLot {
    fn ensure_lot_id(&self, lot_id: UnsortedLotId) -> Result<(), DomainError> {
        if self.id != lot_id {
            return Err(DomainError::invariant("lot_id mismatch"));
        }
        Ok(())
    }

    fn handle_receive(&self, cmd: &ReceiveLot) -> Result<Vec<StockEvent>, DomainError> {
        if self.received {
            return Err(DomainError::conflict("lot already received"));
        }
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        Ok(vec![StockEvent::LotReceived(LotReceived {
            lot_id: cmd.lot_id,
            supplier_id: cmd.supplier_id,
            quantity: cmd.quantity,
            received_date: cmd.received_date,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_sort(&self, cmd: &SortStock) -> Result<Vec<StockEvent>, DomainError> {
        if !self.received {
            return Err(DomainError::not_found());
        }
        self.ensure_lot_id(cmd.lot_id)?;

        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let attributes = SortedAttributes::validate(
            cmd.category,
            cmd.size,
            cmd.length_value,
            cmd.diameter_mm,
        )?;

        // Over-sorting is rejected: a lot can never yield more poles than
        // it contained.
        let remaining = self.remaining();
        if cmd.quantity > remaining {
            return Err(DomainError::no_stock(cmd.quantity, remaining));
        }

        let supplier_id = self
            .supplier_id
            .ok_or_else(|| DomainError::invariant("received lot has no supplier"))?;

        Ok(vec![StockEvent::StockSorted(StockSorted {
            lot_id: cmd.lot_id,
            sorted_lot_id: cmd.sorted_lot_id,
            supplier_id,
            attributes,
            quantity: cmd.quantity,
            sorting_date: cmd.sorting_date,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_amend_notes(&self, cmd: &AmendNotes) -> Result<Vec<StockEvent>, DomainError> {
        if !self.received {
            return Err(DomainError::not_found());
        }
        self.ensure_lot_id(cmd.lot_id)?;

        Ok(vec![StockEvent::NotesAmended(NotesAmended {
            lot_id: cmd.lot_id,
            notes: cmd.notes.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
    }

    fn received_lot(quantity: u32) -> (UnsortedLot, PartyId) {
        let lot_id = UnsortedLotId::new();
        let supplier_id = PartyId::new();
        let mut lot = UnsortedLot::empty(lot_id);

        let events = lot
            .handle(&UnsortedLotCommand::ReceiveLot(ReceiveLot {
                lot_id,
                supplier_id,
                quantity,
                received_date: test_date(),
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap();
        lot.apply(&events[0]);

        (lot, supplier_id)
    }

    fn sort_cmd(lot: &UnsortedLot, quantity: u32) -> SortStock {
        SortStock {
            lot_id: lot.id_typed(),
            sorted_lot_id: SortedLotId::new(),
            category: PoleCategory::Telecom,
            size: Some(PoleSize::Medium),
            length_value: Some(9.0),
            diameter_mm: Some(180),
            quantity,
            sorting_date: test_date(),
            notes: None,
            occurred_at: test_time(),
        }
    }

    #[test]
    fn receive_lot_emits_received_event() {
        let (lot, supplier_id) = received_lot(120);
        assert_eq!(lot.quantity(), 120);
        assert_eq!(lot.supplier_id(), Some(supplier_id));
        assert_eq!(lot.remaining(), 120);
    }

    #[test]
    fn zero_quantity_intake_is_rejected() {
        let lot_id = UnsortedLotId::new();
        let lot = UnsortedLot::empty(lot_id);

        let err = lot
            .handle(&UnsortedLotCommand::ReceiveLot(ReceiveLot {
                lot_id,
                supplier_id: PartyId::new(),
                quantity: 0,
                received_date: test_date(),
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap_err();

        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn sort_emits_sorted_event_with_derived_unit_and_supplier() {
        let (lot, supplier_id) = received_lot(50);

        let events = lot
            .handle(&UnsortedLotCommand::SortStock(sort_cmd(&lot, 50)))
            .unwrap();
        assert_eq!(events.len(), 1);

        match &events[0] {
            StockEvent::StockSorted(e) => {
                assert_eq!(e.supplier_id, supplier_id);
                assert_eq!(e.quantity, 50);
                assert_eq!(
                    e.attributes.length_unit(),
                    Some(crate::category::LengthUnit::Meters)
                );
            }
            _ => panic!("Expected StockSorted event"),
        }
    }

    #[test]
    fn sorting_an_unknown_lot_is_not_found() {
        let lot = UnsortedLot::empty(UnsortedLotId::new());
        let cmd = SortStock {
            lot_id: lot.id_typed(),
            ..sort_cmd(&lot, 10)
        };

        let err = lot.handle(&UnsortedLotCommand::SortStock(cmd)).unwrap_err();
        assert_eq!(err, DomainError::NotFound);
    }

    #[test]
    fn over_sorting_is_rejected_across_multiple_sorts() {
        let (mut lot, _) = received_lot(100);

        let events = lot
            .handle(&UnsortedLotCommand::SortStock(sort_cmd(&lot, 60)))
            .unwrap();
        lot.apply(&events[0]);
        assert_eq!(lot.remaining(), 40);

        let err = lot
            .handle(&UnsortedLotCommand::SortStock(sort_cmd(&lot, 41)))
            .unwrap_err();
        assert_eq!(
            err,
            DomainError::NoStockAvailable {
                requested: 41,
                available: 40
            }
        );

        // The boundary itself is fine.
        let events = lot
            .handle(&UnsortedLotCommand::SortStock(sort_cmd(&lot, 40)))
            .unwrap();
        lot.apply(&events[0]);
        assert_eq!(lot.remaining(), 0);
    }

    #[test]
    fn rejected_sort_carries_no_attributes() {
        let (lot, _) = received_lot(30);

        let events = lot
            .handle(&UnsortedLotCommand::SortStock(SortStock {
                lot_id: lot.id_typed(),
                sorted_lot_id: SortedLotId::new(),
                category: PoleCategory::Rejected,
                size: None,
                length_value: None,
                diameter_mm: None,
                quantity: 10,
                sorting_date: test_date(),
                notes: None,
                occurred_at: test_time(),
            }))
            .unwrap();

        match &events[0] {
            StockEvent::StockSorted(e) => {
                assert!(e.attributes.category().is_rejected());
                assert_eq!(e.attributes.size(), None);
                assert_eq!(e.attributes.diameter_mm(), None);
            }
            _ => panic!("Expected StockSorted event"),
        }
    }

    #[test]
    fn notes_are_amendable_after_receipt() {
        let (mut lot, _) = received_lot(10);

        let events = lot
            .handle(&UnsortedLotCommand::AmendNotes(AmendNotes {
                lot_id: lot.id_typed(),
                notes: Some("wet delivery, restacked".to_string()),
                occurred_at: test_time(),
            }))
            .unwrap();
        lot.apply(&events[0]);

        assert_eq!(lot.notes(), Some("wet delivery, restacked"));
    }
}
