use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use poleyard_core::{
    Aggregate, AggregateRoot, DomainError, PartyId, SortedLotId, TreatmentBatchId, ValueObject,
};
use poleyard_events::Event;

/// Batch composition by pole category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoleCounts {
    pub fencing: u32,
    pub telecom: u32,
    pub distribution: u32,
    pub high_voltage: u32,
}

impl PoleCounts {
    /// Total poles in the batch. Widened so the sum of four u32 counts can
    /// never overflow.
    pub fn total(&self) -> u64 {
        u64::from(self.fencing)
            + u64::from(self.telecom)
            + u64::from(self.distribution)
            + u64::from(self.high_voltage)
    }
}

impl ValueObject for PoleCounts {}

/// Who owns the poles going into the cylinder.
///
/// Company-owned runs consume from a sorted lot; client-owned runs treat
/// poles that never entered company inventory and therefore reference no
/// lot at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StockOwnership {
    CompanyOwned {
        sorted_lot_id: SortedLotId,
        quantity_consumed: u32,
    },
    ClientOwned,
}

impl StockOwnership {
    pub fn is_client_owned(&self) -> bool {
        matches!(self, StockOwnership::ClientOwned)
    }

    /// Lot consumption, if any: `(lot, quantity)`.
    pub fn consumption(&self) -> Option<(SortedLotId, u32)> {
        match self {
            StockOwnership::CompanyOwned {
                sorted_lot_id,
                quantity_consumed,
            } => Some((*sorted_lot_id, *quantity_consumed)),
            StockOwnership::ClientOwned => None,
        }
    }
}

/// Aggregate root: TreatmentBatch.
///
/// Immutable after creation; there is no amendment workflow for a run that
/// has already happened in the cylinder.
#[derive(Debug, Clone, PartialEq)]
pub struct TreatmentBatch {
    id: TreatmentBatchId,
    treatment_date: Option<NaiveDate>,
    cylinder: String,
    client_id: Option<PartyId>,
    chemical: String,
    chemical_strength_pct: f64,
    water_added_liters: f64,
    kegs_added: u32,
    kegs_remaining: u32,
    pole_counts: PoleCounts,
    ownership: Option<StockOwnership>,
    version: u64,
    recorded: bool,
}

impl TreatmentBatch {
    /// Create an empty, not-yet-recorded aggregate instance for rehydration.
    pub fn empty(id: TreatmentBatchId) -> Self {
        Self {
            id,
            treatment_date: None,
            cylinder: String::new(),
            client_id: None,
            chemical: String::new(),
            chemical_strength_pct: 0.0,
            water_added_liters: 0.0,
            kegs_added: 0,
            kegs_remaining: 0,
            pole_counts: PoleCounts::default(),
            ownership: None,
            version: 0,
            recorded: false,
        }
    }

    pub fn id_typed(&self) -> TreatmentBatchId {
        self.id
    }

    pub fn client_id(&self) -> Option<PartyId> {
        self.client_id
    }

    pub fn pole_counts(&self) -> PoleCounts {
        self.pole_counts
    }

    pub fn ownership(&self) -> Option<StockOwnership> {
        self.ownership
    }

    pub fn is_recorded(&self) -> bool {
        self.recorded
    }
}

impl AggregateRoot for TreatmentBatch {
    type Id = TreatmentBatchId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: RecordTreatment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordTreatment {
    pub batch_id: TreatmentBatchId,
    pub treatment_date: NaiveDate,
    pub cylinder: String,
    pub client_id: PartyId,
    pub chemical: String,
    pub chemical_strength_pct: f64,
    pub water_added_liters: f64,
    pub kegs_added: u32,
    pub kegs_remaining: u32,
    pub pole_counts: PoleCounts,
    pub ownership: StockOwnership,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreatmentCommand {
    RecordTreatment(RecordTreatment),
}

/// Event: TreatmentRecorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreatmentRecorded {
    pub batch_id: TreatmentBatchId,
    pub treatment_date: NaiveDate,
    pub cylinder: String,
    pub client_id: PartyId,
    pub chemical: String,
    pub chemical_strength_pct: f64,
    pub water_added_liters: f64,
    pub kegs_added: u32,
    pub kegs_remaining: u32,
    pub pole_counts: PoleCounts,
    pub ownership: StockOwnership,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TreatmentEvent {
    TreatmentRecorded(TreatmentRecorded),
}

impl Event for TreatmentEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TreatmentEvent::TreatmentRecorded(_) => "treatment.batch.recorded",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            TreatmentEvent::TreatmentRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for TreatmentBatch {
    type Command = TreatmentCommand;
    type Event = TreatmentEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            TreatmentEvent::TreatmentRecorded(e) => {
                self.id = e.batch_id;
                self.treatment_date = Some(e.treatment_date);
                self.cylinder = e.cylinder.clone();
                self.client_id = Some(e.client_id);
                self.chemical = e.chemical.clone();
                self.chemical_strength_pct = e.chemical_strength_pct;
                self.water_added_liters = e.water_added_liters;
                self.kegs_added = e.kegs_added;
                self.kegs_remaining = e.kegs_remaining;
                self.pole_counts = e.pole_counts;
                self.ownership = Some(e.ownership);
                self.recorded = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        let TreatmentCommand::RecordTreatment(cmd) = command;

        if self.recorded {
            return Err(DomainError::conflict("treatment batch already recorded"));
        }
        if cmd.chemical.trim().is_empty() {
            return Err(DomainError::validation("chemical cannot be empty"));
        }
        if !(0.0..=100.0).contains(&cmd.chemical_strength_pct) {
            return Err(DomainError::validation(format!(
                "chemical strength must be within [0, 100] %, got {}",
                cmd.chemical_strength_pct
            )));
        }
        if cmd.pole_counts.total() == 0 {
            return Err(DomainError::validation(
                "a treatment batch must contain at least one pole",
            ));
        }
        if let StockOwnership::CompanyOwned {
            quantity_consumed, ..
        } = cmd.ownership
        {
            if quantity_consumed == 0 {
                return Err(DomainError::validation(
                    "company-owned treatment must consume a positive quantity",
                ));
            }
        }

        Ok(vec![TreatmentEvent::TreatmentRecorded(TreatmentRecorded {
            batch_id: cmd.batch_id,
            treatment_date: cmd.treatment_date,
            cylinder: cmd.cylinder.clone(),
            client_id: cmd.client_id,
            chemical: cmd.chemical.clone(),
            chemical_strength_pct: cmd.chemical_strength_pct,
            water_added_liters: cmd.water_added_liters,
            kegs_added: cmd.kegs_added,
            kegs_remaining: cmd.kegs_remaining,
            pole_counts: cmd.pole_counts,
            ownership: cmd.ownership,
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
        NaiveDate::from_ymd_opt(2024, 7, 2).unwrap()
    }

    fn record_cmd(ownership: StockOwnership) -> RecordTreatment {
        RecordTreatment {
            batch_id: TreatmentBatchId::new(),
            treatment_date: test_date(),
            cylinder: "Cylinder 2".to_string(),
            client_id: PartyId::new(),
            chemical: "CCA".to_string(),
            chemical_strength_pct: 60.0,
            water_added_liters: 4_000.0,
            kegs_added: 3,
            kegs_remaining: 7,
            pole_counts: PoleCounts {
                telecom: 20,
                ..PoleCounts::default()
            },
            ownership,
            occurred_at: test_time(),
        }
    }

    #[test]
    fn pole_counts_total_does_not_wrap_at_u32_bounds() {
        let counts = PoleCounts {
            fencing: u32::MAX,
            telecom: u32::MAX,
            distribution: u32::MAX,
            high_voltage: u32::MAX,
        };
        assert_eq!(counts.total(), 4 * u64::from(u32::MAX));
    }

    #[test]
    fn company_owned_batch_records_consumption() {
        let lot_id = SortedLotId::new();
        let cmd = record_cmd(StockOwnership::CompanyOwned {
            sorted_lot_id: lot_id,
            quantity_consumed: 20,
        });
        let batch = TreatmentBatch::empty(cmd.batch_id);

        let events = batch
            .handle(&TreatmentCommand::RecordTreatment(cmd))
            .unwrap();
        assert_eq!(events.len(), 1);

        let TreatmentEvent::TreatmentRecorded(e) = &events[0];
        assert_eq!(e.ownership.consumption(), Some((lot_id, 20)));
    }

    #[test]
    fn client_owned_batch_has_no_lot_reference() {
        let cmd = record_cmd(StockOwnership::ClientOwned);
        let batch = TreatmentBatch::empty(cmd.batch_id);

        let events = batch
            .handle(&TreatmentCommand::RecordTreatment(cmd))
            .unwrap();

        let TreatmentEvent::TreatmentRecorded(e) = &events[0];
        assert!(e.ownership.is_client_owned());
        assert_eq!(e.ownership.consumption(), None);
    }

    #[test]
    fn strength_outside_percent_range_is_rejected() {
        for pct in [-0.1, 100.5] {
            let mut cmd = record_cmd(StockOwnership::ClientOwned);
            cmd.chemical_strength_pct = pct;
            let batch = TreatmentBatch::empty(cmd.batch_id);

            let err = batch
                .handle(&TreatmentCommand::RecordTreatment(cmd))
                .unwrap_err();
            assert!(matches!(err, DomainError::Validation(_)), "pct {pct}");
        }
    }

    #[test]
    fn zero_consumption_is_rejected_for_company_owned() {
        let cmd = record_cmd(StockOwnership::CompanyOwned {
            sorted_lot_id: SortedLotId::new(),
            quantity_consumed: 0,
        });
        let batch = TreatmentBatch::empty(cmd.batch_id);

        let err = batch
            .handle(&TreatmentCommand::RecordTreatment(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn batch_is_immutable_once_recorded() {
        let cmd = record_cmd(StockOwnership::ClientOwned);
        let mut batch = TreatmentBatch::empty(cmd.batch_id);

        let events = batch
            .handle(&TreatmentCommand::RecordTreatment(cmd.clone()))
            .unwrap();
        batch.apply(&events[0]);

        let err = batch
            .handle(&TreatmentCommand::RecordTreatment(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::Conflict(_)));
    }
}
