//! Inputs and views for the operation surface.

use chrono::{DateTime, NaiveDate, Utc};

use poleyard_clientstock::SizeClass;
use poleyard_core::{PartyId, RejectRecordId, SortedLotId, TreatmentBatchId, UnsortedLotId};
use poleyard_infra::projections::{RejectReadModel, SortedLotReadModel};
use poleyard_parties::ContactInfo;
use poleyard_stock::{PoleCategory, PoleSize};
use poleyard_treatment::{PoleCounts, StockOwnership};

/// Input for one sorting decision against an unsorted lot.
///
/// Raw attributes from the yard floor; the category rules (unit derivation,
/// diameter range, rejected-lot bareness) are validated in the domain.
#[derive(Debug, Clone)]
pub struct SortStockInput {
    pub lot_id: UnsortedLotId,
    pub category: PoleCategory,
    pub size: Option<PoleSize>,
    pub length_value: Option<f64>,
    pub diameter_mm: Option<u16>,
    pub quantity: u32,
    pub sorting_date: NaiveDate,
    pub notes: Option<String>,
}

/// Result of a sorting decision.
///
/// Sorting into the rejected category additionally opens a collection
/// record; its id is carried here so callers can track the pickup.
#[derive(Debug, Clone, PartialEq)]
pub struct SortOutcome {
    pub sorted_lot: SortedLotReadModel,
    pub reject_record_id: Option<RejectRecordId>,
}

/// Where the poles in a treatment run come from.
#[derive(Debug, Clone, PartialEq)]
pub enum TreatmentStock {
    /// Consume from a company-owned sorted lot.
    CompanyOwned {
        sorted_lot_id: SortedLotId,
        quantity_consumed: u32,
    },
    /// Poles the client brought in themselves; each credit lands on the
    /// client's treated balance for that size class. Credits must total the
    /// batch's pole count.
    ClientOwned { credits: Vec<(SizeClass, u32)> },
}

/// Input for recording one cylinder run.
#[derive(Debug, Clone, PartialEq)]
pub struct TreatmentInput {
    pub treatment_date: NaiveDate,
    pub cylinder: String,
    pub client_id: PartyId,
    pub chemical: String,
    pub chemical_strength_pct: f64,
    pub water_added_liters: f64,
    pub kegs_added: u32,
    pub kegs_remaining: u32,
    pub pole_counts: PoleCounts,
    pub stock: TreatmentStock,
}

/// View of a recorded treatment batch.
#[derive(Debug, Clone, PartialEq)]
pub struct TreatmentBatchView {
    pub batch_id: TreatmentBatchId,
    pub treatment_date: NaiveDate,
    pub cylinder: String,
    pub client_id: PartyId,
    pub pole_counts: PoleCounts,
    pub ownership: StockOwnership,
}

/// A reject record awaiting collection, joined with the supplier's details
/// so the yard can chase the pickup.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingReject {
    pub record: RejectReadModel,
    pub supplier_name: Option<String>,
    pub supplier_contact: Option<ContactInfo>,
}

/// View of a collected (or still pending) reject record.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedPoleView {
    pub record_id: RejectRecordId,
    pub quantity: u32,
    pub collected_at: Option<DateTime<Utc>>,
    pub delivery_note_number: Option<String>,
}

impl From<RejectReadModel> for RejectedPoleView {
    fn from(record: RejectReadModel) -> Self {
        Self {
            record_id: record.record_id,
            quantity: record.quantity,
            collected_at: record.collected_at,
            delivery_note_number: record.delivery_note_number,
        }
    }
}
