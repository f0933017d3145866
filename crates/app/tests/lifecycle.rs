//! End-to-end lifecycle tests through the operation surface: intake,
//! sorting, treatment, balances, rejects and deliveries against a fully
//! in-memory ledger.

use std::sync::Arc;

use chrono::NaiveDate;

use poleyard_app::{
    OperationError, SortStockInput, TreatmentInput, TreatmentStock, YardService,
};
use poleyard_auth::Role;
use poleyard_clientstock::{SizeClass, StockBucket};
use poleyard_core::{PartyId, UnsortedLotId};
use poleyard_parties::{ContactInfo, PartyKind};
use poleyard_stock::{LengthUnit, PoleCategory, PoleSize};
use poleyard_treatment::PoleCounts;

const MD: Role = Role::ManagingDirector;
const STOCK: Role = Role::StockManager;
const PRODUCTION: Role = Role::ProductionManager;
const ACCOUNTANT: Role = Role::Accountant;

fn service() -> YardService {
    poleyard_observability::init();
    YardService::in_memory()
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn supplier(svc: &YardService) -> PartyId {
    svc.register_party(
        STOCK,
        PartyKind::Supplier,
        "Highlands Timber",
        ContactInfo {
            contact_person: Some("T. Moyo".to_string()),
            phone: Some("0771 000 000".to_string()),
            address: None,
        },
    )
    .unwrap()
}

fn client(svc: &YardService) -> PartyId {
    svc.register_party(STOCK, PartyKind::Client, "ZETDC", ContactInfo::default())
        .unwrap()
}

fn received_lot(svc: &YardService, quantity: u32) -> (UnsortedLotId, PartyId) {
    let supplier_id = supplier(svc);
    let lot_id = svc
        .receive_unsorted_lot(STOCK, supplier_id, quantity, date(2024, 3, 11), None)
        .unwrap();
    (lot_id, supplier_id)
}

fn telecom_sort(lot_id: UnsortedLotId, quantity: u32) -> SortStockInput {
    SortStockInput {
        lot_id,
        category: PoleCategory::Telecom,
        size: Some(PoleSize::Medium),
        length_value: Some(9.0),
        diameter_mm: Some(180),
        quantity,
        sorting_date: date(2024, 3, 12),
        notes: None,
    }
}

fn rejected_sort(lot_id: UnsortedLotId, quantity: u32, sorting_date: NaiveDate) -> SortStockInput {
    SortStockInput {
        lot_id,
        category: PoleCategory::Rejected,
        size: None,
        length_value: None,
        diameter_mm: None,
        quantity,
        sorting_date,
        notes: None,
    }
}

fn treatment(client_id: PartyId, pole_counts: PoleCounts, stock: TreatmentStock) -> TreatmentInput {
    TreatmentInput {
        treatment_date: date(2024, 3, 20),
        cylinder: "Cylinder 1".to_string(),
        client_id,
        chemical: "CCA".to_string(),
        chemical_strength_pct: 60.0,
        water_added_liters: 4_000.0,
        kegs_added: 3,
        kegs_remaining: 7,
        pole_counts,
        stock,
    }
}

#[test]
fn telecom_sort_derives_meters_and_creates_no_reject_record() {
    let svc = service();
    let (lot_id, _) = received_lot(&svc, 120);

    let outcome = svc.sort_stock(PRODUCTION, telecom_sort(lot_id, 50)).unwrap();

    let attrs = &outcome.sorted_lot.attributes;
    assert_eq!(attrs.length_unit(), Some(LengthUnit::Meters));
    assert_eq!(attrs.diameter_mm(), Some(180));
    assert_eq!(outcome.sorted_lot.quantity, 50);
    assert_eq!(outcome.reject_record_id, None);
    assert!(svc.list_pending_rejected_poles(STOCK).unwrap().is_empty());

    let lot = svc.unsorted_lot(STOCK, lot_id).unwrap();
    assert_eq!(lot.remaining(), 70);
}

#[test]
fn rejected_sort_is_bare_and_opens_exactly_one_collection_record() {
    let svc = service();
    let (lot_id, supplier_id) = received_lot(&svc, 40);

    let outcome = svc
        .sort_stock(STOCK, rejected_sort(lot_id, 10, date(2024, 3, 12)))
        .unwrap();

    let attrs = &outcome.sorted_lot.attributes;
    assert!(attrs.category().is_rejected());
    assert_eq!(attrs.size(), None);
    assert_eq!(attrs.diameter_mm(), None);
    assert_eq!(attrs.length_unit(), None);

    let pending = svc.list_pending_rejected_poles(STOCK).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].record.quantity, 10);
    assert_eq!(pending[0].record.collected_at, None);
    assert_eq!(pending[0].record.supplier_id, supplier_id);
    assert_eq!(Some(pending[0].record.record_id), outcome.reject_record_id);
}

#[test]
fn over_sorting_is_rejected_with_remaining_quantity() {
    let svc = service();
    let (lot_id, _) = received_lot(&svc, 100);

    svc.sort_stock(STOCK, telecom_sort(lot_id, 60)).unwrap();

    let err = svc.sort_stock(STOCK, telecom_sort(lot_id, 41)).unwrap_err();
    match err {
        OperationError::NoStockAvailable {
            requested,
            available,
        } => {
            assert_eq!(requested, 41);
            assert_eq!(available, 40);
        }
        other => panic!("expected NoStockAvailable, got {other:?}"),
    }

    // Boundary is fine.
    svc.sort_stock(STOCK, telecom_sort(lot_id, 40)).unwrap();
    assert_eq!(svc.unsorted_lot(STOCK, lot_id).unwrap().remaining(), 0);
}

#[test]
fn client_owned_treatment_credits_treated_balance_and_touches_no_lot() {
    let svc = service();
    let (lot_id, _) = received_lot(&svc, 50);
    let outcome = svc.sort_stock(STOCK, telecom_sort(lot_id, 50)).unwrap();
    let client_id = client(&svc);

    svc.record_treatment(
        PRODUCTION,
        treatment(
            client_id,
            PoleCounts {
                telecom: 5,
                ..PoleCounts::default()
            },
            TreatmentStock::ClientOwned {
                credits: vec![(SizeClass::Telecom, 5)],
            },
        ),
    )
    .unwrap();

    let balance = svc.client_stock_summary(ACCOUNTANT, client_id).unwrap();
    assert_eq!(balance.cell(SizeClass::Telecom, StockBucket::Treated), 5);

    // Company stock is untouched by a client-owned run.
    let sorted = svc
        .sorted_lot(STOCK, outcome.sorted_lot.sorted_lot_id)
        .unwrap();
    assert_eq!(sorted.consumed, 0);
    assert_eq!(sorted.remaining(), 50);
}

#[test]
fn credits_must_total_the_batch_pole_count() {
    let svc = service();
    let client_id = client(&svc);

    let err = svc
        .record_treatment(
            PRODUCTION,
            treatment(
                client_id,
                PoleCounts {
                    telecom: 5,
                    ..PoleCounts::default()
                },
                TreatmentStock::ClientOwned {
                    credits: vec![(SizeClass::Telecom, 4)],
                },
            ),
        )
        .unwrap_err();
    assert!(matches!(err, OperationError::Validation(_)));

    let balance = svc.client_stock_summary(ACCOUNTANT, client_id).unwrap();
    assert_eq!(balance.bucket_total(StockBucket::Treated), 0);
}

#[test]
fn company_owned_treatment_fails_on_shortage_after_prior_consumption() {
    let svc = service();
    let (lot_id, _) = received_lot(&svc, 30);
    let sorted_lot_id = svc
        .sort_stock(STOCK, telecom_sort(lot_id, 30))
        .unwrap()
        .sorted_lot
        .sorted_lot_id;
    let client_id = client(&svc);

    svc.record_treatment(
        PRODUCTION,
        treatment(
            client_id,
            PoleCounts {
                telecom: 20,
                ..PoleCounts::default()
            },
            TreatmentStock::CompanyOwned {
                sorted_lot_id,
                quantity_consumed: 20,
            },
        ),
    )
    .unwrap();

    // 10 remain; consuming 15 must fail with the shortage reported.
    let err = svc
        .record_treatment(
            PRODUCTION,
            treatment(
                client_id,
                PoleCounts {
                    telecom: 15,
                    ..PoleCounts::default()
                },
                TreatmentStock::CompanyOwned {
                    sorted_lot_id,
                    quantity_consumed: 15,
                },
            ),
        )
        .unwrap_err();
    match err {
        OperationError::NoStockAvailable {
            requested,
            available,
        } => {
            assert_eq!(requested, 15);
            assert_eq!(available, 10);
        }
        other => panic!("expected NoStockAvailable, got {other:?}"),
    }

    let sorted = svc.sorted_lot(STOCK, sorted_lot_id).unwrap();
    assert_eq!(sorted.consumed, 20);
    assert_eq!(sorted.remaining(), 10);
}

#[test]
fn concurrent_treatments_never_overdraw_a_sorted_lot() {
    use std::sync::Barrier;

    // Two simultaneous runs both want the whole lot; consumption
    // serializes on the sorted lot's stream, so exactly one commits and
    // the other sees the shortage.
    for _ in 0..20 {
        let svc = Arc::new(service());
        let (lot_id, _) = received_lot(&svc, 20);
        let sorted_lot_id = svc
            .sort_stock(STOCK, telecom_sort(lot_id, 20))
            .unwrap()
            .sorted_lot
            .sorted_lot_id;
        let client_id = client(&svc);

        let barrier = Arc::new(Barrier::new(2));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let svc = Arc::clone(&svc);
                let barrier = Arc::clone(&barrier);
                std::thread::spawn(move || {
                    barrier.wait();
                    svc.record_treatment(
                        PRODUCTION,
                        treatment(
                            client_id,
                            PoleCounts {
                                telecom: 20,
                                ..PoleCounts::default()
                            },
                            TreatmentStock::CompanyOwned {
                                sorted_lot_id,
                                quantity_consumed: 20,
                            },
                        ),
                    )
                    .is_ok()
                })
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1);

        let sorted = svc.sorted_lot(STOCK, sorted_lot_id).unwrap();
        assert_eq!(sorted.consumed, 20);
        assert_eq!(sorted.remaining(), 0);
    }
}

#[test]
fn wrapping_credit_totals_do_not_pass_the_batch_check() {
    let svc = service();
    let client_id = client(&svc);

    // u32::MAX + 2 wraps to 1 in 32-bit arithmetic, which would match the
    // single-pole batch; the wide sum must still reject it.
    let err = svc
        .record_treatment(
            PRODUCTION,
            treatment(
                client_id,
                PoleCounts {
                    telecom: 1,
                    ..PoleCounts::default()
                },
                TreatmentStock::ClientOwned {
                    credits: vec![(SizeClass::Telecom, u32::MAX), (SizeClass::M9, 2)],
                },
            ),
        )
        .unwrap_err();
    assert!(matches!(err, OperationError::Validation(_)));

    let balance = svc.client_stock_summary(MD, client_id).unwrap();
    assert_eq!(balance.bucket_total(StockBucket::Treated), 0);
}

#[test]
fn rejected_stock_cannot_be_treated() {
    let svc = service();
    let (lot_id, _) = received_lot(&svc, 20);
    let sorted_lot_id = svc
        .sort_stock(STOCK, rejected_sort(lot_id, 20, date(2024, 3, 12)))
        .unwrap()
        .sorted_lot
        .sorted_lot_id;
    let client_id = client(&svc);

    let err = svc
        .record_treatment(
            PRODUCTION,
            treatment(
                client_id,
                PoleCounts {
                    telecom: 20,
                    ..PoleCounts::default()
                },
                TreatmentStock::CompanyOwned {
                    sorted_lot_id,
                    quantity_consumed: 20,
                },
            ),
        )
        .unwrap_err();
    assert!(matches!(err, OperationError::Validation(_)));
}

#[test]
fn empty_delivery_note_leaves_record_uncollected() {
    let svc = service();
    let (lot_id, _) = received_lot(&svc, 15);
    let record_id = svc
        .sort_stock(STOCK, rejected_sort(lot_id, 15, date(2024, 3, 12)))
        .unwrap()
        .reject_record_id
        .unwrap();

    let err = svc
        .mark_rejected_poles_collected(STOCK, record_id, "   ")
        .unwrap_err();
    assert!(matches!(err, OperationError::Validation(_)));

    let pending = svc.list_pending_rejected_poles(STOCK).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].record.record_id, record_id);
}

#[test]
fn second_collection_fails_with_already_collected() {
    let svc = service();
    let (lot_id, _) = received_lot(&svc, 15);
    let record_id = svc
        .sort_stock(STOCK, rejected_sort(lot_id, 15, date(2024, 3, 12)))
        .unwrap()
        .reject_record_id
        .unwrap();

    let view = svc
        .mark_rejected_poles_collected(STOCK, record_id, "DN-0042")
        .unwrap();
    assert!(view.collected_at.is_some());
    assert_eq!(view.delivery_note_number.as_deref(), Some("DN-0042"));
    assert!(svc.list_pending_rejected_poles(STOCK).unwrap().is_empty());

    let err = svc
        .mark_rejected_poles_collected(STOCK, record_id, "DN-0043")
        .unwrap_err();
    assert!(matches!(err, OperationError::AlreadyCollected));
}

#[test]
fn pending_rejects_are_ordered_and_joined_with_supplier_contact() {
    let svc = service();
    let (lot_id, _) = received_lot(&svc, 60);

    svc.sort_stock(STOCK, rejected_sort(lot_id, 10, date(2024, 3, 12)))
        .unwrap();
    svc.sort_stock(STOCK, rejected_sort(lot_id, 20, date(2024, 3, 18)))
        .unwrap();

    let pending = svc.list_pending_rejected_poles(PRODUCTION).unwrap();
    assert_eq!(pending.len(), 2);
    // Most recent sorting date first.
    assert_eq!(pending[0].record.quantity, 20);
    assert_eq!(pending[1].record.quantity, 10);

    assert_eq!(pending[0].supplier_name.as_deref(), Some("Highlands Timber"));
    let contact = pending[0].supplier_contact.as_ref().unwrap();
    assert_eq!(contact.phone.as_deref(), Some("0771 000 000"));
}

#[test]
fn delivery_moves_treated_stock_to_delivered() {
    let svc = service();
    let client_id = client(&svc);

    svc.adjust_client_balance(MD, client_id, SizeClass::M10, StockBucket::Treated, 12)
        .unwrap();

    let balance = svc
        .record_delivery(STOCK, client_id, SizeClass::M10, 7)
        .unwrap();
    assert_eq!(balance.cell(SizeClass::M10, StockBucket::Treated), 5);
    assert_eq!(balance.cell(SizeClass::M10, StockBucket::Delivered), 7);

    // Delivering more than the treated balance fails and changes nothing.
    let err = svc
        .record_delivery(STOCK, client_id, SizeClass::M10, 6)
        .unwrap_err();
    assert!(matches!(err, OperationError::Validation(_)));

    let balance = svc.client_stock_summary(MD, client_id).unwrap();
    assert_eq!(balance.cell(SizeClass::M10, StockBucket::Treated), 5);
    assert_eq!(balance.cell(SizeClass::M10, StockBucket::Delivered), 7);
}

#[test]
fn manual_entry_lands_on_the_untreated_bucket() {
    let svc = service();
    let client_id = client(&svc);

    let balance = svc
        .record_manual_stock_entry(
            ACCOUNTANT,
            client_id,
            SizeClass::M12,
            25,
            Some("client trailer drop-off".to_string()),
        )
        .unwrap();

    assert_eq!(balance.cell(SizeClass::M12, StockBucket::Untreated), 25);
}

#[test]
fn registered_client_balances_live_beside_the_party_record() {
    let svc = service();
    let client_id = client(&svc);

    // The balance stream shares the client's party id; registration and
    // contact edits must never bleed into the balance history.
    svc.adjust_client_balance(STOCK, client_id, SizeClass::M9, StockBucket::Untreated, 6)
        .unwrap();
    svc.update_party_contact(
        STOCK,
        client_id,
        ContactInfo {
            phone: Some("0772 111 111".to_string()),
            ..ContactInfo::default()
        },
    )
    .unwrap();

    let balance = svc
        .adjust_client_balance(STOCK, client_id, SizeClass::M9, StockBucket::Untreated, 4)
        .unwrap();
    assert_eq!(balance.cell(SizeClass::M9, StockBucket::Untreated), 10);
}

#[test]
fn balance_cells_never_go_negative_through_the_surface() {
    let svc = service();
    let client_id = client(&svc);

    svc.adjust_client_balance(STOCK, client_id, SizeClass::Telecom, StockBucket::Treated, 3)
        .unwrap();

    let err = svc
        .adjust_client_balance(STOCK, client_id, SizeClass::Telecom, StockBucket::Treated, -4)
        .unwrap_err();
    assert!(matches!(err, OperationError::Validation(_)));

    let balance = svc.client_stock_summary(STOCK, client_id).unwrap();
    assert_eq!(balance.cell(SizeClass::Telecom, StockBucket::Treated), 3);
}

#[test]
fn concurrent_increments_are_all_applied() {
    let svc = Arc::new(service());
    let client_id = client(&svc);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let svc = Arc::clone(&svc);
            std::thread::spawn(move || {
                for _ in 0..50 {
                    svc.adjust_client_balance(
                        STOCK,
                        client_id,
                        SizeClass::M11,
                        StockBucket::Untreated,
                        1,
                    )
                    .unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let balance = svc.client_stock_summary(STOCK, client_id).unwrap();
    assert_eq!(balance.cell(SizeClass::M11, StockBucket::Untreated), 400);
}

#[test]
fn roles_are_enforced_on_every_operation() {
    let svc = service();
    let (lot_id, supplier_id) = received_lot(&svc, 10);
    let client_id = client(&svc);

    // Production runs the cylinder but never touches intake or money.
    let err = svc
        .receive_unsorted_lot(PRODUCTION, supplier_id, 5, date(2024, 4, 1), None)
        .unwrap_err();
    assert!(matches!(err, OperationError::Forbidden(_)));

    let err = svc
        .adjust_client_balance(
            PRODUCTION,
            client_id,
            SizeClass::Telecom,
            StockBucket::Treated,
            1,
        )
        .unwrap_err();
    assert!(matches!(err, OperationError::Forbidden(_)));

    // The accountant never sorts or treats.
    let err = svc.sort_stock(ACCOUNTANT, telecom_sort(lot_id, 5)).unwrap_err();
    assert!(matches!(err, OperationError::Forbidden(_)));

    let err = svc
        .record_treatment(
            ACCOUNTANT,
            treatment(
                client_id,
                PoleCounts {
                    telecom: 1,
                    ..PoleCounts::default()
                },
                TreatmentStock::ClientOwned {
                    credits: vec![(SizeClass::Telecom, 1)],
                },
            ),
        )
        .unwrap_err();
    assert!(matches!(err, OperationError::Forbidden(_)));

    // Denied operations leave no trace.
    assert_eq!(svc.unsorted_lot(MD, lot_id).unwrap().remaining(), 10);
    assert_eq!(
        svc.client_stock_summary(MD, client_id)
            .unwrap()
            .bucket_total(StockBucket::Treated),
        0
    );
}

#[test]
fn amended_notes_show_up_in_the_lot_directory() {
    let svc = service();
    let (lot_id, _) = received_lot(&svc, 10);

    svc.amend_lot_notes(STOCK, lot_id, Some("restacked after rain".to_string()))
        .unwrap();

    let lot = svc.unsorted_lot(STOCK, lot_id).unwrap();
    assert_eq!(lot.notes.as_deref(), Some("restacked after rain"));
}
