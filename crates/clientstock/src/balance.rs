use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use poleyard_core::{Aggregate, AggregateRoot, DomainError, PartyId};
use poleyard_events::Event;

/// Size class axis of a client balance.
///
/// Telecom poles are tracked as one bucket; utility poles by length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SizeClass {
    #[serde(rename = "telecom")]
    Telecom,
    #[serde(rename = "9m")]
    M9,
    #[serde(rename = "10m")]
    M10,
    #[serde(rename = "11m")]
    M11,
    #[serde(rename = "12m")]
    M12,
    #[serde(rename = "14m")]
    M14,
    #[serde(rename = "16m")]
    M16,
}

impl SizeClass {
    pub const ALL: [SizeClass; 7] = [
        SizeClass::Telecom,
        SizeClass::M9,
        SizeClass::M10,
        SizeClass::M11,
        SizeClass::M12,
        SizeClass::M14,
        SizeClass::M16,
    ];
}

impl core::fmt::Display for SizeClass {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            SizeClass::Telecom => "telecom",
            SizeClass::M9 => "9m",
            SizeClass::M10 => "10m",
            SizeClass::M11 => "11m",
            SizeClass::M12 => "12m",
            SizeClass::M14 => "14m",
            SizeClass::M16 => "16m",
        };
        f.write_str(s)
    }
}

/// Lifecycle bucket of a client balance cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockBucket {
    Untreated,
    Treated,
    Delivered,
}

impl core::fmt::Display for StockBucket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            StockBucket::Untreated => "untreated",
            StockBucket::Treated => "treated",
            StockBucket::Delivered => "delivered",
        };
        f.write_str(s)
    }
}

/// Aggregate root: ClientStockBalance.
///
/// Keyed by the client's party id; the aggregate comes into existence with
/// its first adjustment (upsert semantics), all cells starting at zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientStockBalance {
    client_id: PartyId,
    cells: BTreeMap<(SizeClass, StockBucket), i64>,
    version: u64,
}

impl ClientStockBalance {
    /// Create an empty balance for rehydration.
    pub fn empty(client_id: PartyId) -> Self {
        Self {
            client_id,
            cells: BTreeMap::new(),
            version: 0,
        }
    }

    pub fn client_id(&self) -> PartyId {
        self.client_id
    }

    pub fn cell(&self, size: SizeClass, bucket: StockBucket) -> i64 {
        self.cells.get(&(size, bucket)).copied().unwrap_or(0)
    }

    /// Total poles across all cells of one bucket.
    pub fn bucket_total(&self, bucket: StockBucket) -> i64 {
        SizeClass::ALL
            .iter()
            .map(|size| self.cell(*size, bucket))
            .sum()
    }
}

impl AggregateRoot for ClientStockBalance {
    type Id = PartyId;

    fn id(&self) -> &Self::Id {
        &self.client_id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: AdjustBalance (generic cell delta).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdjustBalance {
    pub client_id: PartyId,
    pub size: SizeClass,
    pub bucket: StockBucket,
    pub delta: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordManualEntry (client brings their own raw poles).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordManualEntry {
    pub client_id: PartyId,
    pub size: SizeClass,
    pub quantity: u32,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordDelivery (treated stock leaves the yard).
///
/// One command, two deltas: the treated debit and the delivered credit are
/// decided together and land in the same append, so a delivery can never be
/// half applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDelivery {
    pub client_id: PartyId,
    pub size: SizeClass,
    pub quantity: u32,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceCommand {
    AdjustBalance(AdjustBalance),
    RecordManualEntry(RecordManualEntry),
    RecordDelivery(RecordDelivery),
}

/// Event: BalanceAdjusted.
///
/// Always a delta, never an absolute value: replaying the stream is a pure
/// sum, and projections can apply the delta with an atomic increment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceAdjusted {
    pub client_id: PartyId,
    pub size: SizeClass,
    pub bucket: StockBucket,
    pub delta: i64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ManualStockRecorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualStockRecorded {
    pub client_id: PartyId,
    pub size: SizeClass,
    pub quantity: u32,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BalanceEvent {
    BalanceAdjusted(BalanceAdjusted),
    ManualStockRecorded(ManualStockRecorded),
}

impl BalanceEvent {
    /// The `(size, bucket, delta)` this event applies to its client's cells.
    pub fn delta(&self) -> (SizeClass, StockBucket, i64) {
        match self {
            BalanceEvent::BalanceAdjusted(e) => (e.size, e.bucket, e.delta),
            BalanceEvent::ManualStockRecorded(e) => {
                (e.size, StockBucket::Untreated, i64::from(e.quantity))
            }
        }
    }

    pub fn client_id(&self) -> PartyId {
        match self {
            BalanceEvent::BalanceAdjusted(e) => e.client_id,
            BalanceEvent::ManualStockRecorded(e) => e.client_id,
        }
    }
}

impl Event for BalanceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            BalanceEvent::BalanceAdjusted(_) => "clientstock.balance.adjusted",
            BalanceEvent::ManualStockRecorded(_) => "clientstock.balance.manual_entry",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            BalanceEvent::BalanceAdjusted(e) => e.occurred_at,
            BalanceEvent::ManualStockRecorded(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ClientStockBalance {
    type Command = BalanceCommand;
    type Event = BalanceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        let (size, bucket, delta) = event.delta();
        *self.cells.entry((size, bucket)).or_insert(0) += delta;

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            BalanceCommand::AdjustBalance(cmd) => {
                if cmd.client_id != self.client_id {
                    return Err(DomainError::invariant("client_id mismatch"));
                }
                if cmd.delta == 0 {
                    return Err(DomainError::validation("delta cannot be zero"));
                }

                // A cell can be debited (delivery debits treated stock) but
                // never driven below zero.
                let current = self.cell(cmd.size, cmd.bucket);
                if current + cmd.delta < 0 {
                    return Err(DomainError::validation(format!(
                        "{} {} balance would go negative ({current} {:+})",
                        cmd.size, cmd.bucket, cmd.delta
                    )));
                }

                Ok(vec![BalanceEvent::BalanceAdjusted(BalanceAdjusted {
                    client_id: cmd.client_id,
                    size: cmd.size,
                    bucket: cmd.bucket,
                    delta: cmd.delta,
                    occurred_at: cmd.occurred_at,
                })])
            }
            BalanceCommand::RecordManualEntry(cmd) => {
                if cmd.client_id != self.client_id {
                    return Err(DomainError::invariant("client_id mismatch"));
                }
                if cmd.quantity == 0 {
                    return Err(DomainError::validation("quantity must be positive"));
                }

                Ok(vec![BalanceEvent::ManualStockRecorded(ManualStockRecorded {
                    client_id: cmd.client_id,
                    size: cmd.size,
                    quantity: cmd.quantity,
                    notes: cmd.notes.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
            BalanceCommand::RecordDelivery(cmd) => {
                if cmd.client_id != self.client_id {
                    return Err(DomainError::invariant("client_id mismatch"));
                }
                if cmd.quantity == 0 {
                    return Err(DomainError::validation("quantity must be positive"));
                }

                let treated = self.cell(cmd.size, StockBucket::Treated);
                let quantity = i64::from(cmd.quantity);
                if quantity > treated {
                    return Err(DomainError::validation(format!(
                        "delivery of {quantity} x {} exceeds the treated balance of {treated}",
                        cmd.size
                    )));
                }

                Ok(vec![
                    BalanceEvent::BalanceAdjusted(BalanceAdjusted {
                        client_id: cmd.client_id,
                        size: cmd.size,
                        bucket: StockBucket::Treated,
                        delta: -quantity,
                        occurred_at: cmd.occurred_at,
                    }),
                    BalanceEvent::BalanceAdjusted(BalanceAdjusted {
                        client_id: cmd.client_id,
                        size: cmd.size,
                        bucket: StockBucket::Delivered,
                        delta: quantity,
                        occurred_at: cmd.occurred_at,
                    }),
                ])
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_time() -> DateTime<Utc> {
        Utc::now()
    }

    fn adjust(balance: &ClientStockBalance, size: SizeClass, bucket: StockBucket, delta: i64) -> BalanceCommand {
        BalanceCommand::AdjustBalance(AdjustBalance {
            client_id: balance.client_id(),
            size,
            bucket,
            delta,
            occurred_at: test_time(),
        })
    }

    #[test]
    fn first_adjustment_upserts_from_zero() {
        let mut balance = ClientStockBalance::empty(PartyId::new());

        let events = balance
            .handle(&adjust(&balance, SizeClass::Telecom, StockBucket::Treated, 5))
            .unwrap();
        balance.apply(&events[0]);

        assert_eq!(balance.cell(SizeClass::Telecom, StockBucket::Treated), 5);
        assert_eq!(balance.cell(SizeClass::M9, StockBucket::Treated), 0);
    }

    #[test]
    fn debit_below_zero_is_rejected() {
        let mut balance = ClientStockBalance::empty(PartyId::new());
        let events = balance
            .handle(&adjust(&balance, SizeClass::M10, StockBucket::Treated, 8))
            .unwrap();
        balance.apply(&events[0]);

        let err = balance
            .handle(&adjust(&balance, SizeClass::M10, StockBucket::Treated, -9))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));

        // Debiting exactly to zero is fine.
        let events = balance
            .handle(&adjust(&balance, SizeClass::M10, StockBucket::Treated, -8))
            .unwrap();
        balance.apply(&events[0]);
        assert_eq!(balance.cell(SizeClass::M10, StockBucket::Treated), 0);
    }

    #[test]
    fn zero_delta_is_rejected() {
        let balance = ClientStockBalance::empty(PartyId::new());
        let err = balance
            .handle(&adjust(&balance, SizeClass::M9, StockBucket::Untreated, 0))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn manual_entry_credits_untreated() {
        let mut balance = ClientStockBalance::empty(PartyId::new());

        let events = balance
            .handle(&BalanceCommand::RecordManualEntry(RecordManualEntry {
                client_id: balance.client_id(),
                size: SizeClass::M12,
                quantity: 40,
                notes: Some("client delivered own gum poles".to_string()),
                occurred_at: test_time(),
            }))
            .unwrap();
        balance.apply(&events[0]);

        assert_eq!(balance.cell(SizeClass::M12, StockBucket::Untreated), 40);
        assert_eq!(balance.bucket_total(StockBucket::Untreated), 40);
    }

    #[test]
    fn delivery_decides_debit_and_credit_together() {
        let mut balance = ClientStockBalance::empty(PartyId::new());
        let events = balance
            .handle(&adjust(&balance, SizeClass::M12, StockBucket::Treated, 30))
            .unwrap();
        balance.apply(&events[0]);

        let events = balance
            .handle(&BalanceCommand::RecordDelivery(RecordDelivery {
                client_id: balance.client_id(),
                size: SizeClass::M12,
                quantity: 12,
                occurred_at: test_time(),
            }))
            .unwrap();

        // One decision, two deltas: they commit in a single append or not
        // at all.
        assert_eq!(events.len(), 2);
        assert_eq!(
            events[0].delta(),
            (SizeClass::M12, StockBucket::Treated, -12)
        );
        assert_eq!(
            events[1].delta(),
            (SizeClass::M12, StockBucket::Delivered, 12)
        );

        for event in &events {
            balance.apply(event);
        }
        assert_eq!(balance.cell(SizeClass::M12, StockBucket::Treated), 18);
        assert_eq!(balance.cell(SizeClass::M12, StockBucket::Delivered), 12);
    }

    #[test]
    fn over_delivery_emits_nothing() {
        let mut balance = ClientStockBalance::empty(PartyId::new());
        let events = balance
            .handle(&adjust(&balance, SizeClass::M9, StockBucket::Treated, 5))
            .unwrap();
        balance.apply(&events[0]);

        let err = balance
            .handle(&BalanceCommand::RecordDelivery(RecordDelivery {
                client_id: balance.client_id(),
                size: SizeClass::M9,
                quantity: 6,
                occurred_at: test_time(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(balance.cell(SizeClass::M9, StockBucket::Treated), 5);
        assert_eq!(balance.cell(SizeClass::M9, StockBucket::Delivered), 0);
    }

    #[test]
    fn foreign_client_command_is_an_invariant_violation() {
        let balance = ClientStockBalance::empty(PartyId::new());
        let cmd = BalanceCommand::AdjustBalance(AdjustBalance {
            client_id: PartyId::new(),
            size: SizeClass::Telecom,
            bucket: StockBucket::Treated,
            delta: 1,
            occurred_at: test_time(),
        });

        let err = balance.handle(&cmd).unwrap_err();
        assert!(matches!(err, DomainError::InvariantViolation(_)));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        fn size() -> impl Strategy<Value = SizeClass> {
            prop::sample::select(SizeClass::ALL.to_vec())
        }

        fn bucket() -> impl Strategy<Value = StockBucket> {
            prop_oneof![
                Just(StockBucket::Untreated),
                Just(StockBucket::Treated),
                Just(StockBucket::Delivered),
            ]
        }

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 256,
                ..ProptestConfig::default()
            })]

            /// Property: whatever sequence of adjustments is attempted,
            /// every accepted one leaves all cells non-negative.
            #[test]
            fn cells_never_go_negative(
                deltas in prop::collection::vec((size(), bucket(), -50i64..50), 1..40)
            ) {
                let mut balance = ClientStockBalance::empty(PartyId::new());

                for (size, bucket, delta) in deltas {
                    let cmd = BalanceCommand::AdjustBalance(AdjustBalance {
                        client_id: balance.client_id(),
                        size,
                        bucket,
                        delta,
                        occurred_at: Utc::now(),
                    });

                    if let Ok(events) = balance.handle(&cmd) {
                        for event in &events {
                            balance.apply(event);
                        }
                    }

                    for s in SizeClass::ALL {
                        for b in [StockBucket::Untreated, StockBucket::Treated, StockBucket::Delivered] {
                            prop_assert!(balance.cell(s, b) >= 0);
                        }
                    }
                }
            }
        }
    }
}
