//! Profit ledger: the record of terminal operations.

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, warn};

use super::operation::{Operation, OperationId, OperationStatus};

/// Sink for terminal operations. Each operation is recorded exactly once.
#[async_trait]
pub trait ProfitLedger: Send + Sync {
    /// Record a completed or failed operation.
    async fn record(&self, operation: Operation);
}

/// Aggregate view over recorded operations.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LedgerSummary {
    /// Completed operations.
    pub completed: usize,
    /// Failed operations.
    pub failed: usize,
    /// Sum of realized profit over completed operations, in USD.
    pub realized_profit: Decimal,
    /// Sum of estimated profit over completed operations, in USD.
    pub estimated_profit: Decimal,
}

/// In-memory ledger keyed by operation id.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    operations: DashMap<OperationId, Operation>,
}

impl InMemoryLedger {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded operation by id.
    pub fn get(&self, id: OperationId) -> Option<Operation> {
        self.operations.get(&id).map(|op| op.clone())
    }

    /// All recorded operations, ordered by id.
    pub fn all(&self) -> Vec<Operation> {
        let mut ops: Vec<Operation> = self.operations.iter().map(|e| e.value().clone()).collect();
        ops.sort_by_key(|op| op.id);
        ops
    }

    /// Recorded operations with `status`, ordered by id.
    pub fn with_status(&self, status: OperationStatus) -> Vec<Operation> {
        let mut ops: Vec<Operation> = self
            .operations
            .iter()
            .filter(|e| e.status == status)
            .map(|e| e.value().clone())
            .collect();
        ops.sort_by_key(|op| op.id);
        ops
    }

    /// Completed operations.
    pub fn completed(&self) -> Vec<Operation> {
        self.with_status(OperationStatus::Completed)
    }

    /// Failed operations.
    pub fn failed(&self) -> Vec<Operation> {
        self.with_status(OperationStatus::Failed)
    }

    /// Number of recorded operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Totals across the ledger.
    pub fn summary(&self) -> LedgerSummary {
        self.operations
            .iter()
            .fold(LedgerSummary::default(), |mut acc, entry| {
                match entry.status {
                    OperationStatus::Completed => {
                        acc.completed += 1;
                        acc.realized_profit += entry.actual_profit.unwrap_or_default();
                        acc.estimated_profit += entry.opportunity.estimated_profit_abs;
                    }
                    OperationStatus::Failed => acc.failed += 1,
                    OperationStatus::Pending | OperationStatus::Executing => {}
                }
                acc
            })
    }
}

#[async_trait]
impl ProfitLedger for InMemoryLedger {
    async fn record(&self, operation: Operation) {
        if !operation.is_terminal() {
            warn!(id = %operation.id, status = %operation.status, "Refusing to record non-terminal operation");
            return;
        }
        match self.operations.entry(operation.id) {
            Entry::Occupied(_) => warn!(id = %operation.id, "Operation already recorded"),
            Entry::Vacant(slot) => {
                debug!(id = %operation.id, status = %operation.status, "Operation recorded");
                slot.insert(operation);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::{FeeModel, Opportunity, Route};
    use crate::market::VenueId;
    use crate::trading::{FailureKind, FailureReason};
    use rust_decimal_macros::dec;
    use std::collections::HashMap;
    use time::OffsetDateTime;

    fn operation(id: u64) -> Operation {
        let opp = Opportunity::new(
            &FeeModel::new(HashMap::new(), dec!(3000)),
            Route::Direct {
                asset: "ETH".to_string(),
                buy_venue: VenueId::from("a"),
                sell_venue: VenueId::from("b"),
                buy_price: dec!(100),
                sell_price: dec!(102),
                buy_fee: dec!(0.001),
                sell_fee: dec!(0.001),
            },
            dec!(0.02),
            dec!(0.002),
            Decimal::ZERO,
            dec!(1000),
            OffsetDateTime::UNIX_EPOCH,
            OffsetDateTime::UNIX_EPOCH,
        )
        .unwrap();
        let mut op = Operation::new(OperationId(id), opp);
        op.start().unwrap();
        op
    }

    #[tokio::test]
    async fn records_terminal_operations_once() {
        let ledger = InMemoryLedger::new();

        let mut done = operation(1);
        done.complete(dec!(0.015), dec!(15)).unwrap();
        ledger.record(done.clone()).await;
        ledger.record(done).await;

        let mut failed = operation(2);
        failed
            .fail(FailureReason {
                kind: FailureKind::Stale,
                detail: "stale".to_string(),
                leg_index: None,
            })
            .unwrap();
        ledger.record(failed).await;

        ledger.record(operation(3)).await;

        assert_eq!(ledger.len(), 2);
        assert_eq!(
            ledger.summary(),
            LedgerSummary {
                completed: 1,
                failed: 1,
                realized_profit: dec!(15),
                estimated_profit: dec!(18),
            }
        );
        assert_eq!(ledger.failed()[0].id, OperationId(2));
        assert!(ledger.get(OperationId(3)).is_none());
    }
}
