//! Operation execution.
//!
//! The coordinator owns the concurrency budget and the operation state
//! machine. Admission reserves a slot and moves the operation to
//! `executing`; execution runs the legs in order and records the terminal
//! operation in the ledger exactly once before releasing the slot. Legs that
//! already filled are never reversed when a later leg fails.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use serde::Serialize;
use smallvec::SmallVec;
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};

use super::budget::{BudgetPermit, ExecutionBudget};
use super::calculator::FeeModel;
use super::opportunity::{Opportunity, Route};
use crate::config::Config;
use crate::error::{ExecutionError, LegError};
use crate::metrics;
use crate::trading::{
    legs_for, FailureReason, Leg, LegExecutor, LegFill, LegRecord, Operation, OperationId,
    OperationStatus, ProfitLedger,
};

/// Execution tunables.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionSettings {
    /// Maximum age of the prices behind an opportunity at execution time.
    pub freshness_window: Duration,
    /// Largest adverse relative deviation accepted on a fill.
    pub slippage_tolerance: Decimal,
    /// Per-leg timeout.
    pub leg_timeout: Duration,
}

impl ExecutionSettings {
    /// Settings from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            freshness_window: config.freshness_window(),
            slippage_tolerance: config.slippage_tolerance,
            leg_timeout: config.leg_timeout(),
        }
    }
}

/// An admitted operation together with the slot it holds.
#[derive(Debug)]
pub struct Admission {
    operation: Operation,
    permit: BudgetPermit,
}

impl Admission {
    /// The admitted operation, in `executing`.
    pub fn operation(&self) -> &Operation {
        &self.operation
    }
}

/// Coordinator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CoordinatorStats {
    /// Opportunities admitted into execution.
    pub admitted: u64,
    /// Opportunities discarded for lack of a slot.
    pub discarded: u64,
    /// Operations completed.
    pub completed: u64,
    /// Operations failed.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    admitted: AtomicU64,
    discarded: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Drives operations from admission to the ledger.
pub struct ExecutionCoordinator {
    budget: ExecutionBudget,
    executor: Arc<dyn LegExecutor>,
    ledger: Arc<dyn ProfitLedger>,
    fees: Arc<FeeModel>,
    settings: ExecutionSettings,
    next_id: AtomicU64,
    counters: Counters,
}

impl ExecutionCoordinator {
    /// Create a coordinator.
    pub fn new(
        budget: ExecutionBudget,
        executor: Arc<dyn LegExecutor>,
        ledger: Arc<dyn ProfitLedger>,
        fees: Arc<FeeModel>,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            budget,
            executor,
            ledger,
            fees,
            settings,
            next_id: AtomicU64::new(1),
            counters: Counters::default(),
        }
    }

    /// Concurrency budget shared with the engine.
    pub fn budget(&self) -> &ExecutionBudget {
        &self.budget
    }

    /// Counter snapshot.
    pub fn stats(&self) -> CoordinatorStats {
        CoordinatorStats {
            admitted: self.counters.admitted.load(Ordering::Relaxed),
            discarded: self.counters.discarded.load(Ordering::Relaxed),
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Reserve a slot for `opportunity` and move its operation to `executing`.
    ///
    /// Returns `None` when the budget is exhausted; the opportunity is then
    /// discarded and nothing reaches the ledger.
    pub fn admit(&self, opportunity: Opportunity) -> Option<Admission> {
        let Some(permit) = self.budget.try_reserve() else {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            metrics::inc_concurrency_exhausted();
            debug!(
                route = %opportunity.route.describe(),
                in_flight = self.budget.in_flight(),
                "Execution budget exhausted, discarding opportunity"
            );
            return None;
        };

        let id = OperationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut operation = Operation::new(id, opportunity);
        metrics::inc_operation_transition(OperationStatus::Pending);

        if let Err(err) = operation.start() {
            error!(id = %id, error = %err, "Failed to start operation");
            return None;
        }
        metrics::inc_operation_transition(OperationStatus::Executing);
        self.counters.admitted.fetch_add(1, Ordering::Relaxed);

        info!(
            id = %id,
            kind = %operation.opportunity.kind,
            route = %operation.opportunity.route.describe(),
            net = %operation.opportunity.net_profit_pct,
            expected_profit = %operation.opportunity.estimated_profit_abs,
            "Operation admitted"
        );

        Some(Admission { operation, permit })
    }

    /// Run an admitted operation to a terminal status and record it.
    #[instrument(skip(self, admission), fields(id = %admission.operation.id))]
    pub async fn execute(&self, admission: Admission) -> Operation {
        let Admission {
            mut operation,
            permit,
        } = admission;

        let transition = match self.run_legs(&mut operation).await {
            Ok((profit_pct, profit)) => {
                info!(
                    estimated = %operation.opportunity.estimated_profit_abs,
                    actual = %profit,
                    actual_pct = %profit_pct,
                    "Operation completed"
                );
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
                operation.complete(profit_pct, profit)
            }
            Err(err) => {
                warn!(error = %err, "Operation failed");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                operation.fail(FailureReason::from(&err))
            }
        };

        match transition {
            Ok(()) => metrics::inc_operation_transition(operation.status),
            Err(err) => error!(error = %err, "Operation state machine rejected transition"),
        }

        self.ledger.record(operation.clone()).await;
        drop(permit);
        operation
    }

    /// Admit and execute in one call.
    pub async fn submit(&self, opportunity: Opportunity) -> Option<Operation> {
        let admission = self.admit(opportunity)?;
        Some(self.execute(admission).await)
    }

    async fn run_legs(
        &self,
        operation: &mut Operation,
    ) -> Result<(Decimal, Decimal), ExecutionError> {
        self.check_freshness(&operation.opportunity, OffsetDateTime::now_utc())?;

        let mut fills: SmallVec<[Decimal; 3]> = SmallVec::new();
        for leg in legs_for(&operation.opportunity.route) {
            let start = Instant::now();
            let outcome = self.execute_leg(&leg).await;
            metrics::record_leg_latency(start, leg.venue.as_str());

            match outcome {
                Ok(fill) => {
                    debug!(leg = leg.index, venue = %leg.venue, price = %fill.price, "Leg filled");
                    fills.push(fill.price);
                    operation.record_leg(LegRecord {
                        leg,
                        fill: Some(fill),
                        error: None,
                    })?;
                }
                Err(source) => {
                    metrics::inc_legs_failed(leg.venue.as_str());
                    let leg_index = leg.index;
                    operation.record_leg(LegRecord {
                        leg,
                        fill: None,
                        error: Some(source.to_string()),
                    })?;
                    return Err(ExecutionError::LegExecutionFailure { leg_index, source });
                }
            }
        }

        let unpriced = || ExecutionError::UnpricedFills {
            fills: fills.to_vec(),
        };
        let profit_pct = self
            .realized_profit_pct(&operation.opportunity, &fills)
            .ok_or_else(unpriced)?;
        let profit = operation
            .opportunity
            .notional
            .checked_mul(profit_pct)
            .ok_or_else(unpriced)?;
        Ok((profit_pct, profit))
    }

    fn check_freshness(
        &self,
        opportunity: &Opportunity,
        now: OffsetDateTime,
    ) -> Result<(), ExecutionError> {
        let age_ms = (now - opportunity.priced_at).whole_milliseconds() as i64;
        let window_ms = self.settings.freshness_window.as_millis() as u64;
        if age_ms > window_ms as i64 {
            return Err(ExecutionError::StaleOpportunity { age_ms, window_ms });
        }
        Ok(())
    }

    async fn execute_leg(&self, leg: &Leg) -> Result<LegFill, LegError> {
        let fill = tokio::time::timeout(self.settings.leg_timeout, self.executor.execute(leg))
            .await
            .map_err(|_| LegError::Timeout {
                timeout_ms: self.settings.leg_timeout.as_millis() as u64,
            })??;

        if fill.price <= Decimal::ZERO {
            return Err(LegError::Rejected(format!(
                "non-positive fill price {}",
                fill.price
            )));
        }

        let tolerance = self.settings.slippage_tolerance;
        if leg.adverse_slippage(fill.price) > tolerance {
            return Err(LegError::SlippageExceeded {
                expected: leg.expected_price,
                realized: fill.price,
                tolerance,
            });
        }

        Ok(fill)
    }

    /// Net return implied by the realized fills, through the same fee model
    /// used for the estimate. `None` when the fills cannot be priced.
    fn realized_profit_pct(&self, opportunity: &Opportunity, fills: &[Decimal]) -> Option<Decimal> {
        let (gross, total_fees) = match &opportunity.route {
            Route::Direct {
                buy_fee, sell_fee, ..
            } => {
                let [buy, sell] = fills else {
                    return None;
                };
                (
                    self.fees.direct_gross(*buy, *sell)?,
                    self.fees.total_fees(&[*buy_fee, *sell_fee])?,
                )
            }
            Route::Triangular { fees, .. } => {
                (self.fees.path_gross(fills)?, self.fees.total_fees(fees)?)
            }
            Route::FlashLoan {
                loan_amount,
                protocol_fee,
                ..
            } => {
                let multiple = fills.first()?;
                let cost = self.fees.flash_loan_cost_pct(
                    *protocol_fee,
                    *loan_amount,
                    opportunity.estimated_gas_cost,
                )?;
                (multiple.checked_sub(Decimal::ONE)?, cost)
            }
        };
        self.fees.net_profit_pct(gross, total_fees)
    }
}
