//! Operation lifecycle.
//!
//! An operation is one execution attempt of one opportunity. Its status only
//! ever moves `pending -> executing -> completed | failed`; terminal
//! operations are immutable.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use strum::{Display, EnumString};
use time::OffsetDateTime;

use super::order::{Leg, LegFill};
use crate::arbitrage::Opportunity;
use crate::error::ExecutionError;

/// Monotonic operation identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(pub u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Operation status.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OperationStatus {
    /// Created, not yet holding an execution slot.
    Pending,
    /// Legs are being executed.
    Executing,
    /// Every leg filled.
    Completed,
    /// Stale or a leg failed.
    Failed,
}

impl OperationStatus {
    /// Whether the status is final.
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationStatus::Completed | OperationStatus::Failed)
    }

    /// Whether `self -> to` is a legal transition.
    pub fn can_transition_to(self, to: OperationStatus) -> bool {
        matches!(
            (self, to),
            (OperationStatus::Pending, OperationStatus::Executing)
                | (OperationStatus::Executing, OperationStatus::Completed)
                | (OperationStatus::Executing, OperationStatus::Failed)
        )
    }
}

/// Why an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailureKind {
    /// Prices were older than the freshness window; no leg ran.
    Stale,
    /// A leg failed; earlier legs stay executed.
    LegExecutionFailure,
    /// Every leg filled but the fills could not be priced.
    UnpricedFills,
}

/// Failure details recorded on a failed operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureReason {
    /// Failure class.
    pub kind: FailureKind,
    /// Human-readable cause.
    pub detail: String,
    /// Failing leg, if a leg failed.
    pub leg_index: Option<usize>,
}

impl From<&ExecutionError> for FailureReason {
    fn from(err: &ExecutionError) -> Self {
        let (kind, leg_index) = match err {
            ExecutionError::StaleOpportunity { .. } => (FailureKind::Stale, None),
            ExecutionError::LegExecutionFailure { leg_index, .. } => {
                (FailureKind::LegExecutionFailure, Some(*leg_index))
            }
            ExecutionError::UnpricedFills { .. } => (FailureKind::UnpricedFills, None),
            ExecutionError::InvalidTransition { .. } => (FailureKind::LegExecutionFailure, None),
        };
        Self {
            kind,
            detail: err.to_string(),
            leg_index,
        }
    }
}

/// Outcome of one executed leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegRecord {
    /// The leg as planned.
    pub leg: Leg,
    /// Fill, when the leg succeeded.
    pub fill: Option<LegFill>,
    /// Error text, when the leg failed.
    pub error: Option<String>,
}

/// One execution attempt of one opportunity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Identifier.
    pub id: OperationId,
    /// Opportunity being executed.
    pub opportunity: Opportunity,
    /// Current status.
    pub status: OperationStatus,
    /// Legs attempted so far, in order.
    pub legs: SmallVec<[LegRecord; 3]>,
    /// Realized net return, once completed.
    pub actual_profit_pct: Option<Decimal>,
    /// Realized profit in USD, once completed.
    pub actual_profit: Option<Decimal>,
    /// Failure details, once failed.
    pub failure: Option<FailureReason>,
    /// Creation time.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    /// Time the operation entered `executing`.
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    /// Time the operation reached a terminal status.
    #[serde(with = "time::serde::rfc3339::option")]
    pub ended_at: Option<OffsetDateTime>,
}

impl Operation {
    /// New pending operation.
    pub fn new(id: OperationId, opportunity: Opportunity) -> Self {
        Self {
            id,
            opportunity,
            status: OperationStatus::Pending,
            legs: SmallVec::new(),
            actual_profit_pct: None,
            actual_profit: None,
            failure: None,
            created_at: OffsetDateTime::now_utc(),
            started_at: None,
            ended_at: None,
        }
    }

    fn transition(&mut self, to: OperationStatus) -> Result<(), ExecutionError> {
        if !self.status.can_transition_to(to) {
            return Err(ExecutionError::InvalidTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// `pending -> executing`.
    pub fn start(&mut self) -> Result<(), ExecutionError> {
        self.transition(OperationStatus::Executing)?;
        self.started_at = Some(OffsetDateTime::now_utc());
        Ok(())
    }

    /// Record a leg outcome. Only legal while executing.
    pub fn record_leg(&mut self, record: LegRecord) -> Result<(), ExecutionError> {
        if self.status != OperationStatus::Executing {
            return Err(ExecutionError::InvalidTransition {
                from: self.status,
                to: OperationStatus::Executing,
            });
        }
        self.legs.push(record);
        Ok(())
    }

    /// `executing -> completed` with the realized profit.
    pub fn complete(
        &mut self,
        actual_profit_pct: Decimal,
        actual_profit: Decimal,
    ) -> Result<(), ExecutionError> {
        self.transition(OperationStatus::Completed)?;
        self.actual_profit_pct = Some(actual_profit_pct);
        self.actual_profit = Some(actual_profit);
        self.ended_at = Some(OffsetDateTime::now_utc());
        Ok(())
    }

    /// `executing -> failed`.
    pub fn fail(&mut self, reason: FailureReason) -> Result<(), ExecutionError> {
        self.transition(OperationStatus::Failed)?;
        self.failure = Some(reason);
        self.ended_at = Some(OffsetDateTime::now_utc());
        Ok(())
    }

    /// Whether the operation is completed or failed.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
