//! Trading module for operation execution and bookkeeping.
//!
//! This module handles:
//! - Leg types and construction from routes
//! - Leg execution against venues
//! - Operation lifecycle
//! - Profit ledger

pub mod execution;
pub mod ledger;
pub mod operation;
pub mod order;

pub use execution::{LegExecutor, ScriptedFill, ScriptedLegExecutor, SimulatedLegExecutor};
pub use ledger::{InMemoryLedger, LedgerSummary, ProfitLedger};
pub use operation::{
    FailureKind, FailureReason, LegRecord, Operation, OperationId, OperationStatus,
};
pub use order::{legs_for, Leg, LegFill, LegKind, Legs};
