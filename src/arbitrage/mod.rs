//! Arbitrage module for detecting and executing opportunities.
//!
//! This module handles:
//! - Fee, gas and profit calculations
//! - Opportunity detection from price snapshots
//! - Ranking and selection
//! - Concurrency-bounded execution

pub mod budget;
pub mod calculator;
pub mod detector;
pub mod executor;
pub mod opportunity;
pub mod selector;

pub use budget::{BudgetPermit, ExecutionBudget};
pub use calculator::{
    AssetClass, FeeModel, FlashLoanProtocol, GasPrice, GasTier, StrategyConfig, StrategyKind,
};
pub use detector::{
    detect_all, detect_direct, detect_flash_loans, detect_triangular, evaluate_triangle,
    DetectionContext, TriangleEstimate,
};
pub use executor::{Admission, CoordinatorStats, ExecutionCoordinator, ExecutionSettings};
pub use opportunity::{Opportunity, OpportunityKind, Route, Thresholds};
pub use selector::{rank, select};
