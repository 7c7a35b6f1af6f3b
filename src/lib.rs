//! Multi-venue arbitrage detection and execution engine.
//!
//! The engine polls every tracked asset across a set of venues, detects
//! three kinds of opportunity and executes the best one under a global
//! concurrency budget:
//!
//! ```text
//! direct      buy on the cheaper venue, sell on the pricier one
//! triangular  ASSET -> B -> USD -> ASSET on one venue
//! flash loan  borrow, run a strategy, repay in one transaction
//! ```
//!
//! Every opportunity carries `net = gross - fees` and is only surfaced when
//! `net` exceeds the threshold for its kind.
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment and catalogue file
//! - [`error`]: Unified error types
//! - [`market`]: Venue, pair and quote types, price feed
//! - [`arbitrage`]: Fee model, detection, selection and execution
//! - [`trading`]: Legs, operations and the profit ledger
//! - [`engine`]: Per-asset poll loops
//! - [`api`]: HTTP API for health/status/metrics
//! - [`metrics`]: Prometheus metrics
//! - [`utils`]: Utility functions

pub mod api;
pub mod arbitrage;
pub mod config;
pub mod engine;
pub mod error;
pub mod market;
pub mod metrics;
pub mod trading;
pub mod utils;

pub use config::Config;
pub use error::{BotError, Result};
