//! Unified error types for the arbitrage engine.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::market::VenueId;
use crate::trading::OperationStatus;

/// Unified error type for the arbitrage engine.
#[derive(Error, Debug)]
pub enum BotError {
    /// Environment configuration could not be parsed.
    #[error("configuration error: {0}")]
    Env(#[from] envy::Error),

    /// Configuration or catalogue is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// Configuration and catalogue errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A value failed validation.
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// The catalogue file could not be read.
    #[error("failed to read catalogue {path}: {source}")]
    Read {
        /// Catalogue path.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The catalogue file is not valid TOML for the catalogue schema.
    #[error("failed to parse catalogue: {0}")]
    Parse(#[from] toml::de::Error),
}

/// A single venue's quote fetch failed. Absorbed by the price feed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VenueError {
    /// Venue did not answer within the per-venue timeout.
    #[error("venue {venue} timed out after {timeout_ms}ms")]
    Timeout {
        /// Venue that timed out.
        venue: VenueId,
        /// Timeout applied.
        timeout_ms: u64,
    },

    /// Venue answered with an error or is unreachable.
    #[error("venue {venue} unavailable: {reason}")]
    Unavailable {
        /// Venue that failed.
        venue: VenueId,
        /// Reason reported.
        reason: String,
    },

    /// Venue does not list the requested pair.
    #[error("venue {venue} does not quote {pair}")]
    UnknownPair {
        /// Venue queried.
        venue: VenueId,
        /// Pair requested.
        pair: String,
    },
}

/// Gas oracle errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GasOracleError {
    /// Oracle unreachable.
    #[error("gas oracle unavailable: {0}")]
    Unavailable(String),

    /// Oracle returned a non-positive price.
    #[error("gas oracle returned invalid price {0}")]
    InvalidPrice(Decimal),
}

/// A single execution leg failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LegError {
    /// Fill price moved against us beyond tolerance.
    #[error("slippage exceeded: expected {expected}, realized {realized}, tolerance {tolerance}")]
    SlippageExceeded {
        /// Expected leg price.
        expected: Decimal,
        /// Realized fill price.
        realized: Decimal,
        /// Configured tolerance.
        tolerance: Decimal,
    },

    /// Not enough depth on the venue.
    #[error("insufficient liquidity on {venue}")]
    InsufficientLiquidity {
        /// Venue lacking depth.
        venue: VenueId,
    },

    /// Counterparty did not answer in time.
    #[error("leg timed out after {timeout_ms}ms")]
    Timeout {
        /// Timeout applied.
        timeout_ms: u64,
    },

    /// Venue rejected the leg for another reason.
    #[error("leg rejected: {0}")]
    Rejected(String),
}

/// Errors raised while driving an operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutionError {
    /// Prices behind the opportunity are older than the freshness window.
    #[error("stale opportunity: prices are {age_ms}ms old, window is {window_ms}ms")]
    StaleOpportunity {
        /// Age of the oldest quote at execution time.
        age_ms: i64,
        /// Configured freshness window.
        window_ms: u64,
    },

    /// A leg failed; earlier legs are left as they are.
    #[error("leg {leg_index} failed: {source}")]
    LegExecutionFailure {
        /// Zero-based index of the failing leg.
        leg_index: usize,
        /// Leg error.
        #[source]
        source: LegError,
    },

    /// Realized fills produced a profit figure outside the decimal range.
    #[error("realized profit could not be computed from fills {fills:?}")]
    UnpricedFills {
        /// Fill prices in leg order.
        fills: Vec<Decimal>,
    },

    /// The operation state machine rejected a transition.
    #[error("invalid transition from {from} to {to}")]
    InvalidTransition {
        /// Current status.
        from: OperationStatus,
        /// Requested status.
        to: OperationStatus,
    },
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;
