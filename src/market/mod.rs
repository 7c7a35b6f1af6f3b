//! Market data module: venues, quotes and where they come from.
//!
//! This module handles:
//! - Venue, pair and quote types
//! - The price provider and gas oracle boundaries
//! - A jittered simulated feed for running without venue integrations
//! - Deterministic test doubles

pub mod mock;
pub mod provider;
pub mod simulated;
pub mod types;

pub use mock::{FixedGasOracle, StaticPriceProvider};
pub use provider::{required_pairs, GasOracle, PriceFeed, PriceProvider};
pub use simulated::{SimulatedGasOracle, SimulatedPriceProvider};
pub use types::{Pair, PriceQuote, PriceSnapshot, VenueId, VenueKind, QUOTE_CURRENCY};
