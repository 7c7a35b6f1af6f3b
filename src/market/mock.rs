//! Deterministic price provider and gas oracle for tests.
//!
//! These replace the market-data feed entirely: prices only change when a
//! test changes them.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use time::OffsetDateTime;

use super::provider::{GasOracle, PriceProvider};
use super::types::{Pair, PriceQuote, VenueId};
use crate::error::{GasOracleError, VenueError};

/// Fixed quote served by [`StaticPriceProvider`].
#[derive(Debug, Clone)]
pub struct MockQuote {
    /// Quoted price.
    pub price: Decimal,
    /// Venue fee.
    pub fee: Decimal,
}

/// Price provider serving fixed quotes.
#[derive(Debug, Clone, Default)]
pub struct StaticPriceProvider {
    quotes: Arc<DashMap<(VenueId, Pair), MockQuote>>,
    failing: HashSet<VenueId>,
    delays: Arc<DashMap<VenueId, Duration>>,
    observed_at: Option<OffsetDateTime>,
    calls: Arc<AtomicUsize>,
}

impl StaticPriceProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `price` for `pair` on `venue`.
    pub fn with_quote(self, venue: &str, pair: Pair, price: Decimal, fee: Decimal) -> Self {
        self.set_quote(venue, pair, price, fee);
        self
    }

    /// Make every request to `venue` fail.
    pub fn failing(mut self, venue: &str) -> Self {
        self.failing.insert(VenueId::from(venue));
        self
    }

    /// Delay every answer from `venue`.
    pub fn with_delay(self, venue: &str, delay: Duration) -> Self {
        self.delays.insert(VenueId::from(venue), delay);
        self
    }

    /// Stamp every quote with a fixed observation time.
    pub fn observed_at(mut self, at: OffsetDateTime) -> Self {
        self.observed_at = Some(at);
        self
    }

    /// Replace or add a quote after construction.
    pub fn set_quote(&self, venue: &str, pair: Pair, price: Decimal, fee: Decimal) {
        self.quotes
            .insert((VenueId::from(venue), pair), MockQuote { price, fee });
    }

    /// Number of requests served so far, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PriceProvider for StaticPriceProvider {
    async fn get_price(&self, venue: &VenueId, pair: &Pair) -> Result<PriceQuote, VenueError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let delay = self.delays.get(venue).map(|d| *d.value());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.failing.contains(venue) {
            return Err(VenueError::Unavailable {
                venue: venue.clone(),
                reason: "mock venue failure".to_string(),
            });
        }

        let quote = self
            .quotes
            .get(&(venue.clone(), pair.clone()))
            .map(|q| q.value().clone())
            .ok_or_else(|| VenueError::UnknownPair {
                venue: venue.clone(),
                pair: pair.to_string(),
            })?;

        Ok(PriceQuote {
            venue: venue.clone(),
            pair: pair.clone(),
            price: quote.price,
            venue_fee: quote.fee,
            observed_at: self.observed_at.unwrap_or_else(OffsetDateTime::now_utc),
        })
    }
}

/// Gas oracle returning a fixed price, or failing on demand.
#[derive(Debug, Clone)]
pub struct FixedGasOracle {
    gwei: Option<Decimal>,
}

impl FixedGasOracle {
    /// Oracle always answering `gwei`.
    pub fn new(gwei: Decimal) -> Self {
        Self { gwei: Some(gwei) }
    }

    /// Oracle that always fails.
    pub fn unavailable() -> Self {
        Self { gwei: None }
    }
}

#[async_trait]
impl GasOracle for FixedGasOracle {
    async fn current_gas_price(&self) -> Result<Decimal, GasOracleError> {
        self.gwei
            .ok_or_else(|| GasOracleError::Unavailable("mock oracle down".to_string()))
    }
}
