//! Simulated market data: reference prices with random per-venue jitter.
//!
//! Stands in for a real market-data feed when the engine runs without venue
//! integrations. Tests use [`super::mock`] instead.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use time::OffsetDateTime;

use super::provider::{GasOracle, PriceProvider};
use super::types::{Pair, PriceQuote, VenueId, QUOTE_CURRENCY};
use crate::config::Catalogue;
use crate::error::{GasOracleError, VenueError};

/// Random relative offset in `[-jitter, +jitter]`.
fn random_offset(jitter: Decimal) -> Decimal {
    let r: f64 = rand::rng().random_range(-1.0..=1.0);
    Decimal::from_f64(r).unwrap_or_default() * jitter
}

/// Price provider jittering reference prices per venue and per request.
#[derive(Debug, Clone)]
pub struct SimulatedPriceProvider {
    reference_prices: HashMap<String, Decimal>,
    venue_fees: HashMap<VenueId, Decimal>,
    jitter: Decimal,
    failure_rate: f64,
    max_latency: Duration,
}

impl SimulatedPriceProvider {
    /// Create a provider from reference USD prices and venue fees.
    pub fn new(
        reference_prices: HashMap<String, Decimal>,
        venue_fees: HashMap<VenueId, Decimal>,
    ) -> Self {
        Self {
            reference_prices,
            venue_fees,
            jitter: dec!(0.01),
            failure_rate: 0.02,
            max_latency: Duration::from_millis(150),
        }
    }

    /// Build from the configured catalogue.
    pub fn from_catalogue(catalogue: &Catalogue) -> Self {
        let reference_prices = catalogue
            .assets
            .iter()
            .map(|a| (a.symbol.to_uppercase(), a.reference_price))
            .collect();
        let venue_fees = catalogue
            .venues
            .iter()
            .map(|v| (VenueId::new(&v.name), v.fee))
            .collect();
        Self::new(reference_prices, venue_fees)
    }

    /// Relative price jitter applied to every quote.
    pub fn with_jitter(mut self, jitter: Decimal) -> Self {
        self.jitter = jitter;
        self
    }

    /// Probability that a request fails.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Upper bound of simulated network latency.
    pub fn with_max_latency(mut self, latency: Duration) -> Self {
        self.max_latency = latency;
        self
    }

    fn usd_price(&self, symbol: &str) -> Option<Decimal> {
        if symbol == QUOTE_CURRENCY {
            return Some(Decimal::ONE);
        }
        self.reference_prices.get(symbol).copied()
    }
}

#[async_trait]
impl PriceProvider for SimulatedPriceProvider {
    async fn get_price(&self, venue: &VenueId, pair: &Pair) -> Result<PriceQuote, VenueError> {
        let fee = *self
            .venue_fees
            .get(venue)
            .ok_or_else(|| VenueError::Unavailable {
                venue: venue.clone(),
                reason: "unknown venue".to_string(),
            })?;

        let (base, quote) = match (self.usd_price(&pair.base), self.usd_price(&pair.quote)) {
            (Some(b), Some(q)) if q > Decimal::ZERO => (b, q),
            _ => {
                return Err(VenueError::UnknownPair {
                    venue: venue.clone(),
                    pair: pair.to_string(),
                })
            }
        };

        // ThreadRng is !Send, so draw everything before the first await.
        let (latency, fails, offset) = {
            let mut rng = rand::rng();
            let max_ms = self.max_latency.as_millis() as u64;
            let latency = Duration::from_millis(rng.random_range(0..=max_ms));
            (latency, rng.random_bool(self.failure_rate), random_offset(self.jitter))
        };

        tokio::time::sleep(latency).await;

        if fails {
            return Err(VenueError::Unavailable {
                venue: venue.clone(),
                reason: "simulated outage".to_string(),
            });
        }

        let price = (base / quote * (Decimal::ONE + offset)).round_dp(8);

        Ok(PriceQuote {
            venue: venue.clone(),
            pair: pair.clone(),
            price,
            venue_fee: fee,
            observed_at: OffsetDateTime::now_utc(),
        })
    }
}

/// Gas oracle jittering around a base gas price.
#[derive(Debug, Clone)]
pub struct SimulatedGasOracle {
    base_gwei: Decimal,
    jitter: Decimal,
}

impl SimulatedGasOracle {
    /// Create an oracle centred on `base_gwei` with ±25% jitter.
    pub fn new(base_gwei: Decimal) -> Self {
        Self {
            base_gwei,
            jitter: dec!(0.25),
        }
    }
}

#[async_trait]
impl GasOracle for SimulatedGasOracle {
    async fn current_gas_price(&self) -> Result<Decimal, GasOracleError> {
        let price = (self.base_gwei * (Decimal::ONE + random_offset(self.jitter))).round_dp(4);
        if price <= Decimal::ZERO {
            return Err(GasOracleError::InvalidPrice(price));
        }
        Ok(price)
    }
}
