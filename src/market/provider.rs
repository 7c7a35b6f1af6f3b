//! Price provider and gas oracle boundaries.
//!
//! Venues are modelled as an abstract price-quoting capability. The feed fans
//! out one request per (venue, pair), bounds each with a timeout and silently
//! drops whatever fails, so a single bad venue never sinks a poll cycle.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::future::join_all;
use rust_decimal::Decimal;
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use super::types::{Pair, PriceQuote, PriceSnapshot, VenueId};
use crate::error::{GasOracleError, VenueError};
use crate::metrics;

/// Source of current prices for (venue, pair).
#[async_trait]
pub trait PriceProvider: Send + Sync {
    /// Fetch the current quote for `pair` on `venue`.
    async fn get_price(&self, venue: &VenueId, pair: &Pair) -> Result<PriceQuote, VenueError>;
}

/// Source of the current network gas price, in gwei.
#[async_trait]
pub trait GasOracle: Send + Sync {
    /// Current gas price in gwei.
    async fn current_gas_price(&self) -> Result<Decimal, GasOracleError>;
}

/// Pairs a poll of `asset` needs: `ASSET/USD`, plus `ASSET/B` and `B/USD`
/// for every other tracked asset `B`.
pub fn required_pairs(asset: &str, tracked_assets: &[String]) -> Vec<Pair> {
    let asset = asset.to_uppercase();
    let mut pairs = vec![Pair::usd(&asset)];

    for other in tracked_assets {
        let other = other.to_uppercase();
        if other == asset {
            continue;
        }
        pairs.push(Pair::new(&asset, &other));
        pairs.push(Pair::usd(&other));
    }

    pairs
}

/// Concurrent, timeout-bounded quote collection over a [`PriceProvider`].
#[derive(Clone)]
pub struct PriceFeed {
    provider: Arc<dyn PriceProvider>,
    venue_timeout: Duration,
}

impl PriceFeed {
    /// Create a feed applying `venue_timeout` to every request.
    pub fn new(provider: Arc<dyn PriceProvider>, venue_timeout: Duration) -> Self {
        Self {
            provider,
            venue_timeout,
        }
    }

    /// Collect every quote `asset` needs from `venues`.
    ///
    /// Venues that error or time out are omitted; the result may be partial
    /// or empty but the call never fails and never waits longer than the
    /// per-venue timeout.
    #[instrument(skip(self, venues, tracked_assets), fields(venues = venues.len()))]
    pub async fn get_prices(
        &self,
        venues: &[VenueId],
        asset: &str,
        tracked_assets: &[String],
    ) -> PriceSnapshot {
        let start = Instant::now();
        let pairs = required_pairs(asset, tracked_assets);

        let requests = venues.iter().flat_map(|venue| {
            pairs
                .iter()
                .map(move |pair| self.fetch_one(venue, pair))
        });
        let results = join_all(requests).await;

        let mut quotes = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(quote) => quotes.push(quote),
                Err(e) => {
                    debug!(error = %e, "Quote omitted from cycle");
                }
            }
        }

        for venue in venues {
            if !quotes.iter().any(|q| &q.venue == venue) {
                warn!(venue = %venue, asset = %asset, "Venue unavailable this cycle");
                metrics::inc_venue_unavailable(venue.as_str());
            }
        }

        metrics::record_price_fetch_latency(start);
        PriceSnapshot::new(asset, quotes, OffsetDateTime::now_utc())
    }

    async fn fetch_one(&self, venue: &VenueId, pair: &Pair) -> Result<PriceQuote, VenueError> {
        match tokio::time::timeout(self.venue_timeout, self.provider.get_price(venue, pair)).await
        {
            Ok(result) => result,
            Err(_) => Err(VenueError::Timeout {
                venue: venue.clone(),
                timeout_ms: self.venue_timeout.as_millis() as u64,
            }),
        }
    }
}
