//! Venue, pair and quote types shared by detection and execution.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

/// Quote currency every tracked asset is priced against.
pub const QUOTE_CURRENCY: &str = "USD";

/// Identifier of a trading venue (exchange or on-chain pool).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VenueId(pub String);

impl VenueId {
    /// Create a venue id.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Venue name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VenueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for VenueId {
    fn from(name: &str) -> Self {
        Self(name.to_string())
    }
}

/// Kind of venue; drives the polling cadence.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VenueKind {
    /// Order-book exchange.
    #[default]
    Centralized,
    /// On-chain AMM pool.
    Decentralized,
}

/// Trading pair, e.g. `ETH/USD`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    /// Asset being priced.
    pub base: String,
    /// Currency the price is expressed in.
    pub quote: String,
}

impl Pair {
    /// Create a pair, normalising symbols to upper case.
    pub fn new(base: &str, quote: &str) -> Self {
        Self {
            base: base.to_uppercase(),
            quote: quote.to_uppercase(),
        }
    }

    /// Pair of `asset` against [`QUOTE_CURRENCY`].
    pub fn usd(asset: &str) -> Self {
        Self::new(asset, QUOTE_CURRENCY)
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Price observed on one venue for one pair. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Venue that quoted the price.
    pub venue: VenueId,
    /// Pair being quoted.
    pub pair: Pair,
    /// Units of `pair.quote` per unit of `pair.base`.
    pub price: Decimal,
    /// Taker fee reported by the venue, as a fraction.
    pub venue_fee: Decimal,
    /// When the venue produced the price.
    #[serde(with = "time::serde::rfc3339")]
    pub observed_at: OffsetDateTime,
}

impl PriceQuote {
    /// Asset this quote prices.
    pub fn asset(&self) -> &str {
        &self.pair.base
    }
}

/// All quotes gathered in one poll cycle for one tracked asset.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSnapshot {
    /// Asset the cycle is polling.
    pub asset: String,
    /// Quotes in venue order; non-positive prices are dropped on construction.
    pub quotes: Vec<PriceQuote>,
    /// When the cycle assembled the snapshot.
    pub taken_at: OffsetDateTime,
}

impl PriceSnapshot {
    /// Build a snapshot, discarding quotes that cannot be priced.
    pub fn new(asset: &str, quotes: Vec<PriceQuote>, taken_at: OffsetDateTime) -> Self {
        let quotes = quotes
            .into_iter()
            .filter(|q| q.price > Decimal::ZERO && q.venue_fee >= Decimal::ZERO)
            .collect();

        Self {
            asset: asset.to_uppercase(),
            quotes,
            taken_at,
        }
    }

    /// Find the quote for `pair` on `venue`.
    pub fn quote(&self, venue: &VenueId, pair: &Pair) -> Option<&PriceQuote> {
        self.quotes
            .iter()
            .find(|q| &q.venue == venue && &q.pair == pair)
    }

    /// Quotes of `pair` across all venues, in snapshot order.
    pub fn quotes_for<'a>(&'a self, pair: &'a Pair) -> impl Iterator<Item = &'a PriceQuote> + 'a {
        self.quotes.iter().filter(move |q| &q.pair == pair)
    }

    /// Distinct venues present in the snapshot, in order of first appearance.
    pub fn venues(&self) -> Vec<&VenueId> {
        let mut venues: Vec<&VenueId> = Vec::new();
        for quote in &self.quotes {
            if !venues.contains(&&quote.venue) {
                venues.push(&quote.venue);
            }
        }
        venues
    }

    /// Whether the snapshot holds no usable quotes.
    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::str::FromStr;

    fn quote(venue: &str, pair: Pair, price: Decimal) -> PriceQuote {
        PriceQuote {
            venue: VenueId::from(venue),
            pair,
            price,
            venue_fee: dec!(0.001),
            observed_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn pair_normalises_and_displays() {
        let pair = Pair::new("eth", "usd");
        assert_eq!(pair.to_string(), "ETH/USD");
        assert_eq!(pair, Pair::usd("ETH"));
    }

    #[test]
    fn venue_kind_parses_snake_case() {
        assert_eq!(
            VenueKind::from_str("decentralized").unwrap(),
            VenueKind::Decentralized
        );
        assert_eq!(VenueKind::Centralized.to_string(), "centralized");
    }

    #[test]
    fn snapshot_drops_unpriceable_quotes() {
        let snapshot = PriceSnapshot::new(
            "eth",
            vec![
                quote("a", Pair::usd("ETH"), dec!(100)),
                quote("b", Pair::usd("ETH"), dec!(0)),
                quote("c", Pair::usd("ETH"), dec!(-1)),
            ],
            OffsetDateTime::UNIX_EPOCH,
        );

        assert_eq!(snapshot.asset, "ETH");
        assert_eq!(snapshot.quotes.len(), 1);
        assert_eq!(snapshot.venues(), vec![&VenueId::from("a")]);
    }

    #[test]
    fn snapshot_lookup_by_venue_and_pair() {
        let snapshot = PriceSnapshot::new(
            "ETH",
            vec![
                quote("a", Pair::usd("ETH"), dec!(100)),
                quote("a", Pair::new("ETH", "BTC"), dec!(0.05)),
                quote("b", Pair::usd("ETH"), dec!(101)),
            ],
            OffsetDateTime::UNIX_EPOCH,
        );

        let cross = snapshot
            .quote(&VenueId::from("a"), &Pair::new("ETH", "BTC"))
            .unwrap();
        assert_eq!(cross.price, dec!(0.05));
        assert_eq!(snapshot.quotes_for(&Pair::usd("ETH")).count(), 2);
        assert_eq!(snapshot.venues().len(), 2);
    }
}
