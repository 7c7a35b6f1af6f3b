//! Leg types and construction from opportunity routes.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smallvec::{smallvec, SmallVec};
use strum::{Display, EnumString};
use time::OffsetDateTime;

use crate::arbitrage::Route;
use crate::market::{Pair, VenueId, QUOTE_CURRENCY};

/// What a leg does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LegKind {
    /// Buy the base asset; a higher fill is worse.
    Buy,
    /// Sell the base asset; a lower fill is worse.
    Sell,
    /// Convert base into quote at a rate; a lower rate is worse.
    Swap,
    /// Borrow, trade and repay atomically; the fill is the return multiple.
    FlashLoanBundle,
}

/// A single step of an operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    /// Position within the operation.
    pub index: usize,
    /// Action taken.
    pub kind: LegKind,
    /// Venue (or lending protocol) the leg runs on.
    pub venue: VenueId,
    /// Pair traded.
    pub pair: Pair,
    /// Price the opportunity was estimated at.
    pub expected_price: Decimal,
}

impl Leg {
    /// Relative adverse deviation of `realized` from the expected price.
    ///
    /// Zero or negative when the fill was at least as good as expected.
    pub fn adverse_slippage(&self, realized: Decimal) -> Decimal {
        if self.expected_price <= Decimal::ZERO {
            return Decimal::ZERO;
        }
        let diff = match self.kind {
            LegKind::Buy => realized - self.expected_price,
            LegKind::Sell | LegKind::Swap | LegKind::FlashLoanBundle => {
                self.expected_price - realized
            }
        };
        diff.checked_div(self.expected_price).unwrap_or(if diff.is_sign_negative() {
            Decimal::MIN
        } else {
            Decimal::MAX
        })
    }
}

/// Result reported by a venue for one leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegFill {
    /// Realized price or rate.
    pub price: Decimal,
    /// Fill time.
    #[serde(with = "time::serde::rfc3339")]
    pub filled_at: OffsetDateTime,
}

impl LegFill {
    /// Fill at `price`, now.
    pub fn now(price: Decimal) -> Self {
        Self {
            price,
            filled_at: OffsetDateTime::now_utc(),
        }
    }
}

/// Legs of a route, in execution order.
pub type Legs = SmallVec<[Leg; 3]>;

/// Build the legs that realize `route`.
pub fn legs_for(route: &Route) -> Legs {
    match route {
        Route::Direct {
            asset,
            buy_venue,
            sell_venue,
            buy_price,
            sell_price,
            ..
        } => smallvec![
            Leg {
                index: 0,
                kind: LegKind::Buy,
                venue: buy_venue.clone(),
                pair: Pair::usd(asset),
                expected_price: *buy_price,
            },
            Leg {
                index: 1,
                kind: LegKind::Sell,
                venue: sell_venue.clone(),
                pair: Pair::usd(asset),
                expected_price: *sell_price,
            },
        ],
        Route::Triangular {
            venue,
            asset,
            intermediate,
            rates,
            ..
        } => {
            let pairs = [
                Pair::new(asset, intermediate),
                Pair::usd(intermediate),
                Pair::new(QUOTE_CURRENCY, asset),
            ];
            pairs
                .into_iter()
                .zip(rates.iter())
                .enumerate()
                .map(|(index, (pair, rate))| Leg {
                    index,
                    kind: LegKind::Swap,
                    venue: venue.clone(),
                    pair,
                    expected_price: *rate,
                })
                .collect()
        }
        Route::FlashLoan {
            protocol,
            asset,
            expected_profit_pct,
            ..
        } => smallvec![Leg {
            index: 0,
            kind: LegKind::FlashLoanBundle,
            venue: VenueId::new(protocol),
            pair: Pair::usd(asset),
            expected_price: Decimal::ONE + expected_profit_pct,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arbitrage::{GasTier, StrategyKind};
    use rust_decimal_macros::dec;

    #[test]
    fn direct_route_buys_then_sells() {
        let legs = legs_for(&Route::Direct {
            asset: "ETH".to_string(),
            buy_venue: VenueId::from("a"),
            sell_venue: VenueId::from("b"),
            buy_price: dec!(100),
            sell_price: dec!(102),
            buy_fee: dec!(0.001),
            sell_fee: dec!(0.001),
        });

        assert_eq!(legs.len(), 2);
        assert_eq!(legs[0].kind, LegKind::Buy);
        assert_eq!(legs[0].venue, VenueId::from("a"));
        assert_eq!(legs[1].kind, LegKind::Sell);
        assert_eq!(legs[1].expected_price, dec!(102));
    }

    #[test]
    fn triangular_route_has_three_swaps() {
        let legs = legs_for(&Route::Triangular {
            venue: VenueId::from("v"),
            asset: "ETH".to_string(),
            intermediate: "BTC".to_string(),
            rates: [dec!(0.05), dec!(61000), dec!(0.0003)],
            fees: [dec!(0.001); 3],
        });

        assert_eq!(legs.len(), 3);
        assert!(legs.iter().all(|l| l.kind == LegKind::Swap));
        assert_eq!(legs[1].pair, Pair::usd("BTC"));
        assert_eq!(legs[2].pair, Pair::new("USD", "ETH"));
        assert_eq!(legs[2].index, 2);
    }

    #[test]
    fn flash_loan_is_one_bundle() {
        let legs = legs_for(&Route::FlashLoan {
            protocol: "aave_v3".to_string(),
            chain: "ethereum".to_string(),
            strategy: StrategyKind::DexToDex,
            asset: "ETH".to_string(),
            loan_amount: dec!(1000000),
            protocol_fee: dec!(0.0005),
            expected_profit_pct: dec!(0.003),
            gas_tier: GasTier::Medium,
        });

        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].kind, LegKind::FlashLoanBundle);
        assert_eq!(legs[0].expected_price, dec!(1.003));
    }

    #[test]
    fn slippage_direction_depends_on_side() {
        let buy = Leg {
            index: 0,
            kind: LegKind::Buy,
            venue: VenueId::from("a"),
            pair: Pair::usd("ETH"),
            expected_price: dec!(100),
        };
        let sell = Leg {
            kind: LegKind::Sell,
            ..buy.clone()
        };

        assert_eq!(buy.adverse_slippage(dec!(101)), dec!(0.01));
        assert_eq!(buy.adverse_slippage(dec!(99)), dec!(-0.01));
        assert_eq!(sell.adverse_slippage(dec!(99)), dec!(0.01));
    }

    #[test]
    fn slippage_saturates_on_tiny_expected_price() {
        let buy = Leg {
            index: 0,
            kind: LegKind::Buy,
            venue: VenueId::from("a"),
            pair: Pair::usd("ETH"),
            expected_price: Decimal::new(1, 20),
        };

        assert_eq!(buy.adverse_slippage(dec!(10000000000)), Decimal::MAX);
    }
}
