//! Arbitrage opportunity types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use time::OffsetDateTime;

use super::calculator::{FeeModel, GasTier, StrategyKind};
use crate::market::VenueId;

/// Detection algorithm that produced an opportunity.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OpportunityKind {
    /// Buy on one venue, sell on another.
    Direct,
    /// Three-hop loop on one venue.
    Triangular,
    /// Strategy funded by a flash loan.
    FlashLoan,
}

/// Where and how an opportunity trades.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Route {
    /// Buy `asset` on `buy_venue`, sell on `sell_venue`.
    Direct {
        /// Asset traded.
        asset: String,
        /// Cheaper venue.
        buy_venue: VenueId,
        /// Pricier venue.
        sell_venue: VenueId,
        /// Quoted price on the buy venue.
        buy_price: Decimal,
        /// Quoted price on the sell venue.
        sell_price: Decimal,
        /// Fee charged on the buy venue.
        buy_fee: Decimal,
        /// Fee charged on the sell venue.
        sell_fee: Decimal,
    },
    /// `asset` → `intermediate` → USD → `asset` on one venue.
    Triangular {
        /// Venue hosting all three hops.
        venue: VenueId,
        /// Start and end asset.
        asset: String,
        /// Asset of the first hop.
        intermediate: String,
        /// Conversion rate of each hop.
        rates: [Decimal; 3],
        /// Fee of each hop.
        fees: [Decimal; 3],
    },
    /// Borrow, run a strategy, repay, all in one transaction.
    FlashLoan {
        /// Lending protocol.
        protocol: String,
        /// Chain the protocol lives on.
        chain: String,
        /// Strategy run with the borrowed funds.
        strategy: StrategyKind,
        /// Asset the strategy trades.
        asset: String,
        /// Borrowed amount, in USD.
        loan_amount: Decimal,
        /// Protocol fee fraction.
        protocol_fee: Decimal,
        /// Expected gross return on the loan.
        expected_profit_pct: Decimal,
        /// Gas class of the transaction.
        gas_tier: GasTier,
    },
}

impl Route {
    /// Kind of opportunity this route belongs to.
    pub fn kind(&self) -> OpportunityKind {
        match self {
            Route::Direct { .. } => OpportunityKind::Direct,
            Route::Triangular { .. } => OpportunityKind::Triangular,
            Route::FlashLoan { .. } => OpportunityKind::FlashLoan,
        }
    }

    /// Asset the route trades.
    pub fn asset(&self) -> &str {
        match self {
            Route::Direct { asset, .. }
            | Route::Triangular { asset, .. }
            | Route::FlashLoan { asset, .. } => asset,
        }
    }

    /// Short human-readable description for logs.
    pub fn describe(&self) -> String {
        match self {
            Route::Direct {
                asset,
                buy_venue,
                sell_venue,
                ..
            } => format!("{asset}: buy {buy_venue} -> sell {sell_venue}"),
            Route::Triangular {
                venue,
                asset,
                intermediate,
                ..
            } => format!("{asset}->{intermediate}->USD->{asset} on {venue}"),
            Route::FlashLoan {
                protocol,
                strategy,
                asset,
                ..
            } => format!("{strategy} on {asset} via {protocol}"),
        }
    }
}

/// A detected, fee-aware arbitrage opportunity.
///
/// `net_profit_pct == gross_profit_pct - total_fees` always holds; all
/// percentages are fractions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    /// Detection algorithm.
    pub kind: OpportunityKind,
    /// Venues and prices involved.
    pub route: Route,
    /// Gross return before costs.
    pub gross_profit_pct: Decimal,
    /// Fees and execution cost, as a fraction of the notional.
    pub total_fees: Decimal,
    /// Estimated gas cost in USD (zero for off-chain routes).
    pub estimated_gas_cost: Decimal,
    /// Net return after costs.
    pub net_profit_pct: Decimal,
    /// Notional the estimate is based on, in USD.
    pub notional: Decimal,
    /// Expected profit in USD (`notional * net_profit_pct`).
    pub estimated_profit_abs: Decimal,
    /// When the opportunity was detected.
    #[serde(with = "time::serde::rfc3339")]
    pub discovered_at: OffsetDateTime,
    /// Observation time of the oldest price behind the opportunity.
    #[serde(with = "time::serde::rfc3339")]
    pub priced_at: OffsetDateTime,
}

impl Opportunity {
    /// Build an opportunity, deriving the net figures through `fees`.
    ///
    /// `None` when the net or expected USD profit does not fit a decimal.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        fees: &FeeModel,
        route: Route,
        gross_profit_pct: Decimal,
        total_fees: Decimal,
        estimated_gas_cost: Decimal,
        notional: Decimal,
        discovered_at: OffsetDateTime,
        priced_at: OffsetDateTime,
    ) -> Option<Self> {
        let net_profit_pct = fees.net_profit_pct(gross_profit_pct, total_fees)?;
        let estimated_profit_abs = notional.checked_mul(net_profit_pct)?;
        Some(Self {
            kind: route.kind(),
            route,
            gross_profit_pct,
            total_fees,
            estimated_gas_cost,
            net_profit_pct,
            notional,
            estimated_profit_abs,
            discovered_at,
            priced_at,
        })
    }

    /// Asset this opportunity trades.
    pub fn asset(&self) -> &str {
        self.route.asset()
    }
}

/// Minimum net profit per opportunity kind.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Direct arbitrage.
    pub direct: Decimal,
    /// Triangular arbitrage.
    pub triangular: Decimal,
    /// Flash-loan strategies; no capital at risk, so usually far lower.
    pub flash_loan: Decimal,
}

impl Thresholds {
    /// Same threshold for every kind.
    pub fn uniform(value: Decimal) -> Self {
        Self {
            direct: value,
            triangular: value,
            flash_loan: value,
        }
    }

    /// Threshold for `kind`.
    pub fn for_kind(&self, kind: OpportunityKind) -> Decimal {
        match kind {
            OpportunityKind::Direct => self.direct,
            OpportunityKind::Triangular => self.triangular,
            OpportunityKind::FlashLoan => self.flash_loan,
        }
    }

    /// Whether `net_profit_pct` clears the threshold for `kind`.
    pub fn clears(&self, kind: OpportunityKind, net_profit_pct: Decimal) -> bool {
        net_profit_pct > self.for_kind(kind)
    }
}
