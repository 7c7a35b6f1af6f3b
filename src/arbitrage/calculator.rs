//! Fee, gas and profit calculations.
//!
//! [`FeeModel`] is the single source of cost numbers: the detector uses it to
//! estimate an opportunity and the coordinator uses the same instance on
//! realized fills, so estimate and actual only ever differ in market data.

use std::collections::HashMap;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::market::{PriceQuote, VenueId};

/// Gwei to native-asset conversion.
const GWEI: Decimal = dec!(0.000000001);

/// Gas consumption class of an on-chain strategy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum GasTier {
    /// Single swap.
    Low,
    /// Two swaps plus loan plumbing.
    Medium,
    /// Multi-hop routes.
    High,
    /// Bridges and liquidations.
    VeryHigh,
}

impl GasTier {
    /// Gas units consumed by a transaction of this tier.
    pub fn gas_units(self) -> u64 {
        match self {
            GasTier::Low => 150_000,
            GasTier::Medium => 300_000,
            GasTier::High => 500_000,
            GasTier::VeryHigh => 800_000,
        }
    }
}

/// Flash-loan strategy family.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StrategyKind {
    /// Buy on one DEX, sell on another.
    DexToDex,
    /// Same asset across two chains.
    CrossChain,
    /// Three-hop loop on one DEX.
    Triangular,
    /// Repay an undercollateralised position for the bonus.
    Liquidation,
    /// Bracket a pending swap.
    Sandwich,
}

impl StrategyKind {
    /// Share of a protocol's maximum loan this strategy deploys.
    pub fn loan_multiplier(self) -> Decimal {
        match self {
            StrategyKind::DexToDex => dec!(1.0),
            StrategyKind::Triangular => dec!(0.75),
            StrategyKind::CrossChain => dec!(0.5),
            StrategyKind::Liquidation => dec!(0.25),
            StrategyKind::Sandwich => dec!(0.1),
        }
    }
}

/// Liquidity class of an asset; scales flash-loan size.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AssetClass {
    /// Deep, liquid majors.
    #[default]
    Major,
    /// Dollar-pegged stablecoins.
    Stable,
    /// Everything else.
    Alt,
}

impl AssetClass {
    /// Loan-size multiplier for this class.
    pub fn loan_multiplier(self) -> Decimal {
        match self {
            AssetClass::Major => dec!(1.0),
            AssetClass::Stable => dec!(1.2),
            AssetClass::Alt => dec!(0.5),
        }
    }
}

/// A flash-loan provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlashLoanProtocol {
    /// Protocol name.
    pub name: String,
    /// Fee as a fraction of the borrowed amount.
    pub fee: Decimal,
    /// Largest loan available, in USD.
    pub max_loan: Decimal,
    /// Chain the protocol lives on.
    pub chain: String,
}

/// A strategy catalogue entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Strategy family.
    pub kind: StrategyKind,
    /// Expected gross profit as a fraction of the loan.
    pub expected_profit_pct: Decimal,
    /// Gas class of the strategy's transaction.
    pub gas_tier: GasTier,
}

/// Gas price for one cycle, in gwei.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasPrice(pub Decimal);

impl GasPrice {
    /// Price in gwei.
    pub fn gwei(self) -> Decimal {
        self.0
    }
}

/// Fee and gas model shared by detection and execution.
#[derive(Debug, Clone)]
pub struct FeeModel {
    venue_fees: HashMap<VenueId, Decimal>,
    native_asset_usd: Decimal,
}

impl FeeModel {
    /// Create a model from configured venue fees and the native asset's USD price.
    pub fn new(venue_fees: HashMap<VenueId, Decimal>, native_asset_usd: Decimal) -> Self {
        Self {
            venue_fees,
            native_asset_usd,
        }
    }

    /// Configured taker fee of `venue`, if any.
    pub fn venue_fee(&self, venue: &VenueId) -> Option<Decimal> {
        self.venue_fees.get(venue).copied()
    }

    /// Fee to charge for a quote: the configured venue fee, else the fee
    /// the venue reported with the quote.
    pub fn quote_fee(&self, quote: &PriceQuote) -> Decimal {
        self.venue_fee(&quote.venue).unwrap_or(quote.venue_fee)
    }

    /// Protocol fee for borrowing `amount` at fee fraction `protocol_fee`.
    pub fn flash_loan_fee(&self, protocol_fee: Decimal, amount: Decimal) -> Option<Decimal> {
        amount.checked_mul(protocol_fee)
    }

    /// USD cost of one transaction of `tier` at `gas_price`.
    ///
    /// `None` when an oracle price is so large the cost leaves the decimal range.
    pub fn estimate_gas_cost(&self, tier: GasTier, gas_price: GasPrice) -> Option<Decimal> {
        Decimal::from(tier.gas_units())
            .checked_mul(gas_price.gwei())?
            .checked_mul(GWEI)?
            .checked_mul(self.native_asset_usd)
    }

    /// Gross return of buying at `buy` and selling at `sell`.
    ///
    /// `None` for a non-positive buy price or a ratio outside the decimal range.
    pub fn direct_gross(&self, buy: Decimal, sell: Decimal) -> Option<Decimal> {
        if buy <= Decimal::ZERO {
            return None;
        }
        sell.checked_sub(buy)?.checked_div(buy)
    }

    /// Gross return of chaining conversion `rates`: product of rates minus one.
    pub fn path_gross(&self, rates: &[Decimal]) -> Option<Decimal> {
        rates
            .iter()
            .try_fold(Decimal::ONE, |acc, r| acc.checked_mul(*r))?
            .checked_sub(Decimal::ONE)
    }

    /// Net return after fees. Every surfaced net figure goes through here.
    pub fn net_profit_pct(&self, gross_pct: Decimal, total_fees: Decimal) -> Option<Decimal> {
        gross_pct.checked_sub(total_fees)
    }

    /// Sum of per-leg fees.
    pub fn total_fees(&self, fees: &[Decimal]) -> Option<Decimal> {
        fees.iter().try_fold(Decimal::ZERO, |acc, fee| acc.checked_add(*fee))
    }

    /// Flash-loan size for a protocol, strategy and asset class.
    pub fn loan_amount(
        &self,
        protocol: &FlashLoanProtocol,
        strategy: StrategyKind,
        class: AssetClass,
    ) -> Decimal {
        protocol.max_loan * strategy.loan_multiplier() * class.loan_multiplier()
    }

    /// Loan fee plus gas, as a fraction of the loan.
    pub fn flash_loan_cost_pct(
        &self,
        protocol_fee: Decimal,
        loan: Decimal,
        gas_cost: Decimal,
    ) -> Option<Decimal> {
        if loan <= Decimal::ZERO {
            return None;
        }
        self.flash_loan_fee(protocol_fee, loan)?
            .checked_add(gas_cost)?
            .checked_div(loan)
    }
}
