//! Arbitrage opportunity detection.
//!
//! Three independent algorithms over one price snapshot. None of them ranks
//! or executes anything, and none reads the clock: `discovered_at` is the
//! snapshot time, so the same snapshot always yields the same opportunities.

use rust_decimal::Decimal;
use tracing::{debug, instrument};

use super::calculator::{AssetClass, FeeModel, FlashLoanProtocol, GasPrice, StrategyConfig};
use super::opportunity::{Opportunity, OpportunityKind, Route, Thresholds};
use crate::market::{Pair, PriceQuote, PriceSnapshot};
use crate::metrics;

/// Everything detection needs besides the snapshot.
#[derive(Debug, Clone, Copy)]
pub struct DetectionContext<'a> {
    /// Shared fee and gas model.
    pub fees: &'a FeeModel,
    /// Per-kind net profit thresholds.
    pub thresholds: Thresholds,
    /// All tracked assets, used as triangular intermediates.
    pub tracked_assets: &'a [String],
    /// Liquidity class of the polled asset.
    pub asset_class: AssetClass,
    /// Flash-loan providers.
    pub protocols: &'a [FlashLoanProtocol],
    /// Flash-loan strategy catalogue.
    pub strategies: &'a [StrategyConfig],
    /// Gas price for this cycle.
    pub gas_price: GasPrice,
    /// Notional for direct and triangular trades, in USD.
    pub trade_size: Decimal,
}

/// Gross, fee and net figures of a three-hop loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriangleEstimate {
    /// `r1 * r2 * r3 - 1`.
    pub gross_profit_pct: Decimal,
    /// Sum of hop fees.
    pub total_fees: Decimal,
    /// Gross minus fees.
    pub net_profit_pct: Decimal,
}

/// Evaluate a three-hop loop from its rates and hop fees.
///
/// `None` when the rate product leaves the decimal range.
pub fn evaluate_triangle(
    fees: &FeeModel,
    rates: [Decimal; 3],
    hop_fees: [Decimal; 3],
) -> Option<TriangleEstimate> {
    let gross_profit_pct = fees.path_gross(&rates)?;
    let total_fees = fees.total_fees(&hop_fees)?;
    Some(TriangleEstimate {
        gross_profit_pct,
        total_fees,
        net_profit_pct: fees.net_profit_pct(gross_profit_pct, total_fees)?,
    })
}

/// Direct two-venue opportunities for the snapshot's asset.
///
/// Every unordered venue pair quoting `ASSET/USD` is checked once, buying on
/// the cheaper venue and selling on the pricier one.
pub fn detect_direct(snapshot: &PriceSnapshot, ctx: &DetectionContext<'_>) -> Vec<Opportunity> {
    let pair = Pair::usd(&snapshot.asset);
    let quotes: Vec<&PriceQuote> = snapshot.quotes_for(&pair).collect();
    let mut found = Vec::new();

    for (i, first) in quotes.iter().enumerate() {
        for second in &quotes[i + 1..] {
            if first.venue == second.venue || first.price == second.price {
                continue;
            }

            let (low, high) = if first.price < second.price {
                (*first, *second)
            } else {
                (*second, *first)
            };

            let Some(gross) = ctx.fees.direct_gross(low.price, high.price) else {
                debug!(
                    buy_venue = %low.venue,
                    sell_venue = %high.venue,
                    buy = %low.price,
                    sell = %high.price,
                    "Skipping direct candidate with unrepresentable spread"
                );
                continue;
            };
            let buy_fee = ctx.fees.quote_fee(low);
            let sell_fee = ctx.fees.quote_fee(high);
            let Some(total_fees) = ctx.fees.total_fees(&[buy_fee, sell_fee]) else {
                continue;
            };
            let Some(net) = ctx.fees.net_profit_pct(gross, total_fees) else {
                continue;
            };

            if !ctx.thresholds.clears(OpportunityKind::Direct, net) {
                continue;
            }

            let route = Route::Direct {
                asset: snapshot.asset.clone(),
                buy_venue: low.venue.clone(),
                sell_venue: high.venue.clone(),
                buy_price: low.price,
                sell_price: high.price,
                buy_fee,
                sell_fee,
            };

            match Opportunity::new(
                ctx.fees,
                route,
                gross,
                total_fees,
                Decimal::ZERO,
                ctx.trade_size,
                snapshot.taken_at,
                low.observed_at.min(high.observed_at),
            ) {
                Some(opp) => found.push(opp),
                None => debug!(
                    buy_venue = %low.venue,
                    sell_venue = %high.venue,
                    "Skipping direct candidate with unrepresentable profit"
                ),
            }
        }
    }

    found
}

/// Triangular opportunities: `ASSET -> B -> USD -> ASSET` on a single venue
/// for every other tracked asset `B`.
pub fn detect_triangular(
    snapshot: &PriceSnapshot,
    ctx: &DetectionContext<'_>,
) -> Vec<Opportunity> {
    let asset = snapshot.asset.as_str();
    let asset_usd = Pair::usd(asset);
    let mut found = Vec::new();

    for venue in snapshot.venues() {
        let Some(start) = snapshot.quote(venue, &asset_usd) else {
            continue;
        };

        for intermediate in ctx.tracked_assets {
            let intermediate = intermediate.to_uppercase();
            if intermediate == asset {
                continue;
            }

            let (Some(first), Some(second)) = (
                snapshot.quote(venue, &Pair::new(asset, &intermediate)),
                snapshot.quote(venue, &Pair::usd(&intermediate)),
            ) else {
                continue;
            };

            let hop_fees = [
                ctx.fees.quote_fee(first),
                ctx.fees.quote_fee(second),
                ctx.fees.quote_fee(start),
            ];
            let Some(back) = Decimal::ONE.checked_div(start.price) else {
                debug!(
                    venue = %venue,
                    price = %start.price,
                    "Skipping triangles on unrepresentable inverse"
                );
                continue;
            };
            let rates = [first.price, second.price, back];
            let Some(estimate) = evaluate_triangle(ctx.fees, rates, hop_fees) else {
                debug!(
                    venue = %venue,
                    intermediate = %intermediate,
                    "Skipping triangle with unrepresentable rates"
                );
                continue;
            };

            if !ctx
                .thresholds
                .clears(OpportunityKind::Triangular, estimate.net_profit_pct)
            {
                continue;
            }

            let priced_at = start
                .observed_at
                .min(first.observed_at)
                .min(second.observed_at);

            let route = Route::Triangular {
                venue: venue.clone(),
                asset: asset.to_string(),
                intermediate,
                rates,
                fees: hop_fees,
            };
            match Opportunity::new(
                ctx.fees,
                route,
                estimate.gross_profit_pct,
                estimate.total_fees,
                Decimal::ZERO,
                ctx.trade_size,
                snapshot.taken_at,
                priced_at,
            ) {
                Some(opp) => found.push(opp),
                None => debug!(venue = %venue, "Skipping triangle with unrepresentable profit"),
            }
        }
    }

    found
}

/// Flash-loan-funded opportunities for every (protocol, strategy) pair.
///
/// Table-driven: the loan is sized from the protocol's maximum, the
/// strategy's and the asset class's multipliers; costs are the protocol fee
/// plus gas for the strategy's tier.
pub fn detect_flash_loans(
    snapshot: &PriceSnapshot,
    ctx: &DetectionContext<'_>,
) -> Vec<Opportunity> {
    let mut found = Vec::new();

    for protocol in ctx.protocols {
        for strategy in ctx.strategies {
            let loan = ctx
                .fees
                .loan_amount(protocol, strategy.kind, ctx.asset_class);
            let Some(gas_cost) = ctx.fees.estimate_gas_cost(strategy.gas_tier, ctx.gas_price)
            else {
                debug!(
                    gas = %ctx.gas_price.gwei(),
                    tier = %strategy.gas_tier,
                    "Skipping strategy at unrepresentable gas cost"
                );
                continue;
            };
            let Some(cost_pct) = ctx.fees.flash_loan_cost_pct(protocol.fee, loan, gas_cost) else {
                continue;
            };

            let Some(net) = ctx
                .fees
                .net_profit_pct(strategy.expected_profit_pct, cost_pct)
            else {
                continue;
            };
            if !ctx.thresholds.clears(OpportunityKind::FlashLoan, net) {
                continue;
            }

            let opp = Opportunity::new(
                ctx.fees,
                Route::FlashLoan {
                    protocol: protocol.name.clone(),
                    chain: protocol.chain.clone(),
                    strategy: strategy.kind,
                    asset: snapshot.asset.clone(),
                    loan_amount: loan,
                    protocol_fee: protocol.fee,
                    expected_profit_pct: strategy.expected_profit_pct,
                    gas_tier: strategy.gas_tier,
                },
                strategy.expected_profit_pct,
                cost_pct,
                gas_cost,
                loan,
                snapshot.taken_at,
                snapshot.taken_at,
            );
            if let Some(opp) = opp {
                found.push(opp);
            }
        }
    }

    found
}

/// Run all three detectors. The result is unordered.
#[instrument(skip(snapshot, ctx), fields(asset = %snapshot.asset, quotes = snapshot.quotes.len()))]
pub fn detect_all(snapshot: &PriceSnapshot, ctx: &DetectionContext<'_>) -> Vec<Opportunity> {
    let _timer = metrics::timer_opportunity_detection();

    let mut found = detect_direct(snapshot, ctx);
    found.extend(detect_triangular(snapshot, ctx));
    found.extend(detect_flash_loans(snapshot, ctx));

    for opp in &found {
        metrics::inc_opportunities_detected(opp.kind);
        debug!(
            kind = %opp.kind,
            route = %opp.route.describe(),
            gross = %opp.gross_profit_pct,
            fees = %opp.total_fees,
            net = %opp.net_profit_pct,
            "Opportunity detected"
        );
    }

    found
}
