//! Poll loop wiring price feed, detection, selection and execution.
//!
//! One loop runs per tracked asset. Each cycle collects a snapshot, detects
//! opportunities, picks the best one and hands it to the coordinator, which
//! executes it on a background task. Stopping a loop waits for its in-flight
//! operations instead of aborting them.

use std::sync::{Arc, Mutex};

use rust_decimal::Decimal;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::arbitrage::{
    detect_all, rank, select, DetectionContext, ExecutionBudget, ExecutionCoordinator,
    ExecutionSettings, FeeModel, GasPrice, Opportunity, Thresholds,
};
use crate::config::Config;
use crate::market::{GasOracle, PriceFeed, PriceProvider, PriceSnapshot, VenueId};
use crate::metrics;
use crate::trading::{LegExecutor, Operation, OperationId, ProfitLedger};

/// Gas price lookup with fallback to the last good reading, then to the
/// configured default.
pub struct GasPriceSource {
    oracle: Arc<dyn GasOracle>,
    fallback_gwei: Decimal,
    last_good: Mutex<Option<Decimal>>,
}

impl GasPriceSource {
    /// Wrap `oracle` with `fallback_gwei` as the last resort.
    pub fn new(oracle: Arc<dyn GasOracle>, fallback_gwei: Decimal) -> Self {
        Self {
            oracle,
            fallback_gwei,
            last_good: Mutex::new(None),
        }
    }

    /// Current gas price. Never fails.
    pub async fn current(&self) -> GasPrice {
        match self.oracle.current_gas_price().await {
            Ok(gwei) if gwei > Decimal::ZERO => {
                *self
                    .last_good
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(gwei);
                GasPrice(gwei)
            }
            outcome => {
                let last_good = *self
                    .last_good
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                let gwei = last_good.unwrap_or(self.fallback_gwei);
                match outcome {
                    Err(err) => warn!(error = %err, fallback_gwei = %gwei, "Gas oracle failed, using fallback"),
                    Ok(bad) => warn!(reported = %bad, fallback_gwei = %gwei, "Gas oracle returned non-positive price, using fallback"),
                }
                metrics::inc_gas_fallback();
                GasPrice(gwei)
            }
        }
    }
}

/// Outcome of one poll cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    /// Asset polled.
    pub asset: String,
    /// Quotes in the snapshot.
    pub quotes: usize,
    /// Opportunities detected.
    pub opportunities: usize,
    /// Operation started this cycle, if any.
    pub admitted: Option<OperationId>,
}

/// The arbitrage engine.
pub struct ArbEngine {
    config: Arc<Config>,
    feed: PriceFeed,
    gas: GasPriceSource,
    fees: Arc<FeeModel>,
    coordinator: Arc<ExecutionCoordinator>,
    venues: Vec<VenueId>,
    assets: Vec<String>,
}

impl ArbEngine {
    /// Wire an engine from configuration and its external collaborators.
    pub fn new(
        config: Config,
        provider: Arc<dyn PriceProvider>,
        oracle: Arc<dyn GasOracle>,
        executor: Arc<dyn LegExecutor>,
        ledger: Arc<dyn ProfitLedger>,
    ) -> Self {
        let fees = Arc::new(config.fee_model());
        let coordinator = Arc::new(ExecutionCoordinator::new(
            ExecutionBudget::new(config.max_concurrent_operations),
            executor,
            ledger,
            Arc::clone(&fees),
            ExecutionSettings::from_config(&config),
        ));

        Self {
            feed: PriceFeed::new(provider, config.venue_timeout()),
            gas: GasPriceSource::new(oracle, config.fallback_gas_price_gwei),
            venues: config.catalogue.venue_ids(),
            assets: config.catalogue.asset_symbols(),
            fees,
            coordinator,
            config: Arc::new(config),
        }
    }

    /// Execution coordinator.
    pub fn coordinator(&self) -> &Arc<ExecutionCoordinator> {
        &self.coordinator
    }

    /// Tracked assets.
    pub fn assets(&self) -> &[String] {
        &self.assets
    }

    fn thresholds(&self) -> Thresholds {
        self.config.thresholds()
    }

    fn detect(&self, snapshot: &PriceSnapshot, gas_price: GasPrice) -> Vec<Opportunity> {
        let ctx = DetectionContext {
            fees: &self.fees,
            thresholds: self.thresholds(),
            tracked_assets: &self.assets,
            asset_class: self.config.catalogue.asset_class(&snapshot.asset),
            protocols: &self.config.catalogue.flash_loan_protocols,
            strategies: &self.config.catalogue.strategies,
            gas_price,
            trade_size: self.config.trade_size_usd,
        };
        detect_all(snapshot, &ctx)
    }

    /// Fetch prices for `asset` and return ranked opportunities without
    /// executing anything.
    pub async fn scan(&self, asset: &str) -> Vec<Opportunity> {
        let snapshot = self.feed.get_prices(&self.venues, asset, &self.assets).await;
        let gas_price = self.gas.current().await;
        rank(self.detect(&snapshot, gas_price), &self.thresholds())
    }

    /// Run one cycle for `asset`; an admitted operation is spawned on `tasks`.
    #[instrument(skip(self, tasks))]
    pub async fn poll_once(&self, asset: &str, tasks: &mut JoinSet<Operation>) -> CycleReport {
        let snapshot = self.feed.get_prices(&self.venues, asset, &self.assets).await;
        let gas_price = self.gas.current().await;

        let opportunities = self.detect(&snapshot, gas_price);
        let detected = opportunities.len();
        let budget = self.coordinator.budget();

        let mut report = CycleReport {
            asset: snapshot.asset.clone(),
            quotes: snapshot.quotes.len(),
            opportunities: detected,
            admitted: None,
        };

        let Some(best) = select(
            opportunities,
            budget.in_flight(),
            budget.max(),
            &self.thresholds(),
        ) else {
            debug!(
                quotes = report.quotes,
                detected,
                in_flight = budget.in_flight(),
                "Nothing to execute this cycle"
            );
            return report;
        };

        if let Some(admission) = self.coordinator.admit(best) {
            report.admitted = Some(admission.operation().id);
            let coordinator = Arc::clone(&self.coordinator);
            tasks.spawn(async move { coordinator.execute(admission).await });
        }

        report
    }

    /// Poll `asset` until `shutdown` flips to `true`, then wait for the
    /// operations this loop started.
    pub async fn run_asset(self: Arc<Self>, asset: String, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut tasks = JoinSet::new();

        info!(asset = %asset, interval_ms = self.config.poll_interval().as_millis() as u64, "Asset loop started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.poll_once(&asset, &mut tasks).await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }

            while let Some(joined) = tasks.try_join_next() {
                if let Err(err) = joined {
                    error!(asset = %asset, error = %err, "Execution task panicked");
                }
            }
        }

        let pending = tasks.len();
        if pending > 0 {
            info!(asset = %asset, pending, "Waiting for in-flight operations");
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(err) = joined {
                error!(asset = %asset, error = %err, "Execution task panicked");
            }
        }

        info!(asset = %asset, "Asset loop stopped");
    }

    /// Run a loop per tracked asset until `shutdown` flips to `true`.
    pub async fn run(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let mut loops = JoinSet::new();
        for asset in self.assets.clone() {
            loops.spawn(Arc::clone(&self).run_asset(asset, shutdown.clone()));
        }

        while let Some(joined) = loops.join_next().await {
            if let Err(err) = joined {
                error!(error = %err, "Asset loop panicked");
            }
        }

        let stats = self.coordinator.stats();
        info!(
            admitted = stats.admitted,
            completed = stats.completed,
            failed = stats.failed,
            discarded = stats.discarded,
            "Engine stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::FixedGasOracle;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn gas_source_falls_back_to_last_good_then_default() {
        let healthy = GasPriceSource::new(Arc::new(FixedGasOracle::new(dec!(42))), dec!(30));
        assert_eq!(healthy.current().await, GasPrice(dec!(42)));

        let down = GasPriceSource::new(Arc::new(FixedGasOracle::unavailable()), dec!(30));
        assert_eq!(down.current().await, GasPrice(dec!(30)));

        *down.last_good.lock().unwrap() = Some(dec!(25));
        assert_eq!(down.current().await, GasPrice(dec!(25)));
    }
}
