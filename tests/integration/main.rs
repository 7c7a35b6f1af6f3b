//! End-to-end tests for the arbitrage engine.
//!
//! Everything runs against in-process doubles: a static price provider, a
//! fixed gas oracle and scripted leg executors. No network access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinSet;

use venue_arb::arbitrage::{
    detect_all, detect_triangular, evaluate_triangle, AssetClass, DetectionContext,
    ExecutionBudget, ExecutionCoordinator, ExecutionSettings, FeeModel, GasPrice, Opportunity,
    OpportunityKind, Route, Thresholds,
};
use venue_arb::config::{AssetConfig, Catalogue, Config, VenueConfig};
use venue_arb::engine::ArbEngine;
use venue_arb::error::LegError;
use venue_arb::market::{
    FixedGasOracle, Pair, PriceFeed, PriceQuote, PriceSnapshot, StaticPriceProvider, VenueId,
    VenueKind,
};
use venue_arb::trading::{
    FailureKind, InMemoryLedger, Leg, LegExecutor, LegFill, OperationStatus, ScriptedFill,
    ScriptedLegExecutor,
};

// === Fixtures ===

fn venue(name: &str, fee: Decimal) -> VenueConfig {
    VenueConfig {
        name: name.to_string(),
        kind: VenueKind::Centralized,
        fee,
    }
}

fn asset(symbol: &str, price: Decimal) -> AssetConfig {
    AssetConfig {
        symbol: symbol.to_string(),
        class: AssetClass::Major,
        reference_price: price,
    }
}

/// Config with two venues at `fee`, one asset and no flash-loan catalogue.
fn two_venue_config(fee: Decimal) -> Config {
    let mut config = Config::default();
    config.catalogue = Catalogue {
        venues: vec![venue("A", fee), venue("B", fee)],
        assets: vec![asset("X", dec!(100))],
        flash_loan_protocols: vec![],
        strategies: vec![],
    };
    config.cex_poll_interval_ms = 10;
    config
}

fn settings() -> ExecutionSettings {
    ExecutionSettings {
        freshness_window: Duration::from_millis(3000),
        slippage_tolerance: dec!(0.005),
        leg_timeout: Duration::from_millis(500),
    }
}

fn fees() -> FeeModel {
    FeeModel::new(HashMap::new(), dec!(3000))
}

fn direct_opportunity(priced_at: OffsetDateTime) -> Opportunity {
    Opportunity::new(
        &fees(),
        Route::Direct {
            asset: "X".to_string(),
            buy_venue: VenueId::from("A"),
            sell_venue: VenueId::from("B"),
            buy_price: dec!(100),
            sell_price: dec!(102),
            buy_fee: dec!(0.001),
            sell_fee: dec!(0.001),
        },
        dec!(0.02),
        dec!(0.002),
        Decimal::ZERO,
        dec!(1000),
        priced_at,
        priced_at,
    )
    .unwrap()
}

fn coordinator_with(
    max: usize,
    executor: Arc<dyn LegExecutor>,
) -> (Arc<ExecutionCoordinator>, Arc<InMemoryLedger>) {
    let ledger = Arc::new(InMemoryLedger::new());
    let coordinator = Arc::new(ExecutionCoordinator::new(
        ExecutionBudget::new(max),
        executor,
        ledger.clone(),
        Arc::new(fees()),
        settings(),
    ));
    (coordinator, ledger)
}

fn engine(config: Config, provider: StaticPriceProvider) -> (Arc<ArbEngine>, Arc<InMemoryLedger>) {
    let ledger = Arc::new(InMemoryLedger::new());
    let engine = ArbEngine::new(
        config,
        Arc::new(provider),
        Arc::new(FixedGasOracle::new(dec!(30))),
        Arc::new(ScriptedLegExecutor::default()),
        ledger.clone(),
    );
    (Arc::new(engine), ledger)
}

// === Detection scenarios ===

#[tokio::test]
async fn direct_opportunity_detected_across_venues() {
    let provider = StaticPriceProvider::new()
        .with_quote("A", Pair::usd("X"), dec!(100), dec!(0.001))
        .with_quote("B", Pair::usd("X"), dec!(102), dec!(0.001));
    let (engine, _) = engine(two_venue_config(dec!(0.001)), provider);

    let found = engine.scan("X").await;

    assert_eq!(found.len(), 1);
    let opp = &found[0];
    assert_eq!(opp.kind, OpportunityKind::Direct);
    assert_eq!(opp.gross_profit_pct, dec!(0.02));
    assert_eq!(opp.total_fees, dec!(0.002));
    assert_eq!(opp.net_profit_pct, dec!(0.018));
    match &opp.route {
        Route::Direct {
            buy_venue,
            sell_venue,
            ..
        } => {
            assert_eq!(buy_venue.as_str(), "A");
            assert_eq!(sell_venue.as_str(), "B");
        }
        other => panic!("expected direct route, got {other:?}"),
    }
}

#[tokio::test]
async fn fees_eliminate_direct_opportunity() {
    let provider = StaticPriceProvider::new()
        .with_quote("A", Pair::usd("X"), dec!(100), dec!(0.015))
        .with_quote("B", Pair::usd("X"), dec!(102), dec!(0.015));
    let (engine, _) = engine(two_venue_config(dec!(0.015)), provider);

    assert!(engine.scan("X").await.is_empty());
}

#[test]
fn triangular_break_even_is_not_emitted() {
    // 0.9 * 1.0 * 1.12 - 1 = 0.008 gross; 0.003 fees; net 0.005 does not
    // exceed the 0.005 threshold.
    let estimate = evaluate_triangle(
        &fees(),
        [dec!(0.9), dec!(1.0), dec!(1.12)],
        [dec!(0.001); 3],
    )
    .unwrap();
    let thresholds = Thresholds::uniform(dec!(0.005));

    assert_eq!(estimate.net_profit_pct, dec!(0.005));
    assert!(!thresholds.clears(OpportunityKind::Triangular, estimate.net_profit_pct));
}

#[test]
fn triangular_detection_respects_threshold() {
    let quote = |pair: Pair, price: Decimal| PriceQuote {
        venue: VenueId::from("V"),
        pair,
        price,
        venue_fee: dec!(0.001),
        observed_at: OffsetDateTime::UNIX_EPOCH,
    };
    // X/USD = 0.8 so the last hop rate is exactly 1.25.
    let snapshot = PriceSnapshot::new(
        "X",
        vec![
            quote(Pair::usd("X"), dec!(0.8)),
            quote(Pair::new("X", "Y"), dec!(0.8)),
            quote(Pair::usd("Y"), dec!(1.008)),
        ],
        OffsetDateTime::UNIX_EPOCH,
    );
    let assets = vec!["X".to_string(), "Y".to_string()];
    let fees = fees();
    let mut ctx = DetectionContext {
        fees: &fees,
        thresholds: Thresholds::uniform(dec!(0.005)),
        tracked_assets: &assets,
        asset_class: AssetClass::Major,
        protocols: &[],
        strategies: &[],
        gas_price: GasPrice(dec!(30)),
        trade_size: dec!(1000),
    };

    // gross 0.8 * 1.008 * 1.25 - 1 = 0.008, net 0.005
    assert!(detect_triangular(&snapshot, &ctx).is_empty());

    ctx.thresholds = Thresholds::uniform(dec!(0.004));
    let found = detect_triangular(&snapshot, &ctx);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].net_profit_pct, dec!(0.005));
}

#[tokio::test]
async fn detection_is_deterministic_for_a_snapshot() {
    let provider = StaticPriceProvider::new()
        .with_quote("A", Pair::usd("X"), dec!(100), dec!(0.001))
        .with_quote("B", Pair::usd("X"), dec!(101.7), dec!(0.001))
        .with_quote("C", Pair::usd("X"), dec!(99.1), dec!(0.001));
    let feed = PriceFeed::new(Arc::new(provider), Duration::from_millis(200));
    let venues = vec![VenueId::from("A"), VenueId::from("B"), VenueId::from("C")];
    let snapshot = feed.get_prices(&venues, "X", &["X".to_string()]).await;

    let fees = fees();
    let ctx = DetectionContext {
        fees: &fees,
        thresholds: Thresholds::uniform(dec!(0.005)),
        tracked_assets: &[],
        asset_class: AssetClass::Major,
        protocols: &[],
        strategies: &[],
        gas_price: GasPrice(dec!(30)),
        trade_size: dec!(1000),
    };

    let first = detect_all(&snapshot, &ctx);
    let second = detect_all(&snapshot, &ctx);

    assert_eq!(first, second);
    assert!(first.iter().all(|o| o.discovered_at == snapshot.taken_at));
}

// === Price feed ===

#[tokio::test]
async fn failing_and_slow_venues_are_omitted() {
    let provider = StaticPriceProvider::new()
        .with_quote("A", Pair::usd("X"), dec!(100), dec!(0.001))
        .with_quote("B", Pair::usd("X"), dec!(101), dec!(0.001))
        .with_quote("C", Pair::usd("X"), dec!(102), dec!(0.001))
        .failing("B")
        .with_delay("C", Duration::from_secs(5));
    let feed = PriceFeed::new(Arc::new(provider), Duration::from_millis(100));
    let venues = vec![VenueId::from("A"), VenueId::from("B"), VenueId::from("C")];

    let start = Instant::now();
    let snapshot = feed.get_prices(&venues, "X", &[]).await;

    assert!(start.elapsed() < Duration::from_secs(2));
    assert_eq!(snapshot.venues(), vec![&VenueId::from("A")]);
}

// === Execution ===

#[tokio::test]
async fn concurrency_limit_discards_extra_opportunity() {
    let executor = ScriptedLegExecutor::default();
    let (coordinator, ledger) = coordinator_with(5, Arc::new(executor));

    let held: Vec<_> = (0..5)
        .map(|_| {
            coordinator
                .admit(direct_opportunity(OffsetDateTime::now_utc()))
                .unwrap()
        })
        .collect();
    assert_eq!(coordinator.budget().in_flight(), 5);

    assert!(coordinator
        .admit(direct_opportunity(OffsetDateTime::now_utc()))
        .is_none());
    assert_eq!(coordinator.budget().in_flight(), 5);
    assert!(ledger.is_empty());

    for admission in held {
        coordinator.execute(admission).await;
    }
    assert_eq!(coordinator.budget().in_flight(), 0);
    assert_eq!(ledger.completed().len(), 5);
}

/// Leg executor tracking how many legs run at once.
#[derive(Default)]
struct ProbeExecutor {
    active: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl LegExecutor for ProbeExecutor {
    async fn execute(&self, leg: &Leg) -> Result<LegFill, LegError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(LegFill {
            price: leg.expected_price,
            filled_at: OffsetDateTime::now_utc(),
        })
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn executing_never_exceeds_budget_under_contention() {
    let probe = Arc::new(ProbeExecutor::default());
    let (coordinator, ledger) = coordinator_with(3, probe.clone());

    let mut tasks = JoinSet::new();
    for _ in 0..40 {
        let coordinator = Arc::clone(&coordinator);
        tasks.spawn(async move {
            coordinator
                .submit(direct_opportunity(OffsetDateTime::now_utc()))
                .await
        });
    }

    let mut executed = 0;
    while let Some(result) = tasks.join_next().await {
        if result.unwrap().is_some() {
            executed += 1;
        }
    }

    assert!(probe.peak.load(Ordering::SeqCst) <= 3);
    assert!(executed >= 1);
    assert_eq!(ledger.len(), executed);
    assert_eq!(coordinator.stats().discarded as usize, 40 - executed);
    assert_eq!(coordinator.budget().in_flight(), 0);
}

#[tokio::test]
async fn failed_middle_leg_leaves_first_leg_and_skips_rest() {
    let executor = ScriptedLegExecutor::new([
        ScriptedFill::AtExpected,
        ScriptedFill::Fail(LegError::InsufficientLiquidity {
            venue: VenueId::from("V"),
        }),
    ]);
    let (coordinator, ledger) = coordinator_with(1, Arc::new(executor.clone()));

    let now = OffsetDateTime::now_utc();
    let opportunity = Opportunity::new(
        &fees(),
        Route::Triangular {
            venue: VenueId::from("V"),
            asset: "X".to_string(),
            intermediate: "Y".to_string(),
            rates: [dec!(0.5), dec!(204), dec!(0.01)],
            fees: [dec!(0.001); 3],
        },
        dec!(0.02),
        dec!(0.003),
        Decimal::ZERO,
        dec!(1000),
        now,
        now,
    )
    .unwrap();

    let admission = coordinator.admit(opportunity).expect("slot available");
    assert_eq!(coordinator.budget().in_flight(), 1);

    let op = coordinator.execute(admission).await;

    assert_eq!(coordinator.budget().in_flight(), 0);
    assert_eq!(op.status, OperationStatus::Failed);
    let failure = op.failure.as_ref().unwrap();
    assert_eq!(failure.kind, FailureKind::LegExecutionFailure);
    assert_eq!(failure.leg_index, Some(1));
    assert!(failure.detail.starts_with("leg 1 failed"));

    // Leg 0 stays executed, leg 2 never runs, nothing is reversed.
    assert_eq!(op.legs.len(), 2);
    assert!(op.legs[0].fill.is_some());
    assert!(op.legs[1].fill.is_none());
    let calls: Vec<usize> = executor.calls().iter().map(|l| l.index).collect();
    assert_eq!(calls, vec![0, 1]);

    assert_eq!(ledger.failed().len(), 1);
    assert!(op.actual_profit.is_none());
}

#[tokio::test]
async fn stale_opportunity_fails_without_legs() {
    let executor = ScriptedLegExecutor::default();
    let (coordinator, ledger) = coordinator_with(1, Arc::new(executor.clone()));
    let old = OffsetDateTime::now_utc() - time::Duration::seconds(30);

    let admission = coordinator.admit(direct_opportunity(old)).expect("slot available");
    assert_eq!(coordinator.budget().in_flight(), 1);

    let op = coordinator.execute(admission).await;

    assert_eq!(coordinator.budget().in_flight(), 0);
    assert_eq!(op.status, OperationStatus::Failed);
    assert_eq!(op.failure.unwrap().kind, FailureKind::Stale);
    assert!(executor.calls().is_empty());
    assert_eq!(ledger.len(), 1);
}

// === Engine ===

#[tokio::test]
async fn poll_once_admits_best_and_records_completion() {
    let provider = StaticPriceProvider::new()
        .with_quote("A", Pair::usd("X"), dec!(100), dec!(0.001))
        .with_quote("B", Pair::usd("X"), dec!(102), dec!(0.001));
    let (engine, ledger) = engine(two_venue_config(dec!(0.001)), provider);

    let mut tasks = JoinSet::new();
    let report = engine.poll_once("X", &mut tasks).await;

    assert_eq!(report.quotes, 2);
    assert_eq!(report.opportunities, 1);
    let id = report.admitted.expect("operation admitted");

    let op = tasks.join_next().await.unwrap().unwrap();
    assert_eq!(op.id, id);
    assert_eq!(op.status, OperationStatus::Completed);
    assert_eq!(op.actual_profit, Some(dec!(18)));
    assert_eq!(ledger.get(id).unwrap().status, OperationStatus::Completed);
}

#[tokio::test]
async fn poll_once_with_no_quotes_does_nothing() {
    let provider = StaticPriceProvider::new().failing("A").failing("B");
    let (engine, ledger) = engine(two_venue_config(dec!(0.001)), provider);

    let mut tasks = JoinSet::new();
    let report = engine.poll_once("X", &mut tasks).await;

    assert_eq!(report.quotes, 0);
    assert_eq!(report.admitted, None);
    assert!(tasks.is_empty());
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn poll_once_survives_extreme_quotes() {
    let provider = StaticPriceProvider::new()
        .with_quote("A", Pair::usd("X"), Decimal::new(1, 20), dec!(0.001))
        .with_quote("B", Pair::usd("X"), dec!(10000000000), dec!(0.001));
    let (engine, ledger) = engine(two_venue_config(dec!(0.001)), provider);

    let handle = tokio::spawn(async move {
        let mut tasks = JoinSet::new();
        engine.poll_once("X", &mut tasks).await
    });
    let report = handle.await.expect("poll cycle does not panic");

    assert_eq!(report.quotes, 2);
    assert_eq!(report.opportunities, 0);
    assert_eq!(report.admitted, None);
    assert!(ledger.is_empty());
}

#[tokio::test]
async fn run_stops_on_signal_and_drains_operations() {
    let provider = StaticPriceProvider::new()
        .with_quote("A", Pair::usd("X"), dec!(100), dec!(0.001))
        .with_quote("B", Pair::usd("X"), dec!(102), dec!(0.001));
    let (engine, ledger) = engine(two_venue_config(dec!(0.001)), provider);
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(Arc::clone(&engine).run(rx));
    tokio::time::sleep(Duration::from_millis(100)).await;
    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("engine stops")
        .unwrap();

    assert!(!ledger.is_empty());
    assert_eq!(engine.coordinator().budget().in_flight(), 0);
    assert!(ledger
        .all()
        .iter()
        .all(|op| op.status.is_terminal()));
}
