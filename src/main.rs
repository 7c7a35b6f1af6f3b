//! Multi-venue arbitrage engine entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use venue_arb::api::{create_router, AppState};
use venue_arb::config::Config;
use venue_arb::engine::ArbEngine;
use venue_arb::market::{SimulatedGasOracle, SimulatedPriceProvider};
use venue_arb::metrics;
use venue_arb::trading::{InMemoryLedger, SimulatedLegExecutor};
use venue_arb::utils::shutdown_signal;

/// Multi-venue arbitrage engine.
#[derive(Parser, Debug)]
#[command(name = "venue-arb")]
#[command(about = "Detects and executes direct, triangular and flash-loan arbitrage")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the engine (default).
    Run {
        /// HTTP server port for health/metrics; overrides PORT.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Fetch prices once for an asset and print ranked opportunities.
    Scan {
        /// Asset symbol, e.g. ETH.
        #[arg(short, long)]
        asset: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("venue_arb=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if args.json_logs {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer())
            .with(filter)
            .init();
    }

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(),
        Some(Command::Scan { asset }) => cmd_scan(&asset).await,
        Some(Command::Run { port }) => cmd_run(port).await,
        None => cmd_run(None).await,
    }
}

fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    Ok(config)
}

fn build_engine(config: Config, ledger: Arc<InMemoryLedger>) -> Arc<ArbEngine> {
    let provider = SimulatedPriceProvider::from_catalogue(&config.catalogue);
    let oracle = SimulatedGasOracle::new(config.fallback_gas_price_gwei);

    Arc::new(ArbEngine::new(
        config,
        Arc::new(provider),
        Arc::new(oracle),
        Arc::new(SimulatedLegExecutor::new()),
        ledger,
    ))
}

/// Check configuration validity.
fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("VENUE ARB - CONFIGURATION CHECK");
    println!("======================================================================");

    print!("Loading configuration... ");
    let config = match Config::load() {
        Ok(c) => {
            println!("OK");
            c
        }
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration load failed"));
        }
    };

    print!("Validating configuration... ");
    match config.validate() {
        Ok(()) => println!("OK"),
        Err(e) => {
            println!("FAILED");
            println!("  Error: {}", e);
            return Err(anyhow::anyhow!("Configuration validation failed"));
        }
    }

    let catalogue = &config.catalogue;
    println!("----------------------------------------------------------------------");
    println!("Configuration Summary:");
    println!(
        "  Catalogue: {}",
        config.catalogue_path.as_deref().unwrap_or("(built-in)")
    );
    println!(
        "  Thresholds: direct {} / triangular {} / flash loan {}",
        config.min_profit_direct, config.min_profit_triangular, config.min_profit_flash_loan
    );
    println!("  Max concurrent operations: {}", config.max_concurrent_operations);
    println!("  Trade size: ${}", config.trade_size_usd);
    println!("  Quote freshness: {}ms", config.quote_freshness_ms);
    println!("  Poll interval: {}ms", config.poll_interval().as_millis());
    println!("  Venues:");
    for venue in &catalogue.venues {
        println!("    {} ({}, fee {})", venue.name, venue.kind, venue.fee);
    }
    println!("  Assets:");
    for asset in &catalogue.assets {
        println!("    {} ({})", asset.symbol, asset.class);
    }
    println!(
        "  Flash-loan protocols: {}, strategies: {}",
        catalogue.flash_loan_protocols.len(),
        catalogue.strategies.len()
    );
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// One-shot scan of a single asset.
async fn cmd_scan(asset: &str) -> anyhow::Result<()> {
    let config = load_config()?;
    let engine = build_engine(config, Arc::new(InMemoryLedger::new()));

    let opportunities = engine.scan(asset).await;
    if opportunities.is_empty() {
        println!("No opportunities for {}", asset.to_uppercase());
        return Ok(());
    }

    for opp in &opportunities {
        println!(
            "{:<11} net {:>8.6}  ${:>10.2}  {}",
            opp.kind.to_string(),
            opp.net_profit_pct,
            opp.estimated_profit_abs,
            opp.route.describe()
        );
    }

    Ok(())
}

/// Run the engine and the HTTP server until a shutdown signal arrives.
async fn cmd_run(port_override: Option<u16>) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let config = load_config()?;
    let port = port_override.unwrap_or(config.port);

    let prometheus = PrometheusBuilder::new().install_recorder()?;
    metrics::init_metrics();

    info!(
        venues = config.catalogue.venues.len(),
        assets = config.catalogue.assets.len(),
        max_concurrent = config.max_concurrent_operations,
        "Configuration loaded successfully"
    );

    let ledger = Arc::new(InMemoryLedger::new());
    let engine = build_engine(config, Arc::clone(&ledger));

    let app_state = AppState::new(Arc::clone(&ledger), Arc::clone(engine.coordinator()))
        .with_prometheus(prometheus);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start HTTP server
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state.clone());
    let mut server_shutdown = shutdown_rx.clone();
    let server_handle = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.wait_for(|stop| *stop).await;
            })
            .await
    });

    info!("========================================");
    info!("ARBITRAGE ENGINE STARTED");
    info!("========================================");
    info!("Assets: {}", engine.assets().join(", "));

    let engine_handle = tokio::spawn(Arc::clone(&engine).run(shutdown_rx));
    app_state.set_ready(true);

    shutdown_signal().await;
    app_state.set_ready(false);
    if shutdown_tx.send(true).is_err() {
        warn!("Engine already stopped");
    }

    if let Err(e) = engine_handle.await {
        error!("Engine task failed: {}", e);
    }
    match server_handle.await {
        Ok(Err(e)) => error!("HTTP server error: {}", e),
        Err(e) => error!("HTTP server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    let summary = ledger.summary();
    info!("========================================");
    info!("ENGINE STOPPED - FINAL SUMMARY");
    info!("========================================");
    info!("Operations completed: {}", summary.completed);
    info!("Operations failed: {}", summary.failed);
    info!("Estimated profit: ${}", summary.estimated_profit);
    info!("Realized profit: ${}", summary.realized_profit);
    info!("========================================");

    Ok(())
}
