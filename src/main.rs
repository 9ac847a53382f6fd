//! Spot/futures basis arbitrage bot entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use basis_arb::api::{create_router, AppState};
use basis_arb::arbitrage::{ArbitrageEngine, EngineSettings};
use basis_arb::config::Config;
use basis_arb::market::{
    discover_tradable_pairs, BinanceClient, ExchangeGateway, SimulatedExchange, TradablePairs,
};
use basis_arb::metrics;
use basis_arb::pricebook::{start_all, PriceBook, ReconnectConfig};
use basis_arb::trading::{OrderExecutor, PositionManager};
use basis_arb::utils::shutdown_signal;

/// Capacity of the channel between trade feeds and the price book.
const TICK_CHANNEL_CAPACITY: usize = 4096;

/// Spot/futures basis arbitrage bot.
#[derive(Parser, Debug)]
#[command(name = "basis-arb")]
#[command(about = "Hedged spot/futures basis arbitrage on Binance")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the arbitrage bot (default).
    Run {
        /// Simulate orders and balances instead of trading.
        #[arg(long)]
        dry_run: Option<bool>,

        /// HTTP server port for health/metrics.
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Check configuration validity.
    CheckConfig,

    /// Query quote and base asset balances.
    CheckBalance,

    /// List symbols tradable on both spot and futures.
    ListPairs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        EnvFilter::new("basis_arb=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(args.json.then(|| fmt::layer().json()))
        .with((!args.json).then(fmt::layer))
        .with(filter)
        .init();

    match args.command {
        Some(Command::CheckConfig) => cmd_check_config(),
        Some(Command::CheckBalance) => cmd_check_balance().await,
        Some(Command::ListPairs) => cmd_list_pairs().await,
        Some(Command::Run { dry_run, port }) => cmd_run(dry_run, port).await,
        None => cmd_run(None, None).await,
    }
}

fn load_config() -> anyhow::Result<Config> {
    let config = Config::load().context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("configuration validation failed: {e}"))?;
    Ok(config)
}

/// Check configuration validity.
fn cmd_check_config() -> anyhow::Result<()> {
    println!("======================================================================");
    println!("BASIS ARB BOT - CONFIGURATION CHECK");
    println!("======================================================================");

    let config = load_config()?;

    println!("Configuration Summary:");
    println!("  Mode: {}", if config.dry_run { "SIMULATION" } else { "LIVE TRADING" });
    println!("  Spot REST: {}", config.binance_spot_url);
    println!("  Futures REST: {}", config.binance_futures_url);
    println!(
        "  API Key: {}",
        if config.binance_api_key.is_empty() { "missing" } else { "present" }
    );
    println!(
        "  Fees: spot {} / futures {}",
        config.spot_fee_rate, config.futures_fee_rate
    );
    println!(
        "  Take Profit: {}%  Stop Loss: {}%",
        config.take_profit_pct, config.stop_loss_pct
    );
    println!(
        "  Retries: {} x {}ms ({})",
        config.max_retries,
        config.retry_delay_ms,
        if config.retry_all_errors { "all errors" } else { "transient only" }
    );
    println!("  Quote Asset: {}", config.quote_asset);
    let filter = config.symbol_filter();
    if filter.is_empty() {
        println!("  Symbols: all tradable");
    } else {
        println!("  Symbols: {}", filter.len());
    }
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Query balances through the live gateway.
async fn cmd_check_balance() -> anyhow::Result<()> {
    let config = load_config()?;
    let client = BinanceClient::new(&config)?;

    println!("======================================================================");
    println!("BASIS ARB BOT - BALANCE CHECK");
    println!("======================================================================");

    for asset in [config.quote_asset.to_uppercase(), config.base_asset.to_uppercase()] {
        match client.get_balance(&asset).await {
            Ok(balance) => println!("  {asset}: {balance}"),
            Err(e) => println!("  {asset}: FAILED ({e})"),
        }
    }

    Ok(())
}

/// Print the symbols the bot would track.
async fn cmd_list_pairs() -> anyhow::Result<()> {
    let config = Config::load().context("failed to load configuration")?;
    let client = BinanceClient::new(&config)?;
    let pairs = discover_tradable_pairs(&client, &config.symbol_filter()).await?;

    for symbol in pairs.symbols() {
        let base = pairs.base_asset(symbol.as_str()).unwrap_or("?");
        println!("{symbol}\t{base}");
    }
    println!("{} tradable pairs", pairs.len());

    Ok(())
}

fn build_gateway(
    config: &Config,
    client: BinanceClient,
    pairs: &TradablePairs,
) -> Arc<dyn ExchangeGateway> {
    if config.dry_run {
        Arc::new(SimulatedExchange::new(pairs.clone(), config.sim_balance))
    } else {
        Arc::new(client)
    }
}

/// Run the arbitrage bot.
async fn cmd_run(dry_run_override: Option<bool>, port_override: Option<u16>) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let mut config = Config::load().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    if let Some(dry_run) = dry_run_override {
        config.dry_run = dry_run;
    }
    if let Some(port) = port_override {
        config.port = port;
    }

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    info!(
        mode = if config.dry_run { "SIMULATION" } else { "LIVE TRADING" },
        take_profit_pct = %config.take_profit_pct,
        stop_loss_pct = %config.stop_loss_pct,
        quote_asset = %config.quote_asset,
        "Configuration loaded"
    );

    let prometheus = match metrics::install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Prometheus recorder not installed");
            None
        }
    };

    // Pair discovery always uses the public endpoints.
    let client = BinanceClient::new(&config)?;
    let pairs = discover_tradable_pairs(&client, &config.symbol_filter()).await?;

    let gateway = build_gateway(&config, client, &pairs);
    let executor = OrderExecutor::new(gateway, config.retry_policy());

    let book = Arc::new(PriceBook::new(config.fee_schedule()));
    book.register_all(pairs.symbols());

    let positions = Arc::new(PositionManager::new(executor.clone(), config.thresholds()));
    let engine = ArbitrageEngine::new(
        Arc::clone(&book),
        Arc::clone(&positions),
        executor,
        pairs.clone(),
        EngineSettings::from_config(&config),
    );

    let mut app_state = AppState::new(
        Arc::clone(&book),
        Arc::clone(&positions),
        engine.stats(),
        config.dry_run,
    );
    if let Some(handle) = prometheus {
        app_state = app_state.with_prometheus(handle);
    }

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    info!("HTTP server listening on {}", addr);

    let router = create_router(app_state.clone());
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    });

    let (tx, rx) = mpsc::channel(TICK_CHANNEL_CAPACITY);
    let ingest = tokio::spawn(Arc::clone(&book).ingest(rx));
    let feeds = start_all(
        &pairs,
        &config.binance_spot_ws_url,
        &config.binance_futures_ws_url,
        &ReconnectConfig::from_config(&config),
        &tx,
    )
    .await
    .map_err(|e| {
        error!(error = %e, "Trade streams unavailable");
        e
    })?;
    drop(tx);
    app_state.set_ready(true);

    let monitor = tokio::spawn(Arc::clone(&positions).run(Arc::clone(&book), config.monitor_interval()));
    let decisions = tokio::spawn(engine.run());

    info!("========================================");
    info!("BASIS ARBITRAGE BOT STARTED");
    info!(tracked = pairs.len(), "Watching spot/futures pairs");
    info!("========================================");

    shutdown_signal().await;
    app_state.set_ready(false);

    decisions.abort();
    monitor.abort();
    for feed in &feeds {
        feed.abort();
    }
    ingest.abort();

    let open = positions.positions();
    if !open.is_empty() {
        warn!(count = open.len(), "Exiting with open positions");
    }

    if let Ok(Err(e)) = server.await {
        error!(error = %e, "HTTP server error");
    }

    info!("Shutdown complete");
    Ok(())
}
