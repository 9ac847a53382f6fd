//! Integration tests for the basis arbitrage bot.
//!
//! Most tests drive the full pipeline (tick channel, price book, decision
//! loop, position monitor) against the simulated exchange. The `#[ignore]`d
//! tests hit the public Binance endpoints.
//! Run them with: cargo test --test integration -- --ignored

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

use basis_arb::arbitrage::{ArbitrageEngine, CycleOutcome, EngineSettings, FeeSchedule};
use basis_arb::config::Config;
use basis_arb::error::TradingError;
use basis_arb::market::{
    discover_tradable_pairs, BinanceClient, ExchangeGateway, MarketKind, SimulatedExchange,
    Symbol, SymbolInfo, TradablePairs,
};
use basis_arb::pricebook::{PriceBook, PriceTick, TradeFeed};
use basis_arb::trading::{
    OrderExecutor, PositionManager, RetryPolicy, Side, Trigger, TriggerThresholds,
};

struct Bot {
    exchange: Arc<SimulatedExchange>,
    book: Arc<PriceBook>,
    positions: Arc<PositionManager>,
    engine: ArbitrageEngine,
}

fn pair(symbol: &str, base: &str) -> SymbolInfo {
    SymbolInfo {
        symbol: Symbol::new(symbol),
        base_asset: base.to_string(),
        quote_asset: "USDT".to_string(),
    }
}

fn bot(balance: Decimal, policy: RetryPolicy) -> Bot {
    let pairs = TradablePairs::from_infos(vec![pair("BTCUSDT", "BTC"), pair("ETHUSDT", "ETH")]);
    let exchange = Arc::new(SimulatedExchange::new(pairs.clone(), balance));
    let executor = OrderExecutor::new(exchange.clone(), policy);

    let book = Arc::new(PriceBook::new(FeeSchedule::default()));
    book.register_all(pairs.symbols());

    let positions = Arc::new(PositionManager::new(
        executor.clone(),
        TriggerThresholds::default(),
    ));
    let engine = ArbitrageEngine::new(
        book.clone(),
        positions.clone(),
        executor,
        pairs,
        EngineSettings {
            quote_asset: "USDT".to_string(),
            fallback_base_asset: "BTC".to_string(),
            decision_interval: Duration::from_secs(5),
            cooldown: Duration::from_secs(10),
        },
    );

    Bot {
        exchange,
        book,
        positions,
        engine,
    }
}

/// Push ticks through the channel and wait until the book has applied them.
async fn feed(book: &Arc<PriceBook>, ticks: &[(&str, MarketKind, Decimal)]) {
    let (tx, rx) = mpsc::channel(16);
    let ingest = tokio::spawn(Arc::clone(book).ingest(rx));
    for (symbol, market, price) in ticks {
        tx.send(PriceTick {
            symbol: Symbol::new(symbol),
            market: *market,
            price: *price,
        })
        .await
        .unwrap();
    }
    drop(tx);
    ingest.await.unwrap();
}

#[tokio::test]
async fn ticks_flow_into_profit() {
    let bot = bot(dec!(1000), RetryPolicy::new(5, Duration::ZERO));

    feed(&bot.book, &[("BTCUSDT", MarketKind::Spot, dec!(100))]).await;
    let entry = bot.book.read("BTCUSDT").unwrap();
    assert_eq!(entry.potential_profit, None);

    feed(&bot.book, &[("BTCUSDT", MarketKind::Futures, dec!(102))]).await;
    let entry = bot.book.read("BTCUSDT").unwrap();
    assert_eq!(entry.potential_profit, Some(dec!(1.874)));
    assert_eq!(bot.book.ready_count(), 1);
}

#[tokio::test]
async fn opens_best_symbol_then_takes_profit() {
    let bot = bot(dec!(1000), RetryPolicy::new(5, Duration::ZERO));
    feed(
        &bot.book,
        &[
            ("BTCUSDT", MarketKind::Spot, dec!(100)),
            ("BTCUSDT", MarketKind::Futures, dec!(102)),
            ("ETHUSDT", MarketKind::Spot, dec!(50)),
            ("ETHUSDT", MarketKind::Futures, dec!(50.5)),
        ],
    )
    .await;

    let outcome = bot.engine.run_cycle().await;
    let CycleOutcome::Opened { position } = outcome else {
        panic!("expected open, got {:?}", outcome);
    };
    assert_eq!(position.symbol, Symbol::new("BTCUSDT"));
    assert_eq!(position.quantity, dec!(10));
    assert!(!bot.positions.is_open("ETHUSDT"));

    // Spread moves from 2 to 2.03: profit 0.03 sits between both levels.
    feed(&bot.book, &[("BTCUSDT", MarketKind::Futures, dec!(102.03))]).await;
    assert!(bot.positions.monitor_once(&bot.book).await.is_empty());
    assert!(bot.positions.is_open("BTCUSDT"));

    // Spread 2.04: profit 0.04 reaches take-profit.
    feed(&bot.book, &[("BTCUSDT", MarketKind::Futures, dec!(102.04))]).await;
    let closed = bot.positions.monitor_once(&bot.book).await;

    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].trigger, Trigger::TakeProfit);
    assert_eq!(closed[0].current_profit, dec!(0.04));
    assert!(closed[0].legs.both_ok());
    assert!(bot.positions.is_empty());

    let orders = bot.exchange.placed_orders().await;
    assert_eq!(orders.len(), 4);
    let closing: Vec<_> = orders[2..]
        .iter()
        .map(|o| (o.market, o.side, o.quantity))
        .collect();
    assert_eq!(
        closing,
        vec![
            (MarketKind::Spot, Side::Sell, dec!(10)),
            (MarketKind::Futures, Side::Buy, dec!(10)),
        ]
    );
}

#[tokio::test]
async fn open_position_blocks_reentry() {
    let bot = bot(dec!(1000), RetryPolicy::new(5, Duration::ZERO));
    feed(
        &bot.book,
        &[
            ("BTCUSDT", MarketKind::Spot, dec!(100)),
            ("BTCUSDT", MarketKind::Futures, dec!(102)),
        ],
    )
    .await;

    assert!(matches!(
        bot.engine.run_cycle().await,
        CycleOutcome::Opened { .. }
    ));
    assert_eq!(
        bot.engine.run_cycle().await,
        CycleOutcome::AlreadyOpen {
            symbol: Symbol::new("BTCUSDT")
        }
    );
    assert_eq!(bot.exchange.placed_orders().await.len(), 2);
}

#[tokio::test]
async fn empty_quote_balance_defers_trade() {
    let bot = bot(dec!(1000), RetryPolicy::new(5, Duration::ZERO));
    bot.exchange.set_balance("USDT", Decimal::ZERO);
    feed(
        &bot.book,
        &[
            ("BTCUSDT", MarketKind::Spot, dec!(100)),
            ("BTCUSDT", MarketKind::Futures, dec!(102)),
        ],
    )
    .await;

    let outcome = bot.engine.run_cycle().await;

    assert!(matches!(outcome, CycleOutcome::InsufficientBalance { .. }));
    assert!(outcome.needs_cooldown());
    assert_eq!(bot.exchange.order_calls(), 0);
    assert!(bot.positions.is_empty());
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_create_no_position() {
    let bot = bot(dec!(1000), RetryPolicy::default());
    bot.exchange.fail_orders_always(MarketKind::Spot);
    bot.exchange.fail_orders_always(MarketKind::Futures);
    feed(
        &bot.book,
        &[
            ("BTCUSDT", MarketKind::Spot, dec!(100)),
            ("BTCUSDT", MarketKind::Futures, dec!(102)),
        ],
    )
    .await;

    let outcome = bot.engine.run_cycle().await;

    assert_eq!(
        outcome,
        CycleOutcome::OpenFailed {
            symbol: Symbol::new("BTCUSDT"),
            spot_filled: false,
            futures_filled: false,
        }
    );
    assert_eq!(bot.exchange.order_calls(), 10);
    assert!(bot.positions.is_empty());
    assert_eq!(bot.engine.stats().snapshot().open_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn failed_closing_legs_still_remove_position() {
    let bot = bot(dec!(1000), RetryPolicy::new(2, Duration::from_millis(100)));
    feed(
        &bot.book,
        &[
            ("BTCUSDT", MarketKind::Spot, dec!(100)),
            ("BTCUSDT", MarketKind::Futures, dec!(102)),
        ],
    )
    .await;
    assert!(matches!(
        bot.engine.run_cycle().await,
        CycleOutcome::Opened { .. }
    ));

    bot.exchange.fail_orders_always(MarketKind::Futures);
    feed(&bot.book, &[("BTCUSDT", MarketKind::Futures, dec!(102.5))]).await;
    let closed = bot.positions.monitor_once(&bot.book).await;

    assert_eq!(closed.len(), 1);
    assert!(closed[0].legs.spot.is_ok());
    assert!(matches!(
        closed[0].legs.futures,
        Err(TradingError::RetriesExhausted { attempts: 2, .. })
    ));
    assert!(!bot.positions.is_open("BTCUSDT"));
}

#[tokio::test]
#[ignore = "requires network access"]
async fn discovers_pairs_from_binance() {
    let config = Config::from_pairs(Vec::new()).unwrap();
    let client = BinanceClient::new(&config).unwrap();

    let pairs = discover_tradable_pairs(&client, &[Symbol::new("BTCUSDT")])
        .await
        .unwrap();

    assert!(pairs.contains("BTCUSDT"));
    assert_eq!(pairs.base_asset("BTCUSDT"), Some("BTC"));
}

#[tokio::test]
#[ignore = "requires network access"]
async fn receives_live_trade_ticks() {
    let config = Config::from_pairs(Vec::new()).unwrap();
    let (tx, mut rx) = mpsc::channel(8);
    let feed = TradeFeed::new(
        Symbol::new("BTCUSDT"),
        MarketKind::Spot,
        config.binance_spot_ws_url.clone(),
    )
    .start(tx)
    .await
    .unwrap();

    let tick = tokio::time::timeout(Duration::from_secs(30), rx.recv())
        .await
        .unwrap()
        .unwrap();
    feed.abort();

    assert_eq!(tick.symbol, Symbol::new("BTCUSDT"));
    assert!(tick.price > Decimal::ZERO);
}

#[tokio::test]
#[ignore = "requires BINANCE_API_KEY and BINANCE_API_SECRET"]
async fn reads_live_balance() {
    let Ok(config) = Config::load() else {
        println!("Skipping: configuration not loadable");
        return;
    };
    if config.binance_api_key.is_empty() {
        println!("Skipping: BINANCE_API_KEY not set");
        return;
    }
    let client = BinanceClient::new(&config).unwrap();

    let balance = client.get_balance("USDT").await.unwrap();

    assert!(balance >= Decimal::ZERO);
}
