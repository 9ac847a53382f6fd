//! Hedged position tracking and exit triggers.
//!
//! A symbol moves `NONE -> OPEN -> CLOSING -> NONE`. Closing removes the
//! position whether or not the closing legs succeed.

use std::sync::Arc;
use std::time::Duration;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use strum::{Display, EnumString};
use time::OffsetDateTime;
use tracing::{debug, error, info, instrument, warn};

use super::execution::{LegResults, OrderExecutor};
use crate::arbitrage::calculator::spread;
use crate::error::PositionError;
use crate::market::Symbol;
use crate::metrics;
use crate::pricebook::PriceBook;

/// Lifecycle state of an existing position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PositionState {
    /// Both legs held, being monitored.
    Open,
    /// Closing orders in flight.
    Closing,
}

/// A hedged spot-long / futures-short position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    /// Symbol held.
    pub symbol: Symbol,
    /// Base-asset quantity of each leg.
    pub quantity: Decimal,
    /// Futures minus spot at open.
    pub initial_spread: Decimal,
    /// Spot price at open.
    pub spot_at_open: Decimal,
    /// Futures price at open.
    pub futures_at_open: Decimal,
    /// When the position was recorded.
    pub opened_at: OffsetDateTime,
    /// Lifecycle state.
    pub state: PositionState,
}

/// Exit thresholds as percentages of the initial spread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TriggerThresholds {
    /// Take-profit percentage.
    pub take_profit_pct: Decimal,
    /// Stop-loss percentage.
    pub stop_loss_pct: Decimal,
}

impl Default for TriggerThresholds {
    fn default() -> Self {
        Self {
            take_profit_pct: Decimal::TWO,
            stop_loss_pct: Decimal::ONE,
        }
    }
}

impl TriggerThresholds {
    /// Profit at or above which the position is taken.
    pub fn take_profit_level(&self, initial_spread: Decimal) -> Decimal {
        initial_spread * self.take_profit_pct / Decimal::ONE_HUNDRED
    }

    /// Profit at or below which the position is stopped.
    pub fn stop_loss_level(&self, initial_spread: Decimal) -> Decimal {
        initial_spread * self.stop_loss_pct / Decimal::ONE_HUNDRED
    }
}

/// Exit reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Trigger {
    /// Profit reached the take-profit level.
    TakeProfit,
    /// Profit fell to the stop-loss level.
    StopLoss,
}

/// Change in spread since open.
pub fn current_profit(initial_spread: Decimal, spot: Decimal, futures: Decimal) -> Decimal {
    spread(spot, futures) - initial_spread
}

/// Exit decision for a position. Take-profit wins when both levels are hit.
///
/// The stop-loss level is `initial_spread * stop_loss_pct / 100`, compared
/// without a sign flip.
pub fn evaluate_trigger(
    initial_spread: Decimal,
    spot: Decimal,
    futures: Decimal,
    thresholds: &TriggerThresholds,
) -> Option<Trigger> {
    let profit = current_profit(initial_spread, spot, futures);

    if profit >= thresholds.take_profit_level(initial_spread) {
        Some(Trigger::TakeProfit)
    } else if profit <= thresholds.stop_loss_level(initial_spread) {
        Some(Trigger::StopLoss)
    } else {
        None
    }
}

/// A position that has been closed and removed.
#[derive(Debug)]
pub struct ClosedPosition {
    /// The position as it was when closing began.
    pub position: Position,
    /// Why it was closed.
    pub trigger: Trigger,
    /// Spot price that fired the trigger.
    pub spot: Decimal,
    /// Futures price that fired the trigger.
    pub futures: Decimal,
    /// Profit that fired the trigger.
    pub current_profit: Decimal,
    /// Closing order results.
    pub legs: LegResults,
}

/// Owns open positions and closes them when a trigger fires.
#[derive(Debug)]
pub struct PositionManager {
    positions: DashMap<Symbol, Position>,
    executor: OrderExecutor,
    thresholds: TriggerThresholds,
}

impl PositionManager {
    /// Create an empty manager.
    pub fn new(executor: OrderExecutor, thresholds: TriggerThresholds) -> Self {
        Self {
            positions: DashMap::new(),
            executor,
            thresholds,
        }
    }

    /// Record a new position from its opening prices.
    pub fn open(
        &self,
        symbol: &Symbol,
        quantity: Decimal,
        spot: Decimal,
        futures: Decimal,
    ) -> Result<Position, PositionError> {
        if quantity <= Decimal::ZERO {
            return Err(PositionError::InvalidQuantity {
                symbol: symbol.clone(),
                quantity,
            });
        }

        match self.positions.entry(symbol.clone()) {
            Entry::Occupied(_) => Err(PositionError::AlreadyOpen {
                symbol: symbol.clone(),
            }),
            Entry::Vacant(slot) => {
                let position = Position {
                    symbol: symbol.clone(),
                    quantity,
                    initial_spread: spread(spot, futures),
                    spot_at_open: spot,
                    futures_at_open: futures,
                    opened_at: OffsetDateTime::now_utc(),
                    state: PositionState::Open,
                };
                slot.insert(position.clone());
                metrics::inc_positions_opened();
                metrics::set_open_positions(self.positions.len());

                info!(
                    symbol = %symbol,
                    quantity = %quantity,
                    initial_spread = %position.initial_spread,
                    "Position opened"
                );
                Ok(position)
            }
        }
    }

    /// Copy of the position for a symbol.
    pub fn get(&self, symbol: &str) -> Option<Position> {
        self.positions.get(symbol).map(|p| p.clone())
    }

    /// Whether a position exists for a symbol, in any state.
    pub fn is_open(&self, symbol: &str) -> bool {
        self.positions.contains_key(symbol)
    }

    /// All positions, ordered by symbol.
    pub fn positions(&self) -> Vec<Position> {
        let mut positions: Vec<_> = self.positions.iter().map(|p| p.value().clone()).collect();
        positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        positions
    }

    /// Number of positions.
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether no position exists.
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Open positions whose trigger fires at current prices.
    ///
    /// Positions without both prices are skipped.
    fn due_for_close(&self, book: &PriceBook) -> Vec<(Symbol, Trigger, Decimal, Decimal)> {
        let mut due: Vec<_> = self
            .positions
            .iter()
            .filter(|p| p.state == PositionState::Open)
            .filter_map(|p| {
                let Some((spot, futures)) = book.read(p.symbol.as_str()).and_then(|e| e.prices())
                else {
                    debug!(symbol = %p.symbol, "Prices unavailable, skipping position");
                    return None;
                };
                evaluate_trigger(p.initial_spread, spot, futures, &self.thresholds)
                    .map(|trigger| (p.symbol.clone(), trigger, spot, futures))
            })
            .collect();
        due.sort_by(|a, b| a.0.cmp(&b.0));
        due
    }

    /// One monitoring pass: close every position whose trigger fires.
    #[instrument(skip(self, book), fields(positions = self.len()))]
    pub async fn monitor_once(&self, book: &PriceBook) -> Vec<ClosedPosition> {
        let mut closed = Vec::new();
        for (symbol, trigger, spot, futures) in self.due_for_close(book) {
            if let Some(position) = self.close(&symbol, trigger, spot, futures).await {
                closed.push(position);
            }
        }
        closed
    }

    /// Close a position: mark it closing, send both closing legs, remove it.
    ///
    /// Returns `None` if no open position exists for the symbol.
    pub async fn close(
        &self,
        symbol: &Symbol,
        trigger: Trigger,
        spot: Decimal,
        futures: Decimal,
    ) -> Option<ClosedPosition> {
        let position = {
            let mut entry = self.positions.get_mut(symbol.as_str())?;
            if entry.state != PositionState::Open {
                return None;
            }
            entry.state = PositionState::Closing;
            entry.clone()
        };

        let profit = current_profit(position.initial_spread, spot, futures);
        info!(
            symbol = %symbol,
            trigger = %trigger,
            spot = %spot,
            futures = %futures,
            initial_spread = %position.initial_spread,
            profit = %profit,
            "Closing position"
        );

        let legs = self.executor.close_position(symbol, position.quantity).await;

        self.positions.remove(symbol.as_str());
        metrics::inc_positions_closed(&trigger.to_string());
        metrics::set_open_positions(self.positions.len());

        match (&legs.spot, &legs.futures) {
            (Ok(spot_order), Ok(futures_order)) => info!(
                symbol = %symbol,
                spot_order = %spot_order.order_id,
                futures_order = %futures_order.order_id,
                "Position closed"
            ),
            (spot_result, futures_result) => error!(
                symbol = %symbol,
                spot_error = ?spot_result.as_ref().err(),
                futures_error = ?futures_result.as_ref().err(),
                "Position removed with failed closing legs"
            ),
        }

        Some(ClosedPosition {
            position,
            trigger,
            spot,
            futures,
            current_profit: profit,
            legs,
        })
    }

    /// Monitor positions every `interval` until the task is dropped.
    pub async fn run(self: Arc<Self>, book: Arc<PriceBook>, interval: Duration) {
        info!(interval_s = interval.as_secs(), "Position monitor started");
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let closed = self.monitor_once(&book).await;
            if !closed.is_empty() {
                warn!(
                    closed = closed.len(),
                    remaining = self.len(),
                    "Positions closed this pass"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{MarketKind, SimulatedExchange, SymbolInfo, TradablePairs};
    use crate::trading::execution::RetryPolicy;
    use crate::trading::order::{OrderRequest, Side};
    use rust_decimal_macros::dec;

    fn btc() -> Symbol {
        Symbol::new("BTCUSDT")
    }

    fn setup() -> (Arc<SimulatedExchange>, PositionManager) {
        let pairs = TradablePairs::from_infos(vec![SymbolInfo {
            symbol: btc(),
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
        }]);
        let exchange = Arc::new(SimulatedExchange::new(pairs, dec!(1000)));
        let executor = OrderExecutor::new(
            exchange.clone(),
            RetryPolicy::new(5, Duration::from_millis(10)),
        );
        (exchange, PositionManager::new(executor, TriggerThresholds::default()))
    }

    fn book_with(spot: Decimal, futures: Decimal) -> PriceBook {
        let book = PriceBook::default();
        book.update(&btc(), MarketKind::Spot, spot);
        book.update(&btc(), MarketKind::Futures, futures);
        book
    }

    #[test]
    fn take_profit_fires_at_threshold() {
        let thresholds = TriggerThresholds::default();
        assert_eq!(thresholds.take_profit_level(dec!(2)), dec!(0.04));

        assert_eq!(
            evaluate_trigger(dec!(2), dec!(100), dec!(102.04), &thresholds),
            Some(Trigger::TakeProfit)
        );
        assert_eq!(
            evaluate_trigger(dec!(2), dec!(100), dec!(102.03), &thresholds),
            None
        );
    }

    #[test]
    fn stop_loss_uses_unsigned_level() {
        let thresholds = TriggerThresholds::default();
        assert_eq!(thresholds.stop_loss_level(dec!(2)), dec!(0.02));

        assert_eq!(
            evaluate_trigger(dec!(2), dec!(100), dec!(102.02), &thresholds),
            Some(Trigger::StopLoss)
        );
        assert_eq!(
            evaluate_trigger(dec!(2), dec!(100), dec!(101), &thresholds),
            Some(Trigger::StopLoss)
        );
    }

    #[test]
    fn take_profit_checked_first() {
        let thresholds = TriggerThresholds {
            take_profit_pct: dec!(1),
            stop_loss_pct: dec!(5),
        };
        assert_eq!(
            evaluate_trigger(dec!(2), dec!(100), dec!(102.05), &thresholds),
            Some(Trigger::TakeProfit)
        );
    }

    #[test]
    fn trigger_is_pure() {
        let thresholds = TriggerThresholds::default();
        let first = evaluate_trigger(dec!(3), dec!(50), dec!(53.5), &thresholds);
        for _ in 0..3 {
            assert_eq!(evaluate_trigger(dec!(3), dec!(50), dec!(53.5), &thresholds), first);
        }
    }

    #[test]
    fn open_records_initial_spread() {
        let (_, manager) = setup();
        let position = manager.open(&btc(), dec!(0.5), dec!(100), dec!(102)).unwrap();

        assert_eq!(position.initial_spread, dec!(2));
        assert_eq!(position.state, PositionState::Open);
        assert!(manager.is_open("BTCUSDT"));
    }

    #[test]
    fn second_open_for_symbol_is_rejected() {
        let (_, manager) = setup();
        manager.open(&btc(), dec!(0.5), dec!(100), dec!(102)).unwrap();

        assert_eq!(
            manager.open(&btc(), dec!(1), dec!(100), dec!(103)),
            Err(PositionError::AlreadyOpen { symbol: btc() })
        );
        assert_eq!(manager.len(), 1);
        assert_eq!(manager.get("BTCUSDT").unwrap().quantity, dec!(0.5));
    }

    #[test]
    fn zero_quantity_is_rejected() {
        let (_, manager) = setup();
        assert!(matches!(
            manager.open(&btc(), Decimal::ZERO, dec!(100), dec!(102)),
            Err(PositionError::InvalidQuantity { .. })
        ));
    }

    #[tokio::test]
    async fn monitor_skips_positions_without_prices() {
        let (exchange, manager) = setup();
        manager.open(&btc(), dec!(0.5), dec!(100), dec!(102)).unwrap();

        let book = PriceBook::default();
        book.update(&btc(), MarketKind::Spot, dec!(100));

        assert!(manager.monitor_once(&book).await.is_empty());
        assert!(manager.is_open("BTCUSDT"));
        assert_eq!(exchange.order_calls(), 0);
    }

    #[tokio::test]
    async fn monitor_holds_between_levels() {
        let (exchange, manager) = setup();
        manager.open(&btc(), dec!(0.5), dec!(100), dec!(102)).unwrap();

        let closed = manager.monitor_once(&book_with(dec!(100), dec!(102.03))).await;

        assert!(closed.is_empty());
        assert_eq!(exchange.order_calls(), 0);
    }

    #[tokio::test]
    async fn take_profit_closes_and_removes() {
        let (exchange, manager) = setup();
        manager.open(&btc(), dec!(0.5), dec!(100), dec!(102)).unwrap();

        let closed = manager.monitor_once(&book_with(dec!(100), dec!(102.05))).await;

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].trigger, Trigger::TakeProfit);
        assert_eq!(closed[0].current_profit, dec!(0.05));
        assert!(closed[0].legs.both_ok());
        assert!(!manager.is_open("BTCUSDT"));
        assert_eq!(
            exchange.placed_orders().await,
            vec![
                OrderRequest::market(MarketKind::Spot, btc(), Side::Sell, dec!(0.5)),
                OrderRequest::market(MarketKind::Futures, btc(), Side::Buy, dec!(0.5)),
            ]
        );
    }

    #[tokio::test]
    async fn removal_does_not_depend_on_closing_legs() {
        let (exchange, manager) = setup();
        exchange.fail_orders_always(MarketKind::Spot);
        exchange.fail_orders_always(MarketKind::Futures);
        manager.open(&btc(), dec!(0.5), dec!(100), dec!(102)).unwrap();

        let closed = manager.monitor_once(&book_with(dec!(100), dec!(101))).await;

        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].trigger, Trigger::StopLoss);
        assert!(closed[0].legs.spot.is_err());
        assert!(closed[0].legs.futures.is_err());
        assert!(manager.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn monitor_loop_closes_within_one_interval() {
        let (exchange, manager) = setup();
        let manager = Arc::new(manager);
        manager.open(&btc(), dec!(10), dec!(100), dec!(102)).unwrap();
        let book = Arc::new(book_with(dec!(100), dec!(102.03)));
        let task = tokio::spawn(Arc::clone(&manager).run(Arc::clone(&book), Duration::from_secs(5)));

        tokio::time::sleep(Duration::from_millis(1000)).await;
        assert!(manager.is_open("BTCUSDT"));
        book.update(&btc(), MarketKind::Futures, dec!(102.04));

        tokio::time::sleep(Duration::from_millis(3900)).await;
        assert!(manager.is_open("BTCUSDT"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(manager.is_empty());
        assert_eq!(exchange.order_calls(), 2);
        task.abort();
    }

    #[tokio::test]
    async fn close_of_missing_position_is_none() {
        let (_, manager) = setup();
        assert!(manager
            .close(&btc(), Trigger::TakeProfit, dec!(100), dec!(102))
            .await
            .is_none());
    }
}
