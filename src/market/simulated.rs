//! In-process exchange used for dry runs and tests.
//!
//! Orders fill immediately at whatever quantity was requested and balances are
//! static. Failures can be injected per market to exercise the retry paths.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::ExchangeError;
use crate::trading::order::{Order, OrderRequest, OrderStatus};

use super::gateway::ExchangeGateway;
use super::types::{MarketKind, TradablePairs};

/// Error code reported for injected failures (Binance "internal disconnect").
const SIMULATED_FAILURE_CODE: i64 = -1001;

/// Simulated exchange backed by in-memory state.
#[derive(Debug)]
pub struct SimulatedExchange {
    /// Pairs reported as tradable.
    pairs: TradablePairs,
    /// Balance reported for assets without an explicit entry.
    default_balance: Decimal,
    /// Explicit balances by upper-case asset.
    balances: DashMap<String, Decimal>,
    /// Remaining injected order failures per market (`u32::MAX` = always).
    order_failures: DashMap<MarketKind, u32>,
    /// Remaining injected balance failures (`u32::MAX` = always).
    balance_failures: AtomicU32,
    /// Accepted orders in submission order.
    orders: Mutex<Vec<OrderRequest>>,
    /// Order submissions, including failed ones.
    order_calls: AtomicU32,
    /// Balance queries, including failed ones.
    balance_calls: AtomicU32,
    /// Next order ID.
    next_id: AtomicU64,
}

impl SimulatedExchange {
    /// Create a simulated exchange reporting `default_balance` for every asset.
    pub fn new(pairs: TradablePairs, default_balance: Decimal) -> Self {
        info!(
            pairs = pairs.len(),
            balance = %default_balance,
            "Simulated exchange ready (no real orders will be placed)"
        );
        Self {
            pairs,
            default_balance,
            balances: DashMap::new(),
            order_failures: DashMap::new(),
            balance_failures: AtomicU32::new(0),
            orders: Mutex::new(Vec::new()),
            order_calls: AtomicU32::new(0),
            balance_calls: AtomicU32::new(0),
            next_id: AtomicU64::new(1),
        }
    }

    /// Set the balance of one asset.
    pub fn set_balance(&self, asset: &str, amount: Decimal) {
        self.balances.insert(asset.to_uppercase(), amount);
    }

    /// Fail the next `times` orders on `market`.
    pub fn fail_orders(&self, market: MarketKind, times: u32) {
        self.order_failures.insert(market, times);
    }

    /// Fail every order on `market`.
    pub fn fail_orders_always(&self, market: MarketKind) {
        self.order_failures.insert(market, u32::MAX);
    }

    /// Fail the next `times` balance queries.
    pub fn fail_balance(&self, times: u32) {
        self.balance_failures.store(times, Ordering::SeqCst);
    }

    /// Number of order submissions seen, successful or not.
    pub fn order_calls(&self) -> u32 {
        self.order_calls.load(Ordering::SeqCst)
    }

    /// Number of balance queries seen, successful or not.
    pub fn balance_calls(&self) -> u32 {
        self.balance_calls.load(Ordering::SeqCst)
    }

    /// Accepted orders so far.
    pub async fn placed_orders(&self) -> Vec<OrderRequest> {
        self.orders.lock().await.clone()
    }

    fn take_order_failure(&self, market: MarketKind) -> bool {
        match self.order_failures.get_mut(&market) {
            Some(mut remaining) if *remaining > 0 => {
                if *remaining != u32::MAX {
                    *remaining -= 1;
                }
                true
            }
            _ => false,
        }
    }

    fn take_balance_failure(&self) -> bool {
        self.balance_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |remaining| match remaining {
                0 => None,
                u32::MAX => Some(u32::MAX),
                n => Some(n - 1),
            })
            .is_ok()
    }

    fn simulated_failure() -> ExchangeError {
        ExchangeError::Api {
            code: SIMULATED_FAILURE_CODE,
            msg: "simulated failure".to_string(),
        }
    }
}

#[async_trait]
impl ExchangeGateway for SimulatedExchange {
    async fn fetch_tradable_pairs(&self) -> Result<TradablePairs, ExchangeError> {
        Ok(self.pairs.clone())
    }

    async fn get_balance(&self, asset: &str) -> Result<Decimal, ExchangeError> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        if self.take_balance_failure() {
            return Err(Self::simulated_failure());
        }

        Ok(self
            .balances
            .get(&asset.to_uppercase())
            .map(|b| *b)
            .unwrap_or(self.default_balance))
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<Order, ExchangeError> {
        self.order_calls.fetch_add(1, Ordering::SeqCst);
        request.validate().map_err(ExchangeError::Rejected)?;

        if self.take_order_failure(request.market) {
            debug!(market = %request.market, symbol = %request.symbol, "Injected order failure");
            return Err(Self::simulated_failure());
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.orders.lock().await.push(request.clone());

        info!(
            market = %request.market,
            symbol = %request.symbol,
            side = %request.side,
            quantity = %request.quantity,
            "[DRY RUN] Order filled"
        );

        Ok(Order {
            order_id: format!("SIM-{}", id),
            market: request.market,
            symbol: request.symbol.clone(),
            side: request.side,
            status: Some(OrderStatus::Filled),
            executed_qty: Some(request.quantity),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::{Symbol, SymbolInfo};
    use crate::trading::order::Side;
    use rust_decimal_macros::dec;

    fn exchange() -> SimulatedExchange {
        let pairs = TradablePairs::from_infos(vec![SymbolInfo {
            symbol: Symbol::new("BTCUSDT"),
            base_asset: "BTC".to_string(),
            quote_asset: "USDT".to_string(),
        }]);
        SimulatedExchange::new(pairs, dec!(1000))
    }

    fn buy() -> OrderRequest {
        OrderRequest::market(MarketKind::Spot, Symbol::new("BTCUSDT"), Side::Buy, dec!(0.01))
    }

    #[tokio::test]
    async fn orders_fill_and_are_recorded() {
        let exchange = exchange();
        let order = exchange.place_order(&buy()).await.unwrap();

        assert_eq!(order.status, Some(OrderStatus::Filled));
        assert_eq!(order.executed_qty, Some(dec!(0.01)));
        assert_eq!(exchange.placed_orders().await, vec![buy()]);
    }

    #[tokio::test]
    async fn injected_failures_run_out() {
        let exchange = exchange();
        exchange.fail_orders(MarketKind::Spot, 2);

        assert!(exchange.place_order(&buy()).await.is_err());
        assert!(exchange.place_order(&buy()).await.is_err());
        assert!(exchange.place_order(&buy()).await.is_ok());
        assert_eq!(exchange.order_calls(), 3);
    }

    #[tokio::test]
    async fn balances_default_and_override() {
        let exchange = exchange();
        exchange.set_balance("usdt", dec!(5));

        assert_eq!(exchange.get_balance("USDT").await.unwrap(), dec!(5));
        assert_eq!(exchange.get_balance("BTC").await.unwrap(), dec!(1000));

        exchange.fail_balance(1);
        assert!(exchange.get_balance("BTC").await.is_err());
        assert!(exchange.get_balance("BTC").await.is_ok());
    }
}
