//! Exchange gateway trait: the REST surface the engine depends on.

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::types::TradablePairs;
use crate::error::ExchangeError;
use crate::trading::order::{Order, OrderRequest};

/// Account and order access to an exchange offering spot and futures markets.
///
/// Implemented by [`BinanceClient`](super::BinanceClient) for live trading and by
/// [`SimulatedExchange`](super::SimulatedExchange) for dry runs and tests.
#[async_trait]
pub trait ExchangeGateway: Send + Sync {
    /// Symbols currently trading on both the spot and futures markets.
    async fn fetch_tradable_pairs(&self) -> Result<TradablePairs, ExchangeError>;

    /// Free balance of an asset.
    async fn get_balance(&self, asset: &str) -> Result<Decimal, ExchangeError>;

    /// Submit a single order, without retrying.
    async fn place_order(&self, request: &OrderRequest) -> Result<Order, ExchangeError>;
}
