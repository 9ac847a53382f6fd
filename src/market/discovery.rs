//! Discovery of symbols tradable on both the spot and futures markets.

use serde::Deserialize;
use tracing::{info, instrument, warn};

use super::gateway::ExchangeGateway;
use super::types::{Symbol, SymbolInfo, TradablePairs};
use crate::error::StartupError;

/// Status Binance reports for symbols open for trading.
const TRADING_STATUS: &str = "TRADING";

/// `exchangeInfo` response, shared by the spot and futures endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct ExchangeInfo {
    /// Listed symbols.
    #[serde(default)]
    pub symbols: Vec<ExchangeSymbol>,
}

/// One symbol entry of `exchangeInfo`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeSymbol {
    /// Symbol name.
    pub symbol: String,
    /// Trading status (`TRADING`, `BREAK`, ...).
    pub status: String,
    /// Base asset.
    pub base_asset: String,
    /// Quote asset.
    pub quote_asset: String,
}

impl ExchangeInfo {
    /// Symbols whose status is `TRADING`.
    pub fn trading_pairs(self) -> TradablePairs {
        TradablePairs::from_infos(
            self.symbols
                .into_iter()
                .filter(|s| s.status == TRADING_STATUS)
                .map(|s| SymbolInfo {
                    symbol: Symbol::new(&s.symbol),
                    base_asset: s.base_asset,
                    quote_asset: s.quote_asset,
                }),
        )
    }
}

/// Intersect the trading symbols of both markets.
pub fn intersect_trading(spot: ExchangeInfo, futures: ExchangeInfo) -> TradablePairs {
    let futures = futures.trading_pairs();
    TradablePairs::intersection(spot.trading_pairs(), &futures)
}

/// Fetch the tradable pairs, optionally restricted to `filter`.
///
/// Failing to fetch, or ending up with nothing to track, is fatal.
#[instrument(skip(gateway))]
pub async fn discover_tradable_pairs(
    gateway: &dyn ExchangeGateway,
    filter: &[Symbol],
) -> Result<TradablePairs, StartupError> {
    let pairs = gateway
        .fetch_tradable_pairs()
        .await
        .map_err(StartupError::PairsUnavailable)?;

    let total = pairs.len();
    let pairs = pairs.restrict_to(filter);

    if !filter.is_empty() && pairs.len() < filter.len() {
        let missing: Vec<_> = filter.iter().filter(|s| !pairs.contains(s.as_str())).collect();
        warn!(missing = ?missing, "Some configured symbols are not tradable on both markets");
    }

    if pairs.is_empty() {
        return Err(StartupError::NoTradablePairs);
    }

    info!(tradable = total, tracked = pairs.len(), "Tradable pairs discovered");
    Ok(pairs)
}
