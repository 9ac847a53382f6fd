//! Market-related types shared by the spot and futures sides.

use std::borrow::Borrow;
use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Tradable instrument identifier, e.g. `BTCUSDT`.
///
/// Stored upper-case, the form both Binance REST APIs use.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Create a symbol, normalizing to upper-case.
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(symbol.as_ref().trim().to_uppercase())
    }

    /// Borrow the symbol text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lower-case form used by stream names.
    pub fn stream_name(&self) -> String {
        self.0.to_lowercase()
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for Symbol {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Which market a price or order belongs to.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
pub enum MarketKind {
    /// Spot market.
    #[strum(to_string = "spot", serialize = "SPOT")]
    Spot,
    /// USD-margined perpetual futures market.
    #[strum(to_string = "futures", serialize = "FUTURES")]
    Futures,
}

impl MarketKind {
    /// Both markets, spot first.
    pub const ALL: [MarketKind; 2] = [MarketKind::Spot, MarketKind::Futures];
}

/// Base/quote assets of a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolInfo {
    /// The symbol.
    pub symbol: Symbol,
    /// Asset being bought or sold (e.g. BTC).
    pub base_asset: String,
    /// Asset the price is quoted in (e.g. USDT).
    pub quote_asset: String,
}

/// Symbols tradable on both markets.
#[derive(Debug, Clone, Default)]
pub struct TradablePairs {
    pairs: BTreeMap<Symbol, SymbolInfo>,
}

impl TradablePairs {
    /// Build from an iterator of symbol metadata.
    pub fn from_infos(infos: impl IntoIterator<Item = SymbolInfo>) -> Self {
        Self {
            pairs: infos
                .into_iter()
                .map(|info| (info.symbol.clone(), info))
                .collect(),
        }
    }

    /// Keep only symbols listed in both sets; spot metadata wins.
    pub fn intersection(spot: Self, futures: &Self) -> Self {
        Self {
            pairs: spot
                .pairs
                .into_iter()
                .filter(|(symbol, _)| futures.contains(symbol.as_str()))
                .collect(),
        }
    }

    /// Restrict to the given symbols. An empty filter keeps everything.
    pub fn restrict_to(self, filter: &[Symbol]) -> Self {
        if filter.is_empty() {
            return self;
        }
        Self {
            pairs: self
                .pairs
                .into_iter()
                .filter(|(symbol, _)| filter.contains(symbol))
                .collect(),
        }
    }

    /// Whether the symbol is tracked.
    pub fn contains(&self, symbol: &str) -> bool {
        self.pairs.contains_key(symbol)
    }

    /// Metadata for a symbol.
    pub fn info(&self, symbol: &str) -> Option<&SymbolInfo> {
        self.pairs.get(symbol)
    }

    /// Base asset of a symbol, if known.
    pub fn base_asset(&self, symbol: &str) -> Option<&str> {
        self.info(symbol).map(|i| i.base_asset.as_str())
    }

    /// Tracked symbols in lexical order.
    pub fn symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.pairs.keys()
    }

    /// Number of tracked symbols.
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether no symbol is tracked.
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}
