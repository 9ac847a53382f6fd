//! Latest spot/futures prices per symbol.

use std::sync::Arc;

use dashmap::DashMap;
use rust_decimal::Decimal;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::types::{PriceEntry, PriceTick};
use crate::arbitrage::calculator::FeeSchedule;
use crate::market::{MarketKind, Symbol};
use crate::metrics;

/// Thread-safe price book keyed by symbol.
///
/// Each update locks only the entry it touches. The potential profit of an
/// entry is recomputed whenever one side changes and both sides are present.
#[derive(Debug, Default)]
pub struct PriceBook {
    entries: DashMap<Symbol, PriceEntry>,
    fees: FeeSchedule,
}

impl PriceBook {
    /// Create an empty price book.
    pub fn new(fees: FeeSchedule) -> Self {
        Self {
            entries: DashMap::new(),
            fees,
        }
    }

    /// Create an empty entry for a symbol. Existing entries are left alone.
    pub fn register(&self, symbol: &Symbol) {
        self.entries.entry(symbol.clone()).or_default();
    }

    /// Register every symbol.
    pub fn register_all<'a>(&self, symbols: impl IntoIterator<Item = &'a Symbol>) {
        for symbol in symbols {
            self.register(symbol);
        }
    }

    /// Record the latest price of one side and return the updated entry.
    ///
    /// Unregistered symbols get an entry on first update.
    pub fn update(&self, symbol: &Symbol, market: MarketKind, price: Decimal) -> PriceEntry {
        let mut entry = self.entries.entry(symbol.clone()).or_default();
        entry.set(market, price);
        entry.potential_profit = entry
            .prices()
            .map(|(spot, futures)| self.fees.potential_profit(spot, futures));
        *entry
    }

    /// Apply a feed tick.
    pub fn apply(&self, tick: &PriceTick) -> PriceEntry {
        self.update(&tick.symbol, tick.market, tick.price)
    }

    /// Copy of an entry, `None` if the symbol is unknown or never ticked.
    pub fn read(&self, symbol: &str) -> Option<PriceEntry> {
        self.entries
            .get(symbol)
            .map(|e| *e)
            .filter(PriceEntry::has_any_price)
    }

    /// Copies of every entry, ordered by symbol.
    pub fn snapshot(&self) -> Vec<(Symbol, PriceEntry)> {
        let mut entries: Vec<_> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries
    }

    /// Registered symbols, ordered.
    pub fn symbols(&self) -> Vec<Symbol> {
        let mut symbols: Vec<_> = self.entries.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        symbols
    }

    /// Number of entries with both prices present.
    pub fn ready_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_ready()).count()
    }

    /// Number of registered symbols.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no symbol is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Apply ticks from the feed channel until every sender is dropped.
    pub async fn ingest(self: Arc<Self>, mut rx: mpsc::Receiver<PriceTick>) {
        info!(symbols = self.len(), "Price ingest started");

        while let Some(tick) = rx.recv().await {
            let entry = self.apply(&tick);
            metrics::inc_ticks_received(tick.market);
            debug!(
                symbol = %tick.symbol,
                market = %tick.market,
                price = %tick.price,
                profit = ?entry.potential_profit,
                "Price updated"
            );
        }

        info!("Price feed channel closed, ingest stopped");
    }
}
