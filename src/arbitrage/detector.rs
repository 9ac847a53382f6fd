//! Opportunity ranking across tracked symbols.

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, instrument};

use super::calculator::spread;
use crate::market::Symbol;
use crate::pricebook::{PriceBook, PriceEntry};

/// The most profitable symbol at decision time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Opportunity {
    /// Symbol to trade.
    pub symbol: Symbol,
    /// Spot price read with the profit.
    pub spot: Decimal,
    /// Futures price read with the profit.
    pub futures: Decimal,
    /// Futures minus spot.
    pub spread: Decimal,
    /// Fee-adjusted profit per unit.
    pub potential_profit: Decimal,
}

/// Pick the symbol with the highest strictly positive potential profit.
///
/// Entries are scanned in the given order; on equal profit the first one wins.
pub fn best_opportunity<'a>(
    entries: impl IntoIterator<Item = &'a (Symbol, PriceEntry)>,
) -> Option<Opportunity> {
    let mut best: Option<Opportunity> = None;

    for (symbol, entry) in entries {
        let (Some((spot, futures)), Some(profit)) = (entry.prices(), entry.potential_profit) else {
            continue;
        };
        if profit <= Decimal::ZERO {
            continue;
        }
        if best.as_ref().is_some_and(|b| profit <= b.potential_profit) {
            continue;
        }
        best = Some(Opportunity {
            symbol: symbol.clone(),
            spot,
            futures,
            spread: spread(spot, futures),
            potential_profit: profit,
        });
    }

    best
}

/// Rank a price book snapshot, symbols in lexical order.
#[instrument(skip(book), fields(symbols = book.len()))]
pub fn rank(book: &PriceBook) -> Option<Opportunity> {
    let snapshot = book.snapshot();
    let best = best_opportunity(&snapshot);
    if let Some(ref opp) = best {
        debug!(symbol = %opp.symbol, profit = %opp.potential_profit, "Best opportunity");
    }
    best
}

/// Summary of a snapshot that produced no opportunity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NoOpportunityDiagnosis {
    /// Symbols tracked.
    pub tracked: usize,
    /// Symbols with both prices.
    pub ready: usize,
    /// Highest potential profit seen, if any symbol was ready.
    pub best_symbol: Option<Symbol>,
    /// Its potential profit.
    pub best_profit: Option<Decimal>,
}

/// Explain why `rank` found nothing.
pub fn diagnose_no_opportunity(book: &PriceBook) -> NoOpportunityDiagnosis {
    let snapshot = book.snapshot();
    let mut ready = 0;
    let mut best: Option<(&Symbol, Decimal)> = None;

    for (symbol, entry) in &snapshot {
        let Some(profit) = entry.potential_profit else {
            continue;
        };
        ready += 1;
        if best.map_or(true, |(_, p)| profit > p) {
            best = Some((symbol, profit));
        }
    }

    NoOpportunityDiagnosis {
        tracked: snapshot.len(),
        ready,
        best_symbol: best.map(|(s, _)| s.clone()),
        best_profit: best.map(|(_, p)| p),
    }
}

impl std::fmt::Display for NoOpportunityDiagnosis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} symbols priced | best={} profit={}",
            self.ready,
            self.tracked,
            self.best_symbol
                .as_ref()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "N/A".to_string()),
            self.best_profit
                .map(|d| d.normalize().to_string())
                .unwrap_or_else(|| "N/A".to_string()),
        )
    }
}
