//! Price book types.

use rust_decimal::Decimal;
use serde::Serialize;

use crate::market::{MarketKind, Symbol};

/// Latest spot and futures prices for one symbol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PriceEntry {
    /// Last spot trade price.
    pub spot: Option<Decimal>,
    /// Last futures trade price.
    pub futures: Option<Decimal>,
    /// Fee-adjusted profit; present once both sides are.
    pub potential_profit: Option<Decimal>,
}

impl PriceEntry {
    /// Whether both sides have received a tick.
    pub fn is_ready(&self) -> bool {
        self.spot.is_some() && self.futures.is_some()
    }

    /// Both prices, when present.
    pub fn prices(&self) -> Option<(Decimal, Decimal)> {
        Some((self.spot?, self.futures?))
    }

    /// Whether any side has received a tick.
    pub fn has_any_price(&self) -> bool {
        self.spot.is_some() || self.futures.is_some()
    }

    /// Record the price of one side.
    pub fn set(&mut self, market: MarketKind, price: Decimal) {
        match market {
            MarketKind::Spot => self.spot = Some(price),
            MarketKind::Futures => self.futures = Some(price),
        }
    }
}

/// One trade price observed on a feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceTick {
    /// Symbol traded.
    pub symbol: Symbol,
    /// Market the trade happened on.
    pub market: MarketKind,
    /// Trade price.
    pub price: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn entry_ready_only_with_both_sides() {
        let mut entry = PriceEntry::default();
        assert!(!entry.has_any_price());

        entry.set(MarketKind::Spot, dec!(100));
        assert!(entry.has_any_price());
        assert!(!entry.is_ready());
        assert_eq!(entry.prices(), None);

        entry.set(MarketKind::Futures, dec!(102));
        assert!(entry.is_ready());
        assert_eq!(entry.prices(), Some((dec!(100), dec!(102))));
    }
}
