//! Spread and fee-adjusted profit calculations.

use rust_decimal::Decimal;
use serde::Serialize;

/// Taker fee rates applied to each leg.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FeeSchedule {
    /// Spot fee rate (0.00075 = 0.075%).
    pub spot_rate: Decimal,
    /// Futures fee rate (0.0005 = 0.05%).
    pub futures_rate: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            spot_rate: Decimal::new(75, 5),
            futures_rate: Decimal::new(5, 4),
        }
    }
}

/// Full breakdown of one spot/futures price pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpreadBreakdown {
    /// Spot price.
    pub spot: Decimal,
    /// Futures price.
    pub futures: Decimal,
    /// Futures minus spot.
    pub spread: Decimal,
    /// Fee paid on the spot leg.
    pub spot_fee: Decimal,
    /// Fee paid on the futures leg.
    pub futures_fee: Decimal,
    /// Spread net of both fees.
    pub potential_profit: Decimal,
}

/// Futures minus spot.
pub fn spread(spot: Decimal, futures: Decimal) -> Decimal {
    futures - spot
}

impl FeeSchedule {
    /// Create a fee schedule.
    pub fn new(spot_rate: Decimal, futures_rate: Decimal) -> Self {
        Self {
            spot_rate,
            futures_rate,
        }
    }

    /// Spread net of the fees on both legs.
    pub fn potential_profit(&self, spot: Decimal, futures: Decimal) -> Decimal {
        self.breakdown(spot, futures).potential_profit
    }

    /// Compute every intermediate value for a price pair.
    pub fn breakdown(&self, spot: Decimal, futures: Decimal) -> SpreadBreakdown {
        let spread = spread(spot, futures);
        let spot_fee = spot * self.spot_rate;
        let futures_fee = futures * self.futures_rate;

        SpreadBreakdown {
            spot,
            futures,
            spread,
            spot_fee,
            futures_fee,
            potential_profit: spread - (spot_fee + futures_fee),
        }
    }
}
