//! Order types and creation.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::market::{MarketKind, Symbol};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    /// Buy order.
    #[strum(to_string = "BUY", serialize = "buy")]
    Buy,
    /// Sell order.
    #[strum(to_string = "SELL", serialize = "sell")]
    Sell,
}

impl Side {
    /// The side that unwinds this one.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

/// Order type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderType {
    /// Fill immediately at the best available price.
    #[default]
    #[strum(to_string = "MARKET", serialize = "market")]
    Market,
    /// Rest on the book at a limit price (good-till-cancelled).
    #[strum(to_string = "LIMIT", serialize = "limit")]
    Limit,
}

/// Order parameters for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRequest {
    /// Market to route the order to.
    pub market: MarketKind,
    /// Symbol to trade.
    pub symbol: Symbol,
    /// Order side (buy/sell).
    pub side: Side,
    /// Market or limit.
    pub order_type: OrderType,
    /// Base-asset quantity.
    pub quantity: Decimal,
    /// Limit price; required for limit orders.
    pub price: Option<Decimal>,
}

impl OrderRequest {
    /// Create a market order.
    pub fn market(market: MarketKind, symbol: Symbol, side: Side, quantity: Decimal) -> Self {
        Self {
            market,
            symbol,
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
        }
    }

    /// Create a GTC limit order.
    pub fn limit(
        market: MarketKind,
        symbol: Symbol,
        side: Side,
        quantity: Decimal,
        price: Decimal,
    ) -> Self {
        Self {
            market,
            symbol,
            side,
            order_type: OrderType::Limit,
            quantity,
            price: Some(price),
        }
    }

    /// Validate order parameters.
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.as_str().is_empty() {
            return Err("symbol is required".to_string());
        }
        if self.quantity <= Decimal::ZERO {
            return Err("quantity must be positive".to_string());
        }
        match (self.order_type, self.price) {
            (OrderType::Limit, None) => Err("limit order requires a price".to_string()),
            (OrderType::Limit, Some(price)) if price <= Decimal::ZERO => {
                Err("price must be positive".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Order status reported by the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Accepted, not yet filled.
    #[strum(serialize = "NEW")]
    New,
    /// Partially filled.
    #[strum(serialize = "PARTIALLY_FILLED")]
    PartiallyFilled,
    /// Fully filled.
    #[strum(serialize = "FILLED")]
    Filled,
    /// Cancelled.
    #[strum(serialize = "CANCELED")]
    Canceled,
    /// Rejected by the matching engine.
    #[strum(serialize = "REJECTED")]
    Rejected,
    /// Expired.
    #[strum(serialize = "EXPIRED")]
    Expired,
}

impl OrderStatus {
    /// Check if status is terminal (won't change).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Canceled | OrderStatus::Rejected | OrderStatus::Expired
        )
    }
}

/// Acknowledged order.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    /// Exchange order ID.
    pub order_id: String,
    /// Market the order lives on.
    pub market: MarketKind,
    /// Symbol.
    pub symbol: Symbol,
    /// Side.
    pub side: Side,
    /// Status at acknowledgement, when the exchange reports one.
    pub status: Option<OrderStatus>,
    /// Quantity executed at acknowledgement.
    pub executed_qty: Option<Decimal>,
}
