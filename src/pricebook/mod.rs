//! Price book module.
//!
//! This module handles:
//! - Latest spot/futures trade prices per symbol
//! - Potential profit kept current on every tick
//! - Binance trade stream subscriptions with reconnection

pub mod book;
pub mod types;
pub mod websocket;

pub use book::PriceBook;
pub use types::{PriceEntry, PriceTick};
pub use websocket::{start_all, ReconnectConfig, TradeFeed, TradeStream};
