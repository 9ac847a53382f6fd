//! Market module for Binance spot and futures.
//!
//! This module handles:
//! - Symbol and market types
//! - Discovery of pairs tradable on both markets
//! - The exchange gateway trait and its Binance implementation
//! - A simulated exchange for dry runs and tests

pub mod client;
pub mod discovery;
pub mod gateway;
pub mod simulated;
pub mod types;

pub use client::BinanceClient;
pub use discovery::discover_tradable_pairs;
pub use gateway::ExchangeGateway;
pub use simulated::SimulatedExchange;
pub use types::{MarketKind, Symbol, SymbolInfo, TradablePairs};
