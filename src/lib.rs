//! Spot/futures basis arbitrage bot for Binance.
//!
//! The bot watches the latest trade price of every symbol listed on both the
//! spot and USDⓈ-M futures markets. When futures trade above spot by more than
//! the taker fees on both legs, it buys spot and shorts futures for the same
//! quantity, then unwinds both legs once the spread has moved far enough.
//!
//! # Profitability
//!
//! ```text
//! spot:     100.00
//! futures:  102.00
//! ───────────────────────────────
//! spread:     2.00
//! fees:       0.075 + 0.051 = 0.126
//! profit:     1.874 per unit
//! ```
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from environment
//! - [`error`]: Unified error types
//! - [`market`]: Symbols, pair discovery and exchange gateways
//! - [`pricebook`]: Latest prices per symbol and trade stream feeds
//! - [`arbitrage`]: Profit calculation, ranking and the decision loop
//! - [`trading`]: Orders, retrying execution and position tracking
//! - [`signing`]: Request signing for authenticated endpoints
//! - [`api`]: HTTP API for health/status/metrics
//! - [`metrics`]: Prometheus counters and histograms
//! - [`utils`]: Utility functions

pub mod api;
pub mod arbitrage;
pub mod config;
pub mod error;
pub mod market;
pub mod metrics;
pub mod pricebook;
pub mod signing;
pub mod trading;
pub mod utils;

pub use config::Config;
pub use error::{BotError, Result};
