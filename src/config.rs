//! Application configuration loaded from environment variables.

use std::time::Duration;

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::arbitrage::calculator::FeeSchedule;
use crate::market::Symbol;
use crate::trading::execution::RetryPolicy;
use crate::trading::position::TriggerThresholds;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    // === Binance Credentials ===
    /// API key sent in the `X-MBX-APIKEY` header.
    #[serde(default)]
    pub binance_api_key: String,

    /// API secret used to sign requests.
    #[serde(default)]
    pub binance_api_secret: String,

    // === Endpoints ===
    /// Spot REST base URL.
    #[serde(default = "default_spot_url")]
    pub binance_spot_url: String,

    /// Futures REST base URL.
    #[serde(default = "default_futures_url")]
    pub binance_futures_url: String,

    /// Spot stream base URL.
    #[serde(default = "default_spot_ws_url")]
    pub binance_spot_ws_url: String,

    /// Futures stream base URL.
    #[serde(default = "default_futures_ws_url")]
    pub binance_futures_ws_url: String,

    // === Retry Policy ===
    /// Attempts per order or balance request.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between attempts in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Retry on any exchange error (true) or on transient errors only (false).
    #[serde(default = "default_true")]
    pub retry_all_errors: bool,

    // === Fees ===
    /// Spot taker fee rate (0.00075 = 0.075%).
    #[serde(default = "default_spot_fee_rate")]
    pub spot_fee_rate: Decimal,

    /// Futures taker fee rate (0.0005 = 0.05%).
    #[serde(default = "default_futures_fee_rate")]
    pub futures_fee_rate: Decimal,

    // === Position Exits ===
    /// Stop-loss percentage of the initial spread.
    #[serde(default = "default_stop_loss_pct")]
    pub stop_loss_pct: Decimal,

    /// Take-profit percentage of the initial spread.
    #[serde(default = "default_take_profit_pct")]
    pub take_profit_pct: Decimal,

    // === Loop Timing ===
    /// Seconds between position monitoring passes.
    #[serde(default = "default_monitor_interval")]
    pub monitor_interval_s: u64,

    /// Seconds between decision cycles.
    #[serde(default = "default_decision_interval")]
    pub decision_interval_s: u64,

    /// Seconds to wait after a trade attempt or balance shortfall.
    #[serde(default = "default_cooldown")]
    pub cooldown_s: u64,

    // === Assets ===
    /// Asset used to fund the spot leg.
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,

    /// Base asset checked when exchange metadata has none for a symbol.
    #[serde(default = "default_base_asset")]
    pub base_asset: String,

    /// Comma-separated symbols to track (empty = every tradable pair).
    #[serde(default)]
    pub symbols: Option<String>,

    // === Operation Modes ===
    /// Simulation mode (no real orders).
    #[serde(default = "default_true")]
    pub dry_run: bool,

    /// Balance the simulated exchange reports for every asset.
    #[serde(default = "default_sim_balance")]
    pub sim_balance: Decimal,

    // === HTTP ===
    /// REST request timeout in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub http_timeout_ms: u64,

    /// Binance `recvWindow` for signed requests.
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,

    // === Trade Streams ===
    /// Maximum reconnect backoff for trade streams, in seconds.
    #[serde(default = "default_ws_max_reconnect_delay_s")]
    pub ws_max_reconnect_delay_s: u64,

    /// Connection attempts per stream at startup before giving up.
    #[serde(default = "default_ws_startup_attempts")]
    pub ws_startup_attempts: u32,

    // === Server Configuration ===
    /// HTTP server port for health/metrics endpoints.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub rust_log: String,
}

fn default_spot_url() -> String {
    "https://api.binance.com".to_string()
}

fn default_futures_url() -> String {
    "https://fapi.binance.com".to_string()
}

fn default_spot_ws_url() -> String {
    "wss://stream.binance.com:9443".to_string()
}

fn default_futures_ws_url() -> String {
    "wss://fstream.binance.com".to_string()
}

fn default_max_retries() -> u32 {
    5
}

fn default_retry_delay_ms() -> u64 {
    2000
}

fn default_spot_fee_rate() -> Decimal {
    Decimal::new(75, 5) // 0.075%
}

fn default_futures_fee_rate() -> Decimal {
    Decimal::new(5, 4) // 0.05%
}

fn default_stop_loss_pct() -> Decimal {
    Decimal::ONE
}

fn default_take_profit_pct() -> Decimal {
    Decimal::TWO
}

fn default_monitor_interval() -> u64 {
    5
}

fn default_decision_interval() -> u64 {
    5
}

fn default_cooldown() -> u64 {
    10
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_base_asset() -> String {
    "BTC".to_string()
}

fn default_true() -> bool {
    true
}

fn default_sim_balance() -> Decimal {
    Decimal::new(1000, 0)
}

fn default_http_timeout_ms() -> u64 {
    5000
}

fn default_recv_window_ms() -> u64 {
    5000
}

fn default_ws_max_reconnect_delay_s() -> u64 {
    30
}

fn default_ws_startup_attempts() -> u32 {
    3
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from environment, reading .env file first.
    pub fn load() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Build from explicit key/value pairs; unspecified keys take defaults.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, envy::Error>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        envy::from_iter(pairs)
    }

    /// Check if the configuration is valid.
    pub fn validate(&self) -> Result<(), String> {
        if !self.dry_run
            && (self.binance_api_key.is_empty() || self.binance_api_secret.is_empty())
        {
            return Err(
                "BINANCE_API_KEY and BINANCE_API_SECRET are required when DRY_RUN=false".to_string(),
            );
        }

        if self.max_retries == 0 {
            return Err("MAX_RETRIES must be at least 1".to_string());
        }

        if self.spot_fee_rate < Decimal::ZERO || self.futures_fee_rate < Decimal::ZERO {
            return Err("fee rates must not be negative".to_string());
        }

        if self.monitor_interval_s == 0 || self.decision_interval_s == 0 {
            return Err("MONITOR_INTERVAL_S and DECISION_INTERVAL_S must be positive".to_string());
        }

        if self.ws_startup_attempts == 0 {
            return Err("WS_STARTUP_ATTEMPTS must be at least 1".to_string());
        }

        if self.quote_asset.trim().is_empty() {
            return Err("QUOTE_ASSET is required".to_string());
        }

        Ok(())
    }

    /// Fee rates used for potential profit.
    pub fn fee_schedule(&self) -> FeeSchedule {
        FeeSchedule::new(self.spot_fee_rate, self.futures_fee_rate)
    }

    /// Take-profit and stop-loss thresholds.
    pub fn thresholds(&self) -> TriggerThresholds {
        TriggerThresholds {
            take_profit_pct: self.take_profit_pct,
            stop_loss_pct: self.stop_loss_pct,
        }
    }

    /// Retry policy for orders and balance queries.
    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(self.max_retries, Duration::from_millis(self.retry_delay_ms));
        if self.retry_all_errors {
            policy
        } else {
            policy.with_classifier(RetryPolicy::transient_only)
        }
    }

    /// Parsed `SYMBOLS` filter.
    pub fn symbol_filter(&self) -> Vec<Symbol> {
        self.symbols
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Symbol::new)
            .collect()
    }

    /// Delay between monitoring passes.
    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_s)
    }

    /// Delay between decision cycles.
    pub fn decision_interval(&self) -> Duration {
        Duration::from_secs(self.decision_interval_s)
    }

    /// Cooldown after a trade attempt.
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_s)
    }
}
