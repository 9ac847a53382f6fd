//! Binance trade streams feeding the price book.
//!
//! One subscription per (symbol, market). Each feed task reconnects with
//! exponential backoff and forwards prices into the shared tick channel.

use std::time::Duration;

use async_stream::stream;
use futures::future::try_join_all;
use futures::stream::BoxStream;
use futures::{pin_mut, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, error, info, instrument, warn};

use super::types::PriceTick;
use crate::config::Config;
use crate::error::{StartupError, WsError};
use crate::market::{MarketKind, Symbol, TradablePairs};
use crate::metrics;

/// Trade event payload; only the fields the bot reads.
#[derive(Debug, Clone, Deserialize)]
pub struct TradeEvent {
    /// Event type (`trade`).
    #[serde(rename = "e", default)]
    pub event_type: Option<String>,
    /// Symbol.
    #[serde(rename = "s", default)]
    pub symbol: Option<String>,
    /// Trade price.
    #[serde(rename = "p", default)]
    pub price: Option<Decimal>,
}

/// Extract the trade price from a stream message.
///
/// Messages without a price (subscription acks and the like) yield `None`.
pub fn parse_trade_price(text: &str) -> Result<Option<Decimal>, WsError> {
    let event: TradeEvent =
        serde_json::from_str(text).map_err(|e| WsError::ParseError(e.to_string()))?;
    Ok(event.price)
}

/// Connected trade stream yielding prices.
pub type TradeStream = BoxStream<'static, Result<Decimal, WsError>>;

/// Reconnection configuration for trade streams.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Initial backoff delay in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum backoff delay in seconds.
    pub max_delay_s: u64,
    /// Backoff multiplier (e.g., 2.0 for exponential).
    pub backoff_multiplier: f64,
    /// Connection attempts at startup before the feed is declared unavailable.
    pub startup_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1000,
            max_delay_s: 30,
            backoff_multiplier: 2.0,
            startup_attempts: 3,
        }
    }
}

impl ReconnectConfig {
    /// Create from config values.
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_delay_s: config.ws_max_reconnect_delay_s,
            startup_attempts: config.ws_startup_attempts,
            ..Default::default()
        }
    }

    /// Calculate next delay with exponential backoff.
    pub fn next_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay_ms as f64 * self.backoff_multiplier.powi(attempt as i32);
        let max_delay_ms = self.max_delay_s * 1000;
        let clamped_ms = delay_ms.min(max_delay_ms as f64) as u64;
        Duration::from_millis(clamped_ms)
    }
}

/// Trade price subscription for one symbol on one market.
#[derive(Debug, Clone)]
pub struct TradeFeed {
    symbol: Symbol,
    market: MarketKind,
    base_url: String,
    reconnect: ReconnectConfig,
}

impl TradeFeed {
    /// Create a feed against a stream base URL.
    pub fn new(symbol: Symbol, market: MarketKind, base_url: impl Into<String>) -> Self {
        Self {
            symbol,
            market,
            base_url: base_url.into(),
            reconnect: ReconnectConfig::default(),
        }
    }

    /// Override the reconnection backoff.
    pub fn with_reconnect_config(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Symbol of the feed.
    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Market of the feed.
    pub fn market(&self) -> MarketKind {
        self.market
    }

    /// Raw stream URL, e.g. `wss://fstream.binance.com/ws/btcusdt@trade`.
    pub fn stream_url(&self) -> String {
        format!(
            "{}/ws/{}@trade",
            self.base_url.trim_end_matches('/'),
            self.symbol.stream_name()
        )
    }

    /// Connect once and yield trade prices until the connection ends.
    ///
    /// A connection-level failure is yielded as the last item.
    pub async fn trade_stream(&self) -> Result<TradeStream, WsError> {
        let url = self.stream_url();
        debug!(url = %url, "Connecting to trade stream");

        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| WsError::ConnectionFailed(e.to_string()))?;

        info!(symbol = %self.symbol, market = %self.market, "Trade stream connected");

        let symbol = self.symbol.clone();
        let market = self.market;
        Ok(stream! {
            pin_mut!(ws);
            while let Some(msg) = ws.next().await {
                match msg {
                    Ok(Message::Text(text)) => match parse_trade_price(&text) {
                        Ok(Some(price)) => yield Ok(price),
                        Ok(None) => continue,
                        Err(e) => {
                            warn!(symbol = %symbol, market = %market, error = %e, "Skipping malformed trade message");
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        let (code, reason) = frame
                            .map(|f| (Some(u16::from(f.code)), f.reason.to_string()))
                            .unwrap_or((None, String::new()));
                        yield Err(WsError::ConnectionClosed { code, reason });
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        yield Err(WsError::Tungstenite(e));
                        break;
                    }
                }
            }
        }
        .boxed())
    }

    /// First connection, with up to `startup_attempts` tries.
    #[instrument(skip(self), fields(symbol = %self.symbol, market = %self.market))]
    pub async fn connect(&self) -> Result<TradeStream, WsError> {
        let attempts = self.reconnect.startup_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            match self.trade_stream().await {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    attempt += 1;
                    if attempt >= attempts {
                        error!(error = %e, attempts, "Trade stream unavailable");
                        return Err(e);
                    }
                    let delay = self.reconnect.next_delay(attempt - 1);
                    warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "Trade stream connection failed, retrying");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Connect, then forward prices on a background task.
    ///
    /// Fails if the first connection cannot be established. Once connected,
    /// the task reconnects with backoff until the receiver is gone.
    pub async fn start(self, tx: mpsc::Sender<PriceTick>) -> Result<JoinHandle<()>, WsError> {
        let stream = self.connect().await?;
        Ok(tokio::spawn(self.run(stream, tx)))
    }

    #[instrument(skip_all, fields(symbol = %self.symbol, market = %self.market))]
    async fn run(self, first: TradeStream, tx: mpsc::Sender<PriceTick>) {
        let mut pending = Some(first);
        let mut attempt = 0u32;

        loop {
            let connected = match pending.take() {
                Some(stream) => Ok(stream),
                None => self.trade_stream().await,
            };

            match connected {
                Ok(stream) => {
                    attempt = 0;
                    if !self.forward(stream, &tx).await {
                        info!("Tick channel closed, stopping trade feed");
                        return;
                    }
                    warn!("Trade stream ended, will reconnect");
                }
                Err(e) => {
                    error!(error = %e, attempt, "Trade stream connection failed");
                }
            }

            if tx.is_closed() {
                return;
            }

            let delay = self.reconnect.next_delay(attempt);
            metrics::inc_feed_reconnects(self.market);
            info!(delay_ms = delay.as_millis() as u64, "Reconnecting after delay");
            tokio::time::sleep(delay).await;

            attempt = attempt.saturating_add(1);
        }
    }

    /// Send prices until the stream ends. Returns `false` once the receiver is gone.
    async fn forward(&self, mut stream: TradeStream, tx: &mpsc::Sender<PriceTick>) -> bool {
        while let Some(item) = stream.next().await {
            match item {
                Ok(price) => {
                    let tick = PriceTick {
                        symbol: self.symbol.clone(),
                        market: self.market,
                        price,
                    };
                    if tx.send(tick).await.is_err() {
                        return false;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Trade stream interrupted");
                    break;
                }
            }
        }
        true
    }
}

/// Connect one spot and one futures feed for every tracked symbol.
///
/// Any stream that cannot be established fails startup.
pub async fn start_all(
    pairs: &TradablePairs,
    spot_ws_url: &str,
    futures_ws_url: &str,
    reconnect: &ReconnectConfig,
    tx: &mpsc::Sender<PriceTick>,
) -> Result<Vec<JoinHandle<()>>, StartupError> {
    let starts = pairs
        .symbols()
        .flat_map(|symbol| {
            [
                TradeFeed::new(symbol.clone(), MarketKind::Spot, spot_ws_url),
                TradeFeed::new(symbol.clone(), MarketKind::Futures, futures_ws_url),
            ]
        })
        .map(|feed| {
            let feed = feed.with_reconnect_config(reconnect.clone());
            let tx = tx.clone();
            async move {
                let symbol = feed.symbol().clone();
                let market = feed.market();
                feed.start(tx)
                    .await
                    .map_err(|source| StartupError::StreamUnavailable {
                        symbol,
                        market,
                        source,
                    })
            }
        });

    let handles = try_join_all(starts).await?;
    info!(feeds = handles.len(), "Trade feeds started");
    Ok(handles)
}
