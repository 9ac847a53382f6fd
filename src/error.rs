//! Unified error types for the arbitrage bot.

use rust_decimal::Decimal;
use thiserror::Error;

use crate::market::{MarketKind, Symbol};

/// Unified error type for the arbitrage bot.
#[derive(Error, Debug)]
pub enum BotError {
    /// Configuration loading error.
    #[error("configuration error: {0}")]
    Config(#[from] envy::Error),

    /// Exchange request error.
    #[error("exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    /// Trading/order error.
    #[error("trading error: {0}")]
    Trading(#[from] TradingError),

    /// Position bookkeeping error.
    #[error("position error: {0}")]
    Position(#[from] PositionError),

    /// WebSocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] WsError),

    /// Fatal startup error.
    #[error("startup error: {0}")]
    Startup(#[from] StartupError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors reported by the exchange or the transport in front of it.
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// The exchange answered with an error payload.
    #[error("api error {code}: {msg}")]
    Api {
        /// Exchange error code (negative for Binance).
        code: i64,
        /// Error message from the exchange.
        msg: String,
    },

    /// The request never produced a usable response.
    #[error("request failed: {0}")]
    Request(String),

    /// HTTP client error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be parsed.
    #[error("failed to parse response: {0}")]
    Parse(String),

    /// The request was refused before reaching the exchange.
    #[error("request rejected: {0}")]
    Rejected(String),
}

impl ExchangeError {
    /// Binance codes that describe conditions expected to clear on their own.
    const TRANSIENT_API_CODES: &'static [i64] = &[
        -1000, // unknown error
        -1001, // internal disconnect
        -1003, // too many requests
        -1006, // unexpected response
        -1007, // timeout waiting for backend
        -1008, // server busy
        -1015, // too many orders
        -1021, // timestamp outside recvWindow
    ];

    /// Whether retrying the same request could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ExchangeError::Api { code, .. } => Self::TRANSIENT_API_CODES.contains(code),
            ExchangeError::Request(_) => true,
            ExchangeError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ExchangeError::Parse(_) | ExchangeError::Rejected(_) => false,
        }
    }
}

/// Order placement errors surfaced to the engine.
#[derive(Error, Debug)]
pub enum TradingError {
    /// Invalid order parameters, caught before any exchange call.
    #[error("invalid order parameters: {0}")]
    InvalidParams(String),

    /// Every permitted attempt failed.
    #[error("{market} order for {symbol} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        /// Market the order targeted.
        market: MarketKind,
        /// Symbol the order targeted.
        symbol: Symbol,
        /// Number of attempts made.
        attempts: u32,
        /// Last error reported by the exchange.
        last_error: String,
    },

    /// The retry policy classified the failure as permanent.
    #[error("{market} order for {symbol} rejected: {reason}")]
    Rejected {
        /// Market the order targeted.
        market: MarketKind,
        /// Symbol the order targeted.
        symbol: Symbol,
        /// Rejection reason.
        reason: String,
    },
}

/// Position bookkeeping errors.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PositionError {
    /// A position is already open for this symbol.
    #[error("position already open for {symbol}")]
    AlreadyOpen {
        /// The symbol.
        symbol: Symbol,
    },

    /// Quantity must be positive.
    #[error("invalid position quantity {quantity} for {symbol}")]
    InvalidQuantity {
        /// The symbol.
        symbol: Symbol,
        /// Offending quantity.
        quantity: Decimal,
    },
}

/// WebSocket connection and message errors.
#[derive(Error, Debug)]
pub enum WsError {
    /// Connection failed.
    #[error("websocket connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed unexpectedly.
    #[error("websocket connection closed: code={code:?}, reason={reason}")]
    ConnectionClosed {
        /// Close code.
        code: Option<u16>,
        /// Close reason.
        reason: String,
    },

    /// Message parsing failed.
    #[error("failed to parse websocket message: {0}")]
    ParseError(String),

    /// Tungstenite error.
    #[error("tungstenite error: {0}")]
    Tungstenite(#[from] tokio_tungstenite::tungstenite::Error),
}

/// Failures that stop the process before the loops start.
#[derive(Error, Debug)]
pub enum StartupError {
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Exchange metadata could not be fetched.
    #[error("failed to fetch tradable pairs: {0}")]
    PairsUnavailable(#[source] ExchangeError),

    /// No symbol trades on both markets.
    #[error("no symbols are tradable on both spot and futures")]
    NoTradablePairs,

    /// A trade stream could not be established.
    #[error("cannot establish {market} trade stream for {symbol}: {source}")]
    StreamUnavailable {
        /// Symbol of the stream.
        symbol: Symbol,
        /// Market of the stream.
        market: MarketKind,
        /// Last connection error.
        #[source]
        source: WsError,
    },
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_codes_classify_transient() {
        let disconnect = ExchangeError::Api {
            code: -1001,
            msg: "Internal error; unable to process your request.".to_string(),
        };
        assert!(disconnect.is_transient());

        let bad_lot = ExchangeError::Api {
            code: -1013,
            msg: "Filter failure: LOT_SIZE".to_string(),
        };
        assert!(!bad_lot.is_transient());
    }

    #[test]
    fn local_rejections_are_permanent() {
        assert!(!ExchangeError::Rejected("quantity must be positive".to_string()).is_transient());
        assert!(!ExchangeError::Parse("missing orderId".to_string()).is_transient());
        assert!(ExchangeError::Request("connection reset".to_string()).is_transient());
    }
}
