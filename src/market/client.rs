//! Binance REST client for the spot and USD-margined futures APIs.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, Response};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::Config;
use crate::error::ExchangeError;
use crate::signing;
use crate::trading::order::{Order, OrderRequest, OrderStatus, OrderType};

use super::discovery::{intersect_trading, ExchangeInfo};
use super::gateway::ExchangeGateway;
use super::types::{MarketKind, TradablePairs};

/// Decimal places Binance accepts for quantities and prices.
const WIRE_DECIMALS: u32 = 8;

/// Binance REST client covering both markets.
#[derive(Debug, Clone)]
pub struct BinanceClient {
    /// HTTP client for API requests.
    http: reqwest::Client,
    /// Spot REST base URL.
    spot_url: String,
    /// Futures REST base URL.
    futures_url: String,
    /// API key.
    api_key: String,
    /// API secret.
    api_secret: String,
    /// `recvWindow` for signed requests.
    recv_window_ms: u64,
}

/// Error body returned by both APIs.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Error code.
    pub code: i64,
    /// Error message.
    pub msg: String,
}

/// Spot account response (`GET /api/v3/account`).
#[derive(Debug, Clone, Deserialize)]
pub struct AccountResponse {
    /// Per-asset balances.
    #[serde(default)]
    pub balances: Vec<AssetBalance>,
}

/// Balance of one asset.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetBalance {
    /// Asset name.
    pub asset: String,
    /// Free amount.
    pub free: Decimal,
    /// Amount locked in open orders.
    #[serde(default)]
    pub locked: Decimal,
}

/// Order acknowledgement returned by both order endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    /// Exchange order ID.
    pub order_id: i64,
    /// Order status.
    #[serde(default)]
    pub status: Option<String>,
    /// Executed quantity.
    #[serde(default)]
    pub executed_qty: Option<Decimal>,
}

impl AccountResponse {
    /// Free balance of an asset; zero when the account holds none.
    pub fn free_balance(&self, asset: &str) -> Decimal {
        self.balances
            .iter()
            .find(|b| b.asset.eq_ignore_ascii_case(asset))
            .map(|b| b.free)
            .unwrap_or(Decimal::ZERO)
    }
}

/// Format a quantity or price for the wire.
pub fn wire_decimal(value: Decimal) -> String {
    value
        .round_dp_with_strategy(WIRE_DECIMALS, RoundingStrategy::ToZero)
        .normalize()
        .to_string()
}

/// Query parameters for an order, before signing.
pub fn order_params(request: &OrderRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("symbol", request.symbol.to_string()),
        ("side", request.side.to_string()),
        ("type", request.order_type.to_string()),
        ("quantity", wire_decimal(request.quantity)),
    ];

    if request.order_type == OrderType::Limit {
        params.push(("timeInForce", "GTC".to_string()));
        if let Some(price) = request.price {
            params.push(("price", wire_decimal(price)));
        }
    }

    params
}

impl BinanceClient {
    /// Create a new Binance client from config.
    pub fn new(config: &Config) -> Result<Self, ExchangeError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.http_timeout_ms))
            .connect_timeout(Duration::from_secs(2))
            .tcp_nodelay(true)
            .tcp_keepalive(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            http,
            spot_url: config.binance_spot_url.trim_end_matches('/').to_string(),
            futures_url: config.binance_futures_url.trim_end_matches('/').to_string(),
            api_key: config.binance_api_key.clone(),
            api_secret: config.binance_api_secret.clone(),
            recv_window_ms: config.recv_window_ms,
        })
    }

    /// REST base URL of a market.
    pub fn base_url(&self, market: MarketKind) -> &str {
        match market {
            MarketKind::Spot => &self.spot_url,
            MarketKind::Futures => &self.futures_url,
        }
    }

    fn exchange_info_path(market: MarketKind) -> &'static str {
        match market {
            MarketKind::Spot => "/api/v3/exchangeInfo",
            MarketKind::Futures => "/fapi/v1/exchangeInfo",
        }
    }

    fn order_path(market: MarketKind) -> &'static str {
        match market {
            MarketKind::Spot => "/api/v3/order",
            MarketKind::Futures => "/fapi/v1/order",
        }
    }

    /// Fetch `exchangeInfo` for one market. Public endpoint.
    #[instrument(skip(self))]
    pub async fn exchange_info(&self, market: MarketKind) -> Result<ExchangeInfo, ExchangeError> {
        let url = format!("{}{}", self.base_url(market), Self::exchange_info_path(market));
        let response = self.http.get(&url).send().await?;
        Self::parse_response(response).await
    }

    /// Send a signed request and decode the JSON body.
    async fn signed_request<T: DeserializeOwned>(
        &self,
        method: Method,
        market: MarketKind,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, ExchangeError> {
        if self.api_key.is_empty() || self.api_secret.is_empty() {
            return Err(ExchangeError::Rejected(
                "API credentials are not configured".to_string(),
            ));
        }

        let timestamp = chrono::Utc::now().timestamp_millis();
        let query = signing::signed_query(&self.api_secret, params, self.recv_window_ms, timestamp)?;
        let url = format!("{}{}?{}", self.base_url(market), path, query);

        debug!(%method, %market, path, "Sending signed request");

        let response = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Map non-success statuses to exchange errors and decode success bodies.
    async fn parse_response<T: DeserializeOwned>(response: Response) -> Result<T, ExchangeError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<ApiErrorBody>(&body) {
                Ok(err) => ExchangeError::Api {
                    code: err.code,
                    msg: err.msg,
                },
                Err(_) => ExchangeError::Request(format!("HTTP {}: {}", status, body)),
            });
        }

        serde_json::from_str(&body).map_err(|e| ExchangeError::Parse(e.to_string()))
    }
}

#[async_trait]
impl ExchangeGateway for BinanceClient {
    #[instrument(skip(self))]
    async fn fetch_tradable_pairs(&self) -> Result<TradablePairs, ExchangeError> {
        let (spot, futures) = tokio::try_join!(
            self.exchange_info(MarketKind::Spot),
            self.exchange_info(MarketKind::Futures)
        )?;
        Ok(intersect_trading(spot, futures))
    }

    #[instrument(skip(self))]
    async fn get_balance(&self, asset: &str) -> Result<Decimal, ExchangeError> {
        let account: AccountResponse = self
            .signed_request(Method::GET, MarketKind::Spot, "/api/v3/account", &[])
            .await?;

        let balance = account.free_balance(asset);
        debug!(asset, balance = %balance, "Retrieved balance");
        Ok(balance)
    }

    #[instrument(skip(self, request), fields(market = %request.market, symbol = %request.symbol, side = %request.side))]
    async fn place_order(&self, request: &OrderRequest) -> Result<Order, ExchangeError> {
        request.validate().map_err(ExchangeError::Rejected)?;

        let params = order_params(request);
        let response: OrderResponse = self
            .signed_request(
                Method::POST,
                request.market,
                Self::order_path(request.market),
                &params,
            )
            .await?;

        Ok(Order {
            order_id: response.order_id.to_string(),
            market: request.market,
            symbol: request.symbol.clone(),
            side: request.side,
            status: response.status.as_deref().and_then(|s| s.parse::<OrderStatus>().ok()),
            executed_qty: response.executed_qty,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market::Symbol;
    use crate::trading::order::Side;
    use rust_decimal_macros::dec;

    fn test_config() -> Config {
        Config::from_pairs(vec![
            ("BINANCE_SPOT_URL".to_string(), "https://spot.test/".to_string()),
            ("BINANCE_FUTURES_URL".to_string(), "https://futures.test".to_string()),
        ])
        .unwrap()
    }

    #[test]
    fn client_creation_works() {
        let client = BinanceClient::new(&test_config()).unwrap();
        assert_eq!(client.base_url(MarketKind::Spot), "https://spot.test");
        assert_eq!(client.base_url(MarketKind::Futures), "https://futures.test");
    }

    #[test]
    fn wire_decimal_truncates_and_normalizes() {
        assert_eq!(wire_decimal(dec!(0.123456789)), "0.12345678");
        assert_eq!(wire_decimal(dec!(1.50000000)), "1.5");
        assert_eq!(wire_decimal(dec!(64000)), "64000");
    }

    #[test]
    fn market_order_params() {
        let request = OrderRequest::market(MarketKind::Spot, Symbol::new("BTCUSDT"), Side::Buy, dec!(0.001));
        let params = order_params(&request);
        assert_eq!(
            params,
            vec![
                ("symbol", "BTCUSDT".to_string()),
                ("side", "BUY".to_string()),
                ("type", "MARKET".to_string()),
                ("quantity", "0.001".to_string()),
            ]
        );
    }

    #[test]
    fn limit_order_params_include_gtc_and_price() {
        let request = OrderRequest::limit(
            MarketKind::Futures,
            Symbol::new("ETHUSDT"),
            Side::Sell,
            dec!(0.5),
            dec!(3000.10),
        );
        let params = order_params(&request);
        assert!(params.contains(&("timeInForce", "GTC".to_string())));
        assert!(params.contains(&("price", "3000.1".to_string())));
    }

    #[test]
    fn account_free_balance() {
        let account: AccountResponse = serde_json::from_str(
            r#"{"makerCommission":15,"balances":[
                {"asset":"BTC","free":"0.00100000","locked":"0.00000000"},
                {"asset":"USDT","free":"250.5","locked":"10"}
            ]}"#,
        )
        .unwrap();

        assert_eq!(account.free_balance("USDT"), dec!(250.5));
        assert_eq!(account.free_balance("btc"), dec!(0.001));
        assert_eq!(account.free_balance("ETH"), Decimal::ZERO);
    }

    #[test]
    fn order_response_parses() {
        let response: OrderResponse = serde_json::from_str(
            r#"{"symbol":"BTCUSDT","orderId":28,"clientOrderId":"abc","status":"FILLED","executedQty":"0.00100000"}"#,
        )
        .unwrap();
        assert_eq!(response.order_id, 28);
        assert_eq!(response.status.as_deref(), Some("FILLED"));
        assert_eq!(response.executed_qty, Some(dec!(0.001)));
    }

    #[tokio::test]
    async fn signed_request_without_credentials_is_rejected() {
        let client = BinanceClient::new(&test_config()).unwrap();
        let result = client.get_balance("USDT").await;
        assert!(matches!(result, Err(ExchangeError::Rejected(_))));
    }
}
