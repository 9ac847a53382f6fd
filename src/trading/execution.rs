//! Order execution with bounded retries.

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use super::order::{Order, OrderRequest, Side};
use crate::error::{ExchangeError, TradingError};
use crate::market::{ExchangeGateway, MarketKind, Symbol};
use crate::metrics;

/// Decides whether an exchange error is worth another attempt.
pub type RetryClassifier = fn(&ExchangeError) -> bool;

/// Fixed-delay retry policy with a pluggable error classifier.
#[derive(Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
    classify: RetryClassifier,
}

impl fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(2))
    }
}

/// Failure after the retry policy gave up.
#[derive(Debug)]
pub struct RetryFailure {
    /// Attempts made.
    pub attempts: u32,
    /// Last error seen.
    pub last_error: ExchangeError,
    /// The classifier refused to retry the last error.
    pub permanent: bool,
}

impl RetryPolicy {
    /// Policy that retries every error.
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts,
            delay,
            classify: Self::retry_all,
        }
    }

    /// Replace the error classifier.
    pub fn with_classifier(mut self, classify: RetryClassifier) -> Self {
        self.classify = classify;
        self
    }

    /// Classifier that retries every error.
    pub fn retry_all(_: &ExchangeError) -> bool {
        true
    }

    /// Classifier that retries only transient errors.
    pub fn transient_only(error: &ExchangeError) -> bool {
        error.is_transient()
    }

    /// Whether `error` should be retried.
    pub fn should_retry(&self, error: &ExchangeError) -> bool {
        (self.classify)(error)
    }

    /// Run `op` until it succeeds, the classifier refuses, or attempts run out.
    ///
    /// No delay follows the final attempt.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ExchangeError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let retryable = self.should_retry(&e);
                    if !retryable || attempt >= max_attempts {
                        return Err(RetryFailure {
                            attempts: attempt,
                            last_error: e,
                            permanent: !retryable,
                        });
                    }

                    warn!(
                        label,
                        attempt,
                        max_attempts,
                        error = %e,
                        delay_ms = self.delay.as_millis() as u64,
                        "Attempt failed, retrying"
                    );
                    metrics::inc_order_retries();
                    sleep(self.delay).await;
                }
            }
        }
    }
}

/// Results of the two legs of an open or close.
#[derive(Debug)]
pub struct LegResults {
    /// Spot leg.
    pub spot: Result<Order, TradingError>,
    /// Futures leg.
    pub futures: Result<Order, TradingError>,
}

impl LegResults {
    /// Whether both legs succeeded.
    pub fn both_ok(&self) -> bool {
        self.spot.is_ok() && self.futures.is_ok()
    }

    /// Whether exactly one leg succeeded.
    pub fn is_partial(&self) -> bool {
        self.spot.is_ok() != self.futures.is_ok()
    }
}

/// Places orders through an exchange gateway under a retry policy.
#[derive(Clone)]
pub struct OrderExecutor {
    gateway: Arc<dyn ExchangeGateway>,
    policy: RetryPolicy,
}

impl fmt::Debug for OrderExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderExecutor")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl OrderExecutor {
    /// Create an executor.
    pub fn new(gateway: Arc<dyn ExchangeGateway>, policy: RetryPolicy) -> Self {
        Self { gateway, policy }
    }

    /// Place an order, retrying per the policy.
    #[instrument(skip(self, request), fields(market = %request.market, symbol = %request.symbol, side = %request.side, quantity = %request.quantity))]
    pub async fn place_order(&self, request: OrderRequest) -> Result<Order, TradingError> {
        request.validate().map_err(TradingError::InvalidParams)?;

        let gateway = self.gateway.as_ref();
        let req = &request;
        let start = Instant::now();
        let result = self
            .policy
            .run("place_order", move || gateway.place_order(req))
            .await;
        metrics::record_order_submit_latency(start, request.market);

        match result {
            Ok(order) => {
                metrics::inc_orders_submitted(request.market);
                info!(order_id = %order.order_id, status = ?order.status, "Order placed");
                Ok(order)
            }
            Err(failure) => {
                metrics::inc_orders_failed(request.market);
                error!(
                    attempts = failure.attempts,
                    error = %failure.last_error,
                    "Order failed"
                );

                if failure.permanent {
                    Err(TradingError::Rejected {
                        market: request.market,
                        symbol: request.symbol,
                        reason: failure.last_error.to_string(),
                    })
                } else {
                    Err(TradingError::RetriesExhausted {
                        market: request.market,
                        symbol: request.symbol,
                        attempts: failure.attempts,
                        last_error: failure.last_error.to_string(),
                    })
                }
            }
        }
    }

    /// Free balance of `asset`, `None` once the retry policy gives up.
    #[instrument(skip(self))]
    pub async fn get_balance(&self, asset: &str) -> Option<Decimal> {
        let gateway = self.gateway.as_ref();
        match self
            .policy
            .run("get_balance", move || gateway.get_balance(asset))
            .await
        {
            Ok(balance) => {
                debug!(balance = %balance, "Balance retrieved");
                Some(balance)
            }
            Err(failure) => {
                error!(attempts = failure.attempts, error = %failure.last_error, "Balance unavailable");
                None
            }
        }
    }

    /// Open a hedge: spot buy and futures sell, submitted concurrently.
    #[instrument(skip(self))]
    pub async fn open_legs(&self, symbol: &Symbol, quantity: Decimal) -> LegResults {
        let spot = OrderRequest::market(MarketKind::Spot, symbol.clone(), Side::Buy, quantity);
        let futures = OrderRequest::market(MarketKind::Futures, symbol.clone(), Side::Sell, quantity);

        let (spot, futures) = tokio::join!(self.place_order(spot), self.place_order(futures));
        LegResults { spot, futures }
    }

    /// Unwind a hedge: spot sell, then futures buy. A failed leg does not stop
    /// the other.
    #[instrument(skip(self))]
    pub async fn close_position(&self, symbol: &Symbol, quantity: Decimal) -> LegResults {
        let spot = self
            .place_order(OrderRequest::market(
                MarketKind::Spot,
                symbol.clone(),
                Side::Sell,
                quantity,
            ))
            .await;
        let futures = self
            .place_order(OrderRequest::market(
                MarketKind::Futures,
                symbol.clone(),
                Side::Buy,
                quantity,
            ))
            .await;

        LegResults { spot, futures }
    }
}
