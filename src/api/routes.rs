//! HTTP API route definitions.

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use super::handlers::{health, metrics, ready, status, AppState};

/// Create the API router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        // Health endpoints
        .route("/health", get(health))
        .route("/ready", get(ready))
        // Status endpoint
        .route("/api/v1/status", get(status))
        .route("/metrics", get(metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::arbitrage::EngineStats;
    use crate::market::{MarketKind, SimulatedExchange, Symbol, TradablePairs};
    use crate::pricebook::PriceBook;
    use crate::trading::{OrderExecutor, PositionManager, RetryPolicy, TriggerThresholds};
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use rust_decimal_macros::dec;
    use tower::ServiceExt;

    fn state() -> AppState {
        let exchange = Arc::new(SimulatedExchange::new(TradablePairs::default(), dec!(1000)));
        let executor = OrderExecutor::new(exchange, RetryPolicy::new(1, Duration::ZERO));
        let positions = Arc::new(PositionManager::new(executor, TriggerThresholds::default()));
        let book = Arc::new(PriceBook::default());
        let symbol = Symbol::new("BTCUSDT");
        book.update(&symbol, MarketKind::Spot, dec!(100));
        book.update(&symbol, MarketKind::Futures, dec!(102));
        positions.open(&symbol, dec!(1), dec!(100), dec!(102)).unwrap();

        AppState::new(book, positions, Arc::new(EngineStats::default()), true)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, String) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (status, _) = get(create_router(state()), "/health").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_endpoint_returns_503_when_not_ready() {
        let (status, _) = get(create_router(state()), "/ready").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn ready_endpoint_returns_200_when_ready() {
        let state = state();
        state.set_ready(true);

        let (status, body) = get(create_router(state), "/ready").await;

        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("\"priced_symbols\":1"));
    }

    #[tokio::test]
    async fn status_lists_open_positions() {
        let (status, body) = get(create_router(state()), "/api/v1/status").await;

        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["mode"], "simulation");
        assert_eq!(json["tracked_symbols"], 1);
        assert_eq!(json["positions"][0]["symbol"], "BTCUSDT");
        assert_eq!(json["positions"][0]["state"], "open");
        assert_eq!(json["stats"]["cycles"], 0);
    }

    #[tokio::test]
    async fn metrics_without_recorder_is_not_found() {
        let (status, _) = get(create_router(state()), "/metrics").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
