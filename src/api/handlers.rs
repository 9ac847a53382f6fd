//! HTTP API handlers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;

use crate::arbitrage::{EngineStats, EngineStatsSnapshot};
use crate::pricebook::PriceBook;
use crate::trading::{Position, PositionManager};

/// Application state shared with handlers.
#[derive(Clone)]
pub struct AppState {
    /// Whether the trade feeds have been started.
    ready: Arc<AtomicBool>,
    /// Simulation mode.
    dry_run: bool,
    /// Live prices.
    book: Arc<PriceBook>,
    /// Open positions.
    positions: Arc<PositionManager>,
    /// Decision loop counters.
    stats: Arc<EngineStats>,
    /// Prometheus renderer, when a recorder is installed.
    prometheus: Option<PrometheusHandle>,
}

impl AppState {
    /// Create new app state.
    pub fn new(
        book: Arc<PriceBook>,
        positions: Arc<PositionManager>,
        stats: Arc<EngineStats>,
        dry_run: bool,
    ) -> Self {
        Self {
            ready: Arc::new(AtomicBool::new(false)),
            dry_run,
            book,
            positions,
            stats,
            prometheus: None,
        }
    }

    /// Serve `/metrics` from this Prometheus handle.
    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(handle);
        self
    }

    /// Set ready state.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Check if ready.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Status: "ok".
    pub status: &'static str,
}

/// Readiness check response.
#[derive(Debug, Serialize)]
pub struct ReadyResponse {
    /// Whether the feeds are running.
    pub ready: bool,
    /// Symbols with both prices.
    pub priced_symbols: usize,
}

/// Status response.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// Service status.
    pub status: &'static str,
    /// "simulation" or "live".
    pub mode: &'static str,
    /// Symbols tracked.
    pub tracked_symbols: usize,
    /// Symbols with both prices.
    pub priced_symbols: usize,
    /// Open positions.
    pub positions: Vec<Position>,
    /// Decision loop counters.
    pub stats: EngineStatsSnapshot,
}

/// Health check handler - always returns 200.
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse { status: "ok" })
}

/// Readiness check handler - returns 200 if ready, 503 otherwise.
pub async fn ready(State(state): State<AppState>) -> impl IntoResponse {
    let response = ReadyResponse {
        ready: state.is_ready(),
        priced_symbols: state.book.ready_count(),
    };

    if response.ready {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}

/// Status handler - returns tracked symbols, positions and counters.
pub async fn status(State(state): State<AppState>) -> impl IntoResponse {
    Json(StatusResponse {
        status: if state.is_ready() { "running" } else { "starting" },
        mode: if state.dry_run { "simulation" } else { "live" },
        tracked_symbols: state.book.len(),
        priced_symbols: state.book.ready_count(),
        positions: state.positions.positions(),
        stats: state.stats.snapshot(),
    })
}

/// Prometheus exposition handler.
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (
            StatusCode::NOT_FOUND,
            "metrics recorder not installed".to_string(),
        ),
    }
}
