//! Prometheus metrics for the feeds, the decision loop and order flow.
//!
//! Counters and histograms go through the `metrics` facade. The binary installs
//! a Prometheus recorder whose handle renders `/metrics`; without a recorder
//! (unit tests) every call is a no-op.

use std::time::Instant;

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

use crate::market::MarketKind;

// === Metric Name Constants ===

/// Order submission latency metric name.
pub const METRIC_ORDER_SUBMIT_LATENCY: &str = "order_submit_latency_ms";
/// Price ticks received counter metric name.
pub const METRIC_TICKS_RECEIVED: &str = "price_ticks_received_total";
/// Opportunities detected counter metric name.
pub const METRIC_OPPORTUNITIES_DETECTED: &str = "opportunities_detected_total";
/// Positions opened counter metric name.
pub const METRIC_POSITIONS_OPENED: &str = "positions_opened_total";
/// Positions closed counter metric name.
pub const METRIC_POSITIONS_CLOSED: &str = "positions_closed_total";
/// Open positions gauge metric name.
pub const METRIC_OPEN_POSITIONS: &str = "open_positions";
/// Orders submitted counter metric name.
pub const METRIC_ORDERS_SUBMITTED: &str = "orders_submitted_total";
/// Orders failed counter metric name.
pub const METRIC_ORDERS_FAILED: &str = "orders_failed_total";
/// Order retries counter metric name.
pub const METRIC_ORDER_RETRIES: &str = "order_retries_total";
/// Feed reconnects counter metric name.
pub const METRIC_FEED_RECONNECTS: &str = "feed_reconnects_total";

/// Install the Prometheus recorder and describe every metric.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    init_metrics();
    Ok(handle)
}

/// Initialize all metric descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_ORDER_SUBMIT_LATENCY,
        "Order submission latency in milliseconds, retries included"
    );

    describe_counter!(METRIC_TICKS_RECEIVED, "Total number of trade price ticks applied");
    describe_counter!(
        METRIC_OPPORTUNITIES_DETECTED,
        "Total number of decision cycles that found a profitable symbol"
    );
    describe_counter!(METRIC_POSITIONS_OPENED, "Total number of hedged positions opened");
    describe_counter!(METRIC_POSITIONS_CLOSED, "Total number of hedged positions closed");
    describe_gauge!(METRIC_OPEN_POSITIONS, "Number of currently open positions");
    describe_counter!(METRIC_ORDERS_SUBMITTED, "Total number of orders accepted");
    describe_counter!(
        METRIC_ORDERS_FAILED,
        "Total number of orders that failed after retries"
    );
    describe_counter!(METRIC_ORDER_RETRIES, "Total number of order attempts that were retried");
    describe_counter!(METRIC_FEED_RECONNECTS, "Total number of trade feed reconnections");

    debug!("Metrics initialized");
}

/// Record order submission latency.
pub fn record_order_submit_latency(start: Instant, market: MarketKind) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_ORDER_SUBMIT_LATENCY, "market" => market.to_string()).record(latency_ms);
}

/// Increment price ticks counter.
pub fn inc_ticks_received(market: MarketKind) {
    counter!(METRIC_TICKS_RECEIVED, "market" => market.to_string()).increment(1);
}

/// Increment opportunities detected counter.
pub fn inc_opportunities_detected() {
    counter!(METRIC_OPPORTUNITIES_DETECTED).increment(1);
}

/// Increment positions opened counter.
pub fn inc_positions_opened() {
    counter!(METRIC_POSITIONS_OPENED).increment(1);
}

/// Increment positions closed counter.
pub fn inc_positions_closed(trigger: &str) {
    counter!(METRIC_POSITIONS_CLOSED, "trigger" => trigger.to_string()).increment(1);
}

/// Set the open positions gauge.
pub fn set_open_positions(count: usize) {
    gauge!(METRIC_OPEN_POSITIONS).set(count as f64);
}

/// Increment orders submitted counter.
pub fn inc_orders_submitted(market: MarketKind) {
    counter!(METRIC_ORDERS_SUBMITTED, "market" => market.to_string()).increment(1);
}

/// Increment orders failed counter.
pub fn inc_orders_failed(market: MarketKind) {
    counter!(METRIC_ORDERS_FAILED, "market" => market.to_string()).increment(1);
}

/// Increment order retries counter.
pub fn inc_order_retries() {
    counter!(METRIC_ORDER_RETRIES).increment(1);
}

/// Increment feed reconnects counter.
pub fn inc_feed_reconnects(market: MarketKind) {
    counter!(METRIC_FEED_RECONNECTS, "market" => market.to_string()).increment(1);
}
