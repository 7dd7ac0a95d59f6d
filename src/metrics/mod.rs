//! Metrics for the matching backend.
//!
//! Prometheus-compatible metrics for monitoring:
//! - Matching engine throughput (placements, cancels, rejections, trades)
//! - Command processing latency
//! - Store commit retries and engine pauses
//! - Command queue depth

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};

use crate::models::{OrderSide, OrderType};

/// Metric names as constants for consistency
pub mod names {
    pub const ORDERS_PLACED_TOTAL: &str = "orders_placed_total";
    pub const ORDERS_CANCELLED_TOTAL: &str = "orders_cancelled_total";
    pub const ORDERS_REJECTED_TOTAL: &str = "orders_rejected_total";
    pub const TRADES_EXECUTED_TOTAL: &str = "trades_executed_total";
    pub const COMMAND_DURATION_SECONDS: &str = "command_duration_seconds";
    pub const COMMIT_RETRIES_TOTAL: &str = "commit_retries_total";
    pub const ENGINE_PAUSES_TOTAL: &str = "engine_pauses_total";
    pub const COMMAND_QUEUE_DEPTH: &str = "command_queue_depth";
}

/// Label keys
pub mod labels {
    pub const SIDE: &str = "side";
    pub const ORDER_TYPE: &str = "order_type";
}

/// Initialize Prometheus metrics exporter
///
/// Returns a handle that can be used to render metrics
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        // Command processing should be sub-millisecond without store I/O
        .set_buckets_for_metric(
            Matcher::Full(names::COMMAND_DURATION_SECONDS.to_string()),
            &[0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0],
        )
        .expect("invalid histogram buckets")
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

pub fn record_order_placed(side: &OrderSide, order_type: &OrderType) {
    counter!(
        names::ORDERS_PLACED_TOTAL,
        labels::SIDE => side.to_string(),
        labels::ORDER_TYPE => order_type.to_string()
    )
    .increment(1);
}

pub fn record_order_cancelled() {
    counter!(names::ORDERS_CANCELLED_TOTAL).increment(1);
}

pub fn record_order_rejected() {
    counter!(names::ORDERS_REJECTED_TOTAL).increment(1);
}

pub fn record_trade_executed() {
    counter!(names::TRADES_EXECUTED_TOTAL).increment(1);
}

pub fn record_command_duration(duration_secs: f64) {
    histogram!(names::COMMAND_DURATION_SECONDS).record(duration_secs);
}

pub fn record_commit_retry() {
    counter!(names::COMMIT_RETRIES_TOTAL).increment(1);
}

pub fn record_engine_pause() {
    counter!(names::ENGINE_PAUSES_TOTAL).increment(1);
}

pub fn set_queue_depth(depth: usize) {
    gauge!(names::COMMAND_QUEUE_DEPTH).set(depth as f64);
}
