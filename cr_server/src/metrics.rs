//! Prometheus metrics for server health.
//!
//! Exposed in Prometheus text format on the `METRICS_BIND` listener
//! when configured.

use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;

/// Install the Prometheus exporter on `addr`; metrics scrape at
/// `http://<addr>/metrics`.
pub fn init_metrics(addr: SocketAddr) -> Result<(), String> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus exporter: {e}"))
}

/// Increment total WebSocket connections.
pub fn websocket_connections_total() {
    metrics::counter!("websocket_connections_total").increment(1);
}

/// Increment WebSocket messages received.
pub fn websocket_messages_received() {
    metrics::counter!("websocket_messages_received").increment(1);
}

/// Increment authentication attempts.
pub fn auth_attempts_total(success: bool) {
    metrics::counter!("auth_attempts_total",
        "success" => success.to_string()
    )
    .increment(1);
}

/// Increment rate-limit rejections.
pub fn rate_limit_hits_total(endpoint: &str) {
    metrics::counter!("rate_limit_hits_total",
        "endpoint" => endpoint.to_string()
    )
    .increment(1);
}
