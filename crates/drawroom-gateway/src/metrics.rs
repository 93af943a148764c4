//! Prometheus metrics recording and endpoint.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus metrics recorder and return the handle for rendering.
pub fn install_prometheus_recorder() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    Ok(handle)
}

/// Record a new WebSocket connection.
pub fn record_ws_connect() {
    metrics::gauge!("ws_connections_active").increment(1.0);
}

/// Record a WebSocket disconnection.
pub fn record_ws_disconnect() {
    metrics::gauge!("ws_connections_active").decrement(1.0);
}

/// Record an inbound client frame by kind.
pub fn record_frame(kind: &str) {
    let labels = [("kind", kind.to_string())];
    metrics::counter!("frames_received_total", &labels).increment(1);
}

/// Record a frame that could not be decoded.
pub fn record_malformed_frame() {
    metrics::counter!("frames_malformed_total").increment(1);
}

/// Record a fan-out delivery skipped because the recipient's queue was full or closed.
pub fn record_dropped_delivery() {
    metrics::counter!("deliveries_dropped_total").increment(1);
}

/// Set the number of live rooms.
pub fn set_rooms(count: usize) {
    metrics::gauge!("rooms_active").set(count as f64);
}
