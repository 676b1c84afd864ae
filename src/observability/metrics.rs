//! Metrics collection and exposition.
//!
//! # Metrics
//! - `remoting_connections_accepted_total` (counter)
//! - `remoting_active_connections` (gauge)
//! - `remoting_frames_decoded_total` (counter)
//! - `remoting_invocations_total` (counter): by method, outcome
//! - `remoting_idle_events_total` (counter)
//! - `remoting_tasks_rejected_total` (counter)
//! - `remoting_tasks_abandoned_total` (counter)
//!
//! Every series carries a `server` label. Without an installed recorder the
//! calls are no-ops.

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter listening on `addr`.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_connection_accepted(server: &str) {
    metrics::counter!("remoting_connections_accepted_total", "server" => server.to_string())
        .increment(1);
}

pub fn record_active_connections(server: &str, count: u64) {
    metrics::gauge!("remoting_active_connections", "server" => server.to_string())
        .set(count as f64);
}

pub fn record_frame_decoded(server: &str) {
    metrics::counter!("remoting_frames_decoded_total", "server" => server.to_string())
        .increment(1);
}

pub fn record_invocation(server: &str, method: &str, success: bool) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!(
        "remoting_invocations_total",
        "server" => server.to_string(),
        "method" => method.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

pub fn record_idle_event(server: &str) {
    metrics::counter!("remoting_idle_events_total", "server" => server.to_string()).increment(1);
}

pub fn record_task_rejected(server: &str) {
    metrics::counter!("remoting_tasks_rejected_total", "server" => server.to_string())
        .increment(1);
}

pub fn record_tasks_abandoned(server: &str, count: usize) {
    metrics::counter!("remoting_tasks_abandoned_total", "server" => server.to_string())
        .increment(count as u64);
}
