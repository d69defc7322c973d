//! Metrics collection and exposition.
//!
//! # Metrics
//! - `server_requests_total` (counter): requests by outcome (resolved, miss)
//! - `server_request_duration_seconds` (histogram): receipt to response written
//! - `server_module_failures_total` (counter): failed module calls by kind
//! - `server_connections_total` (counter): accepted connections
//! - `server_connections_active` (gauge): currently open connections
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade; without an installed
//!   recorder every call is a no-op, which keeps tests and embedders quiet
//! - Prometheus exposition is opt-in from the binary

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus exporter with an HTTP scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Metrics endpoint listening");
    Ok(())
}

/// Record a finished request.
pub fn record_request(outcome: &'static str, started: Instant) {
    metrics::counter!("server_requests_total", "outcome" => outcome).increment(1);
    metrics::histogram!("server_request_duration_seconds", "outcome" => outcome)
        .record(started.elapsed().as_secs_f64());
}

/// Record a module call that failed, panicked or timed out.
pub fn record_module_failure(kind: &'static str) {
    metrics::counter!("server_module_failures_total", "kind" => kind).increment(1);
}

pub fn record_connection_opened() {
    metrics::counter!("server_connections_total").increment(1);
    metrics::gauge!("server_connections_active").increment(1.0);
}

pub fn record_connection_closed() {
    metrics::gauge!("server_connections_active").decrement(1.0);
}
