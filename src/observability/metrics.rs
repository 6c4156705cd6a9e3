//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_connections_total` (counter): accepted TCP connections
//! - `gateway_connections_active` (gauge): connections currently served
//! - `gateway_http_responses_total` (counter, labels: status)
//! - `gateway_handshakes_total` (counter, labels: outcome)
//! - `gateway_frames_total` (counter, labels: kind)
//! - `gateway_worker_requests_total` (counter, labels: outcome)
//! - `gateway_worker_duration_seconds` (histogram): worker round trips
//!
//! # Design Decisions
//! - Recording goes through the `metrics` facade and is a no-op until a
//!   recorder is installed, so tests never need an exporter
//! - The Prometheus exporter is optional and serves its own HTTP listener

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

pub const CONNECTIONS_TOTAL: &str = "gateway_connections_total";
pub const CONNECTIONS_ACTIVE: &str = "gateway_connections_active";
pub const HTTP_RESPONSES_TOTAL: &str = "gateway_http_responses_total";
pub const HANDSHAKES_TOTAL: &str = "gateway_handshakes_total";
pub const FRAMES_TOTAL: &str = "gateway_frames_total";
pub const WORKER_REQUESTS_TOTAL: &str = "gateway_worker_requests_total";
pub const WORKER_DURATION_SECONDS: &str = "gateway_worker_duration_seconds";

/// Install the global Prometheus recorder with a scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime, once per process.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    tracing::info!(address = %addr, "Prometheus exporter listening");
    Ok(())
}

pub fn record_connection_opened() {
    counter!(CONNECTIONS_TOTAL).increment(1);
    gauge!(CONNECTIONS_ACTIVE).increment(1.0);
}

pub fn record_connection_closed() {
    gauge!(CONNECTIONS_ACTIVE).decrement(1.0);
}

pub fn record_http_response(status: u16) {
    counter!(HTTP_RESPONSES_TOTAL, "status" => status.to_string()).increment(1);
}

/// `outcome` is `accepted` or `rejected`.
pub fn record_handshake(outcome: &'static str) {
    counter!(HANDSHAKES_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_frame(kind: &str) {
    counter!(FRAMES_TOTAL, "kind" => kind.to_string()).increment(1);
}

/// `outcome` is one of `replied`, `timeout`, `failed`, `cancelled`.
pub fn record_worker_request(outcome: &'static str, started: Instant) {
    counter!(WORKER_REQUESTS_TOTAL, "outcome" => outcome).increment(1);
    histogram!(WORKER_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
}
