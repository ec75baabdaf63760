//! Metrics collection and exposition.
//!
//! # Metrics
//! - `service_requests_total` (counter): responses by method and status
//! - `service_request_duration_seconds` (histogram): latency distribution
//! - `service_envelope_failures_total` (counter): envelopes that failed to encode
//! - `service_panics_total` (counter): handler panics converted to 500s
//! - `service_shutdowns_total` (counter): shutdowns by reason and outcome

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter with an HTTP scrape listener.
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter"),
    }
}

/// Record a completed request.
pub fn record_request(method: &str, status: u16, start: Instant) {
    let status = status.to_string();
    ::metrics::counter!(
        "service_requests_total",
        "method" => method.to_string(),
        "status" => status.clone()
    )
    .increment(1);
    ::metrics::histogram!(
        "service_request_duration_seconds",
        "method" => method.to_string(),
        "status" => status
    )
    .record(start.elapsed().as_secs_f64());
}

/// Record an envelope that could not be encoded.
pub fn record_envelope_failure() {
    ::metrics::counter!("service_envelope_failures_total").increment(1);
}

/// Record a handler panic that was converted into a response.
pub fn record_panic() {
    ::metrics::counter!("service_panics_total").increment(1);
}

/// Record how the lifecycle manager shut down.
pub fn record_shutdown(reason: &'static str, outcome: &'static str) {
    ::metrics::counter!(
        "service_shutdowns_total",
        "reason" => reason,
        "outcome" => outcome
    )
    .increment(1);
}
