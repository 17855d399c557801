//! Prometheus metrics for request tracking and server lifecycle.
//!
//! This module provides metrics for:
//! - HTTP request latency per endpoint
//! - HTTP requests served per endpoint and status
//! - Listener binds and shutdowns
//! - Probe outcomes

use std::time::Instant;

use metrics::{counter, describe_counter, describe_histogram, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use tracing::debug;

// === Metric Name Constants ===

/// HTTP request latency metric name.
pub const METRIC_HTTP_REQUEST_LATENCY: &str = "http_request_latency_ms";
/// Probe round-trip latency metric name.
pub const METRIC_PROBE_LATENCY: &str = "probe_latency_ms";
/// HTTP requests counter metric name.
pub const METRIC_HTTP_REQUESTS: &str = "http_requests_total";
/// Listener binds counter metric name.
pub const METRIC_LISTENER_BINDS: &str = "listener_binds_total";
/// Listener shutdowns counter metric name.
pub const METRIC_LISTENER_SHUTDOWNS: &str = "listener_shutdowns_total";
/// Failed probes counter metric name.
pub const METRIC_PROBE_FAILURES: &str = "probe_failures_total";

/// Initialize all metric descriptions.
/// Call this once at startup to register metrics with descriptions.
pub fn init_metrics() {
    describe_histogram!(
        METRIC_HTTP_REQUEST_LATENCY,
        "HTTP request latency in milliseconds"
    );
    describe_histogram!(
        METRIC_PROBE_LATENCY,
        "Probe request round-trip latency in milliseconds"
    );

    describe_counter!(METRIC_HTTP_REQUESTS, "Total number of HTTP requests served");
    describe_counter!(METRIC_LISTENER_BINDS, "Total number of listeners bound");
    describe_counter!(
        METRIC_LISTENER_SHUTDOWNS,
        "Total number of listeners shut down"
    );
    describe_counter!(
        METRIC_PROBE_FAILURES,
        "Total number of probes that did not get the expected status"
    );

    debug!("Metrics initialized");
}

/// Install the global Prometheus recorder and return its render handle.
pub fn install_prometheus() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Record HTTP request latency.
pub fn record_http_latency(start: Instant, endpoint: &str) {
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
    histogram!(METRIC_HTTP_REQUEST_LATENCY, "endpoint" => endpoint.to_string()).record(latency_ms);
}

/// Increment HTTP requests counter.
pub fn inc_http_requests(endpoint: &str, status: u16) {
    counter!(
        METRIC_HTTP_REQUESTS,
        "endpoint" => endpoint.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Increment listener binds counter.
pub fn inc_listener_binds() {
    counter!(METRIC_LISTENER_BINDS).increment(1);
}

/// Increment listener shutdowns counter.
pub fn inc_listener_shutdowns() {
    counter!(METRIC_LISTENER_SHUTDOWNS).increment(1);
}

/// Increment failed probes counter.
pub fn inc_probe_failures() {
    counter!(METRIC_PROBE_FAILURES).increment(1);
}

/// RAII guard for timing operations.
/// Automatically records latency when dropped.
pub struct LatencyTimer {
    start: Instant,
    metric_name: &'static str,
}

impl LatencyTimer {
    /// Create a new latency timer for the given metric.
    pub fn new(metric_name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            metric_name,
        }
    }

    /// Get elapsed time in milliseconds (without recording).
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyTimer {
    fn drop(&mut self) {
        let latency_ms = self.start.elapsed().as_secs_f64() * 1000.0;
        histogram!(self.metric_name).record(latency_ms);
    }
}

/// Create a latency timer for a probe round trip.
pub fn timer_probe() -> LatencyTimer {
    LatencyTimer::new(METRIC_PROBE_LATENCY)
}
