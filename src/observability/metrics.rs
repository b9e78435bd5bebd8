//! Metrics collection and exposition.
//!
//! # Metrics
//! - `gateway_requests_total` (counter): requests by route, status
//! - `gateway_request_duration_seconds` (histogram): latency by route
//! - `gateway_rate_limited_total` (counter): rejections by limiter class
//! - `gateway_auth_failures_total` (counter): rejected credentials by reason
//! - `gateway_upstream_failures_total` (counter): failed calls by service, kind
//! - `gateway_breaker_transitions_total` (counter): transitions by breaker, state

use std::sync::OnceLock;
use std::time::Instant;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

static PROMETHEUS: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Install the Prometheus recorder. Safe to call more than once; only the
/// first call installs anything.
pub fn init_metrics() -> Option<&'static PrometheusHandle> {
    PROMETHEUS
        .get_or_init(|| match PrometheusBuilder::new().install_recorder() {
            Ok(handle) => {
                tracing::info!("Prometheus recorder installed");
                Some(handle)
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install Prometheus recorder");
                None
            }
        })
        .as_ref()
}

pub fn record_request(route: &str, status: u16, started: Instant) {
    counter!(
        "gateway_requests_total",
        "route" => route.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
    histogram!("gateway_request_duration_seconds", "route" => route.to_string())
        .record(started.elapsed().as_secs_f64());
}

pub fn record_rate_limited(class: &str) {
    counter!("gateway_rate_limited_total", "class" => class.to_string()).increment(1);
}

pub fn record_auth_failure(reason: &'static str) {
    counter!("gateway_auth_failures_total", "reason" => reason).increment(1);
}

pub fn record_upstream_failure(service: &str, kind: &'static str) {
    counter!(
        "gateway_upstream_failures_total",
        "service" => service.to_string(),
        "kind" => kind
    )
    .increment(1);
}

pub fn record_breaker_transition(breaker: &str, state: &'static str) {
    counter!(
        "gateway_breaker_transitions_total",
        "breaker" => breaker.to_string(),
        "state" => state
    )
    .increment(1);
}
