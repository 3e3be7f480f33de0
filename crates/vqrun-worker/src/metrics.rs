//! Prometheus metrics for quality runs.

use std::net::SocketAddr;

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder with an HTTP scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) -> Result<(), BuildError> {
    PrometheusBuilder::new().with_http_listener(addr).install()
}

/// Metric names as constants for consistency.
pub mod names {
    pub const CACHE_HITS_TOTAL: &str = "vqrun_cache_hits_total";
    pub const CACHE_MISSES_TOTAL: &str = "vqrun_cache_misses_total";
    pub const ASSETS_FAILED_TOTAL: &str = "vqrun_assets_failed_total";
    pub const COMPUTE_DURATION_SECONDS: &str = "vqrun_compute_duration_seconds";
}

pub fn record_cache_hit(executor: &str) {
    let labels = [("executor", executor.to_string())];
    counter!(names::CACHE_HITS_TOTAL, &labels).increment(1);
}

pub fn record_cache_miss(executor: &str) {
    let labels = [("executor", executor.to_string())];
    counter!(names::CACHE_MISSES_TOTAL, &labels).increment(1);
}

pub fn record_asset_failed(executor: &str, kind: &str) {
    let labels = [
        ("executor", executor.to_string()),
        ("kind", kind.to_string()),
    ];
    counter!(names::ASSETS_FAILED_TOTAL, &labels).increment(1);
}

pub fn record_compute_duration(executor: &str, duration_secs: f64) {
    let labels = [("executor", executor.to_string())];
    histogram!(names::COMPUTE_DURATION_SECONDS, &labels).record(duration_secs);
}
