//! Metrics exposition.
//!
//! # Metrics
//! - `reconcile_attempts_total` (counter): attempts by `outcome`
//! - `reconcile_duration_seconds` (histogram): applied attempts by `path`
//! - `certificate_wait_seconds` (histogram): time parked waiting for certificates
//! - `snapshot_watermark_seconds` (gauge): timestamp of the last applied snapshot
//! - `registry_delivery_services` (gauge): delivery services in the published registry
//! - `registry_caches` (gauge): caches in the published registry

use std::net::SocketAddr;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Start the Prometheus scrape endpoint on `addr`.
///
/// Must be called from within a Tokio runtime.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => {
            describe();
            tracing::info!(address = %addr, "Metrics endpoint listening");
        }
        Err(e) => tracing::error!(address = %addr, error = %e, "Failed to start metrics exporter"),
    }
}

fn describe() {
    metrics::describe_counter!("reconcile_attempts_total", "Snapshot reconciliation attempts by outcome");
    metrics::describe_histogram!(
        "reconcile_duration_seconds",
        metrics::Unit::Seconds,
        "Duration of applied reconciliations"
    );
    metrics::describe_histogram!(
        "certificate_wait_seconds",
        metrics::Unit::Seconds,
        "Time a publish spent waiting for certificates"
    );
    metrics::describe_gauge!("snapshot_watermark_seconds", "Timestamp of the last applied snapshot");
    metrics::describe_gauge!("registry_delivery_services", "Delivery services in the published registry");
    metrics::describe_gauge!("registry_caches", "Caches in the published registry");
}
