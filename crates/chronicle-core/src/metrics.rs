//! Prometheus metrics helpers for the Chronicle system.
//!
//! This module provides centralized metrics initialization and common metric
//! definitions used across Chronicle components.
//!
//! # Metric Naming Conventions
//!
//! - Prefix: component name (e.g., `ingest_`, `backfill_`, `refresh_`)
//! - Suffix: unit or type (e.g., `_total`, `_seconds`)
//! - Labels: use sparingly to avoid cardinality explosion

use axum::{Router, routing::get};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;

/// Initialize the Prometheus metrics recorder.
///
/// This must be called once at startup before any metrics are recorded.
/// Returns a handle that can be used with [`start_metrics_server`].
///
/// # Panics
///
/// Panics if called more than once (the recorder can only be installed once).
pub fn init_metrics() -> PrometheusHandle {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder");

    register_common_metrics();

    handle
}

/// Try to initialize the Prometheus metrics recorder.
///
/// Like [`init_metrics`] but returns `None` if the recorder is already
/// installed, instead of panicking. Useful for tests or optional metrics.
pub fn try_init_metrics() -> Option<PrometheusHandle> {
    PrometheusBuilder::new().install_recorder().ok()
}

/// Start the Prometheus metrics HTTP server.
///
/// Serves the `/metrics` endpoint on the specified port.
/// This spawns a background task and returns immediately.
pub async fn start_metrics_server(
    port: u16,
    handle: PrometheusHandle,
) -> Result<(), std::io::Error> {
    let app = Router::new().route(
        "/metrics",
        get(move || {
            let handle = handle.clone();
            async move { handle.render() }
        }),
    );

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Metrics server listening on http://{}/metrics", addr);

    tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
        axum::serve(listener, app).await.unwrap();
    });

    Ok(())
}

/// Register descriptions for common metrics used across Chronicle.
///
/// Called automatically by [`init_metrics`].
fn register_common_metrics() {
    // =========================================================================
    // Live Ingestion Metrics
    // =========================================================================

    describe_counter!("ingest_posts_saved_total", "Posts written to the store");
    describe_counter!(
        "ingest_posts_duplicate_total",
        "Posts absorbed as duplicates by the dedup constraint"
    );
    describe_counter!(
        "ingest_albums_grouped_total",
        "Albums reassembled from multi-message groups"
    );
    describe_gauge!(
        "ingest_albums_pending",
        "Albums currently buffered awaiting their debounce timer"
    );
    describe_gauge!(
        "ingest_running",
        "Whether the ingestion daemon is running (1=yes, 0=no)"
    );

    // =========================================================================
    // Backfill Metrics
    // =========================================================================

    describe_counter!(
        "backfill_messages_total",
        "Messages scanned during historical backfill"
    );
    describe_counter!(
        "backfill_posts_saved_total",
        "Posts written to the store during backfill"
    );
    describe_counter!(
        "backfill_channels_synced_total",
        "Channels whose backfill completed down to the cutoff date"
    );

    // =========================================================================
    // Stats Refresh Metrics
    // =========================================================================

    describe_counter!("refresh_cycles_total", "Completed refresh cycles");
    describe_counter!(
        "refresh_posts_updated_total",
        "Posts whose view/reaction counts changed (label: tier)"
    );
    describe_counter!(
        "refresh_fetch_failures_total",
        "Point lookups that failed during refresh"
    );
}

/// Increment a counter.
///
/// Convenience wrapper around `metrics::counter!`.
#[inline]
pub fn increment(name: &'static str, count: u64) {
    metrics::counter!(name).increment(count);
}

/// Set a gauge value.
///
/// Convenience wrapper around `metrics::gauge!`.
#[inline]
pub fn set_gauge(name: &'static str, value: f64) {
    metrics::gauge!(name).set(value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Once;

    // Ensure metrics are initialized exactly once for all tests
    static INIT: Once = Once::new();

    fn ensure_metrics_init() {
        INIT.call_once(|| {
            let _ = try_init_metrics();
        });
    }

    #[test]
    fn test_try_init_metrics_idempotent() {
        let handle1 = try_init_metrics();
        let handle2 = try_init_metrics();

        // At most one should succeed
        assert!(handle1.is_none() || handle2.is_none());
    }

    #[test]
    fn test_increment_does_not_panic() {
        ensure_metrics_init();
        increment("test_counter", 0);
        increment("test_counter", 1);
        increment("test_counter", 100);
    }

    #[test]
    fn test_set_gauge_does_not_panic() {
        ensure_metrics_init();
        set_gauge("test_gauge", 0.0);
        set_gauge("test_gauge", 42.5);
        set_gauge("test_gauge", -100.0);
    }

    #[test]
    fn test_register_common_metrics_idempotent() {
        ensure_metrics_init();
        register_common_metrics();
        register_common_metrics();
    }
}
