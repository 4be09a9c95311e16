//! Logging and metrics setup for the server binary.
//!
//! Logs go through `tracing-subscriber` (env filter + fmt layer). Metrics
//! are recorded through the `metrics` facade and scraped from a dedicated
//! Prometheus listener on `METRICS_PORT`, separate from the API port.

use axum::{Router, routing::get};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Latency buckets (seconds) for every `*_duration_seconds` histogram.
const DURATION_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Install the Prometheus recorder and describe the business metrics.
///
/// # Errors
///
/// Returns [`BuildError`] if the bucket layout is rejected or a recorder is
/// already installed.
pub fn install_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Suffix("duration_seconds".to_string()),
            DURATION_BUCKETS,
        )?
        .install_recorder()?;

    cdk_core::metrics::register_business_metrics();
    Ok(handle)
}

/// Router exposing `GET /metrics` in the Prometheus text format.
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route("/metrics", get(move || std::future::ready(handle.render())))
}

/// Serve [`metrics_router`] on `addr` until the process exits.
///
/// Bind or serve failures are logged; the API keeps running without metrics.
pub fn spawn_metrics_server(handle: PrometheusHandle, addr: SocketAddr) {
    tokio::spawn(async move {
        let listener = match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(%addr, error = %e, "Failed to bind metrics listener");
                return;
            }
        };
        tracing::info!(%addr, "Metrics server listening at http://{addr}/metrics");
        if let Err(e) = axum::serve(listener, metrics_router(handle)).await {
            tracing::error!(error = %e, "Metrics server stopped");
        }
    });
}
