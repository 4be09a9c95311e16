//! Health check endpoints.
//!
//! `/health` is liveness only. `/ready` runs every registered
//! [`ReadinessProbe`] (Postgres, Redis, ...) concurrently and answers 503 if
//! any of them fails, so load balancers stop routing claims to an instance
//! that cannot reach its stores.

use async_trait::async_trait;
use axum::{Json, http::StatusCode};
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;

/// Simple health check endpoint (for basic liveness).
///
/// ```text
/// GET /health -> 200 "ok"
/// ```
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}

/// A dependency checked by the readiness endpoint.
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    /// Component name reported in the response.
    fn component(&self) -> &'static str;

    /// Round-trip the dependency.
    ///
    /// # Errors
    ///
    /// Returns a human-readable reason when the dependency is unreachable.
    async fn check(&self) -> Result<(), String>;
}

/// Result of one probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ComponentHealth {
    /// Component name
    pub component: &'static str,
    /// Whether the probe succeeded
    pub healthy: bool,
    /// Failure reason
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Readiness response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessReport {
    /// `ready` or `unavailable`
    pub status: &'static str,
    /// Per-component results, in probe order
    pub components: Vec<ComponentHealth>,
}

/// Run all probes and build the readiness response.
///
/// ```text
/// GET /ready -> 200 {"status":"ready","components":[...]}
///            -> 503 {"status":"unavailable","components":[...]}
/// ```
pub async fn readiness(probes: &[Arc<dyn ReadinessProbe>]) -> (StatusCode, Json<ReadinessReport>) {
    let results = join_all(probes.iter().map(|probe| async move {
        let outcome = probe.check().await;
        if let Err(reason) = &outcome {
            tracing::warn!(component = probe.component(), reason = %reason, "Readiness probe failed");
        }
        ComponentHealth {
            component: probe.component(),
            healthy: outcome.is_ok(),
            message: outcome.err(),
        }
    }))
    .await;

    let ready = results.iter().all(|c| c.healthy);
    let (status, label) = if ready {
        (StatusCode::OK, "ready")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable")
    };

    (
        status,
        Json(ReadinessReport {
            status: label,
            components: results,
        }),
    )
}
