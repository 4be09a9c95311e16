//! Request tracking middleware.
//!
//! [`track_request`] gives every request a correlation ID (from the
//! `X-Correlation-ID` header or a new UUID), runs the handler inside an
//! `http_request` span carrying it, logs the outcome with its latency and
//! echoes the ID back in the response header.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/api/v1/projects/:id/receive", post(receive))
//!     .layer(axum::middleware::from_fn(track_request));
//! ```

use axum::{
    extract::Request,
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// Correlation ID header, read from requests and set on responses.
pub const CORRELATION_ID_HEADER: &str = "X-Correlation-ID";

/// Correlation ID carried by `headers`, if it is a valid UUID.
pub(crate) fn correlation_id_from(headers: &HeaderMap) -> Option<Uuid> {
    headers
        .get(CORRELATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| Uuid::parse_str(s.trim()).ok())
}

/// Tag the request with a correlation ID and log its completion.
///
/// The ID is stored as a request extension so
/// [`crate::extractors::CorrelationId`] sees the same value.
pub async fn track_request(mut req: Request, next: Next) -> Response {
    let correlation_id = correlation_id_from(req.headers()).unwrap_or_else(Uuid::new_v4);
    req.extensions_mut().insert(correlation_id);

    let span = tracing::info_span!(
        "http_request",
        correlation_id = %correlation_id,
        method = %req.method(),
        path = %req.uri().path(),
    );

    async move {
        let started = Instant::now();
        let mut response = next.run(req).await;

        let status = response.status().as_u16();
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        if response.status().is_server_error() {
            tracing::warn!(status, latency_ms, "Request completed");
        } else {
            tracing::debug!(status, latency_ms, "Request completed");
        }

        if let Ok(value) = HeaderValue::from_str(&correlation_id.hyphenated().to_string()) {
            response.headers_mut().insert(CORRELATION_ID_HEADER, value);
        }
        response
    }
    .instrument(span)
    .await
}
