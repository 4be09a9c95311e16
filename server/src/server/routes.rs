//! Router configuration for the CDK service.

use super::health::{health_check, readiness_check};
use super::state::AppState;
use crate::api;
use axum::{
    Router,
    http::{HeaderName, HeaderValue, Method, header},
    middleware::from_fn,
    routing::{get, post},
};
use cdk_web::track_request;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Build the complete Axum router.
///
/// - `/health`, `/ready`: unauthenticated probes
/// - `/api/v1/projects/...`, `/api/v1/tags`: project management, listings
///   and claims (bearer session)
///
/// CORS is only applied when `cors_origins` is non-empty.
pub fn build_router(state: AppState, cors_origins: &[String]) -> Router {
    let api_routes = Router::new()
        .route(
            "/projects",
            get(api::list_projects).post(api::create_project),
        )
        // Static segments win over `:id`.
        .route("/projects/mine", get(api::list_my_projects))
        .route("/projects/received", get(api::list_received))
        .route("/projects/received/chart", get(api::received_chart))
        .route(
            "/projects/:id",
            get(api::get_project)
                .put(api::update_project)
                .delete(api::delete_project),
        )
        .route("/projects/:id/receive", post(api::receive_item))
        .route("/projects/:id/receivers", get(api::list_receivers))
        .route("/projects/:id/report", post(api::report_project))
        .route("/tags", get(api::list_tags));

    let router = Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api/v1", api_routes)
        .with_state(state)
        .layer(from_fn(track_request))
        .layer(TraceLayer::new_for_http());

    match cors_layer(cors_origins) {
        Some(cors) => router.layer(cors),
        None => router,
    }
}

fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    if origins.is_empty() {
        return None;
    }

    Some(
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([
                header::AUTHORIZATION,
                header::CONTENT_TYPE,
                HeaderName::from_static("x-correlation-id"),
            ])
            .expose_headers([HeaderName::from_static("x-correlation-id"), header::RETRY_AFTER])
            .max_age(Duration::from_secs(60 * 60)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cors_is_disabled_without_valid_origins() {
        assert!(cors_layer(&[]).is_none());
        assert!(cors_layer(&["bad\norigin".to_string()]).is_none());
        assert!(cors_layer(&["https://cdk.linux.do".to_string()]).is_some());
    }
}
