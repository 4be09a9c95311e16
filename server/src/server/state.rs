//! Application state for the CDK HTTP server.
//!
//! Holds the claim coordinator and project service (both built over one
//! [`DistributionEnvironment`]), the session and user lookups used by
//! [`crate::auth::SessionUser`], and the readiness probes.

use axum::extract::FromRef;
use cdk_core::providers::{ProjectRepository, SessionStore};
use cdk_core::{ClaimCoordinator, DistributionEnvironment, ProjectService, ProjectSettings};
use cdk_web::handlers::ReadinessProbe;
use std::sync::Arc;

/// Application state shared across all HTTP handlers.
///
/// Cloned per request; every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Pop / persist / push-back claim flow
    pub coordinator: Arc<ClaimCoordinator>,
    /// Project lifecycle operations
    pub projects: Arc<ProjectService>,
    /// Bearer token lookup
    pub sessions: Arc<dyn SessionStore>,
    /// User lookup for authenticated requests
    pub users: Arc<dyn ProjectRepository>,
    /// Dependencies checked by `/ready`
    pub probes: Arc<[Arc<dyn ReadinessProbe>]>,
}

impl AppState {
    /// Build the state from a provider environment.
    #[must_use]
    pub fn new(
        env: DistributionEnvironment,
        settings: ProjectSettings,
        probes: Vec<Arc<dyn ReadinessProbe>>,
    ) -> Self {
        Self {
            sessions: Arc::clone(&env.sessions),
            users: Arc::clone(&env.repository),
            coordinator: Arc::new(ClaimCoordinator::new(env.clone())),
            projects: Arc::new(ProjectService::new(env, settings)),
            probes: probes.into(),
        }
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("probes", &self.probes.len())
            .finish_non_exhaustive()
    }
}

impl FromRef<AppState> for Arc<ClaimCoordinator> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.coordinator)
    }
}

impl FromRef<AppState> for Arc<ProjectService> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.projects)
    }
}
