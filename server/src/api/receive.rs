//! Claim endpoint.
//!
//! - POST /api/v1/projects/:id/receive - Claim one item

use crate::auth::SessionUser;
use axum::{
    Json,
    extract::{Path, State},
};
use cdk_core::{ClaimCoordinator, ClaimedItem, ProjectId};
use cdk_web::{AppError, ClientIp};
use std::sync::Arc;

/// Claim one item from a project.
///
/// Runs the eligibility chain (time window, trust, risk, same IP, stock),
/// then pops an item, persists the assignment and returns its content.
/// The client address comes from `X-Forwarded-For` / `X-Real-IP` when the
/// service sits behind a proxy.
///
/// ```bash
/// curl -X POST http://localhost:8000/api/v1/projects/<id>/receive \
///   -H "Authorization: Bearer <session_token>"
/// ```
pub async fn receive_item(
    SessionUser(user): SessionUser,
    ClientIp(ip): ClientIp,
    State(coordinator): State<Arc<ClaimCoordinator>>,
    Path(project_id): Path<ProjectId>,
) -> Result<Json<ClaimedItem>, AppError> {
    let claimed = coordinator
        .receive(&project_id, &user, &ip.to_string())
        .await?;
    Ok(Json(claimed))
}
