//! Project management API endpoints.
//!
//! - POST   /api/v1/projects            - Create a project (rate limited per trust level)
//! - GET    /api/v1/projects/:id        - Project detail with stock and the caller's claim
//! - PUT    /api/v1/projects/:id        - Update (creator only)
//! - DELETE /api/v1/projects/:id        - Delete (creator only, blocked after a claim)
//! - POST   /api/v1/projects/:id/report - Report a project

use crate::auth::SessionUser;
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use cdk_core::{
    CreateProject, Project, ProjectDetail, ProjectId, ProjectService, ReportOutcome, UpdateProject,
};
use cdk_web::AppError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Response after creating a project.
#[derive(Debug, Serialize)]
pub struct CreateProjectResponse {
    /// Created project ID
    pub project_id: ProjectId,
    /// The stored project
    pub project: Project,
}

/// Request to report a project.
#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    /// Why the project is being reported (1-255 characters)
    pub reason: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// Create a new project.
///
/// The caller becomes the creator. First-come projects queue
/// `project_items` in order; lottery projects resolve the forum thread at
/// `topic_id` and reserve one prize per winner.
///
/// ```bash
/// curl -X POST http://localhost:8000/api/v1/projects \
///   -H "Authorization: Bearer <session_token>" \
///   -H "Content-Type: application/json" \
///   -d '{
///     "name": "Weekend codes",
///     "start_time": "2025-06-01T09:00:00Z",
///     "end_time": "2025-06-02T09:00:00Z",
///     "distribution_mode": "first_come",
///     "project_items": ["CODE-1", "CODE-2"]
///   }'
/// ```
pub async fn create_project(
    SessionUser(creator): SessionUser,
    State(projects): State<Arc<ProjectService>>,
    Json(request): Json<CreateProject>,
) -> Result<(StatusCode, Json<CreateProjectResponse>), AppError> {
    let project = projects.create(&creator, request).await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateProjectResponse {
            project_id: project.id.clone(),
            project,
        }),
    ))
}

/// Get project details as seen by the caller.
///
/// Hidden projects and projects gated above the caller's trust or risk level
/// answer 404.
pub async fn get_project(
    SessionUser(viewer): SessionUser,
    State(projects): State<Arc<ProjectService>>,
    Path(project_id): Path<ProjectId>,
) -> Result<Json<ProjectDetail>, AppError> {
    let detail = projects.detail(&viewer, &project_id).await?;
    Ok(Json(detail))
}

/// Update a project.
///
/// Requires ownership. `project_items` are appended (first-come only);
/// with `enable_filter` duplicates of existing content are skipped.
pub async fn update_project(
    SessionUser(editor): SessionUser,
    State(projects): State<Arc<ProjectService>>,
    Path(project_id): Path<ProjectId>,
    Json(request): Json<UpdateProject>,
) -> Result<Json<Project>, AppError> {
    let project = projects.update(&editor, &project_id, request).await?;
    Ok(Json(project))
}

/// Delete a project.
///
/// Requires ownership; refused once any item has been claimed.
pub async fn delete_project(
    SessionUser(editor): SessionUser,
    State(projects): State<Arc<ProjectService>>,
    Path(project_id): Path<ProjectId>,
) -> Result<StatusCode, AppError> {
    projects.delete(&editor, &project_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Report a project.
///
/// One report per user per project. The project is hidden once the report
/// count reaches the configured threshold.
pub async fn report_project(
    SessionUser(reporter): SessionUser,
    State(projects): State<Arc<ProjectService>>,
    Path(project_id): Path<ProjectId>,
    Json(request): Json<ReportRequest>,
) -> Result<Json<ReportOutcome>, AppError> {
    let outcome = projects
        .report(&reporter, &project_id, &request.reason)
        .await?;
    Ok(Json(outcome))
}
