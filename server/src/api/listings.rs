//! Listing API endpoints.
//!
//! - GET /api/v1/projects                 - Explore open projects
//! - GET /api/v1/projects/mine            - Caller's own projects
//! - GET /api/v1/projects/received        - Caller's claim history
//! - GET /api/v1/projects/received/chart  - Caller's claims per day
//! - GET /api/v1/projects/:id/receivers   - Who claimed what (creator only)
//! - GET /api/v1/tags                     - Tags in use

use crate::auth::SessionUser;
use axum::{
    Json,
    extract::{Path, Query, State},
};
use cdk_core::{
    DailyClaims, ListQuery, Page, Paged, ProjectId, ProjectListing, ProjectService,
    ReceivedRecord, ReceiverRecord,
};
use cdk_web::AppError;
use serde::Deserialize;
use std::sync::Arc;

const fn default_current() -> u32 {
    1
}

const fn default_size() -> u32 {
    20
}

const fn default_days() -> u16 {
    7
}

/// Paging with an optional search term.
#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    /// Page number (1-indexed)
    #[serde(default = "default_current")]
    pub current: u32,
    /// Page size (default: 20, max: 100)
    #[serde(default = "default_size")]
    pub size: u32,
    /// Free-text filter
    #[serde(default)]
    pub search: Option<String>,
}

impl SearchQuery {
    const fn page(&self) -> Page {
        Page {
            current: self.current,
            size: self.size,
        }
    }
}

/// Paging with a comma-separated tag filter (`tags=game,steam`).
#[derive(Debug, Deserialize)]
pub struct ProjectsQuery {
    /// Page number (1-indexed)
    #[serde(default = "default_current")]
    pub current: u32,
    /// Page size (default: 20, max: 100)
    #[serde(default = "default_size")]
    pub size: u32,
    /// Keep projects carrying any of these tags
    #[serde(default)]
    pub tags: Option<String>,
}

impl From<ProjectsQuery> for ListQuery {
    fn from(query: ProjectsQuery) -> Self {
        let tags = query
            .tags
            .as_deref()
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(ToString::to_string)
                    .collect()
            })
            .unwrap_or_default();
        Self {
            page: Page {
                current: query.current,
                size: query.size,
            },
            tags,
        }
    }
}

/// Chart window.
#[derive(Debug, Deserialize)]
pub struct ChartQuery {
    /// Number of days, today included (1-180, default 7)
    #[serde(default = "default_days")]
    pub day: u16,
}

/// Open projects the caller can claim from, ending soonest first.
///
/// ```bash
/// curl "http://localhost:8000/api/v1/projects?current=1&size=20&tags=game,steam" \
///   -H "Authorization: Bearer <session_token>"
/// ```
pub async fn list_projects(
    SessionUser(viewer): SessionUser,
    State(projects): State<Arc<ProjectService>>,
    Query(query): Query<ProjectsQuery>,
) -> Result<Json<Paged<ProjectListing>>, AppError> {
    Ok(Json(projects.explore(&viewer, query.into()).await?))
}

/// Projects the caller created, newest first.
pub async fn list_my_projects(
    SessionUser(user): SessionUser,
    State(projects): State<Arc<ProjectService>>,
    Query(query): Query<ProjectsQuery>,
) -> Result<Json<Paged<ProjectListing>>, AppError> {
    Ok(Json(projects.mine(&user, query.into()).await?))
}

/// Tags used by visible projects.
pub async fn list_tags(
    SessionUser(_user): SessionUser,
    State(projects): State<Arc<ProjectService>>,
) -> Result<Json<Vec<String>>, AppError> {
    Ok(Json(projects.tags().await?))
}

/// Claimants of one of the caller's projects.
///
/// `search` matches a username prefix, or text inside the nickname or the
/// claimed content.
pub async fn list_receivers(
    SessionUser(editor): SessionUser,
    State(projects): State<Arc<ProjectService>>,
    Path(project_id): Path<ProjectId>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Paged<ReceiverRecord>>, AppError> {
    let page = projects
        .receivers(&editor, &project_id, query.search.as_deref(), query.page())
        .await?;
    Ok(Json(page))
}

/// List the caller's claimed items, newest first.
///
/// `search` matches a creator username prefix, or text inside the creator
/// nickname or the project name.
///
/// ```bash
/// curl "http://localhost:8000/api/v1/projects/received?current=1&size=20&search=steam" \
///   -H "Authorization: Bearer <session_token>"
/// ```
pub async fn list_received(
    SessionUser(user): SessionUser,
    State(projects): State<Arc<ProjectService>>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Paged<ReceivedRecord>>, AppError> {
    let page = projects
        .received_history(&user, query.search.as_deref(), query.page())
        .await?;
    Ok(Json(page))
}

/// Claims per day over the last `day` days.
pub async fn received_chart(
    SessionUser(user): SessionUser,
    State(projects): State<Arc<ProjectService>>,
    Query(query): Query<ChartQuery>,
) -> Result<Json<Vec<DailyClaims>>, AppError> {
    Ok(Json(projects.received_chart(&user, query.day).await?))
}
