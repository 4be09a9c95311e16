//! Project lifecycle: create, update, delete, detail and report.
//!
//! The relational store is written first and the inventory store second;
//! when populating the inventory fails during creation the project row is
//! removed again so no project exists without claimable stock.

use crate::environment::DistributionEnvironment;
use crate::error::{ProjectError, StoreError};
use crate::lottery;
use crate::metrics;
use crate::types::{
    DistributionMode, InventoryEntry, ItemId, Project, ProjectDetail, ProjectId, ProjectStatus,
    ReportOutcome, TrustLevel, User,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const NAME_MAX_CHARS: usize = 32;
const DESCRIPTION_MAX_CHARS: usize = 1024;
pub(crate) const TAG_MAX_CHARS: usize = 16;
const ITEM_MAX_CHARS: usize = 1024;
const REASON_MAX_CHARS: usize = 255;
const RISK_LEVEL_MAX: i32 = 100;

/// Fixed-window creation limit for one trust tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitRule {
    /// Window length
    pub interval: Duration,
    /// Projects allowed per window
    pub max_count: u32,
}

impl RateLimitRule {
    /// Build a rule from a window in seconds.
    #[must_use]
    pub const fn per_seconds(interval_seconds: u64, max_count: u32) -> Self {
        Self {
            interval: Duration::from_secs(interval_seconds),
            max_count,
        }
    }
}

/// Tunables for project management.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectSettings {
    /// Report count at which a project is hidden
    pub hidden_threshold: u16,
    /// Creation limits indexed by trust tier (0-4)
    pub create_rate_limits: [RateLimitRule; 5],
}

impl ProjectSettings {
    /// Creation limit for a trust tier.
    #[must_use]
    pub fn rule_for(&self, level: TrustLevel) -> RateLimitRule {
        self.create_rate_limits[usize::from(level.as_u8())]
    }
}

impl Default for ProjectSettings {
    fn default() -> Self {
        Self {
            hidden_threshold: 5,
            create_rate_limits: [
                RateLimitRule::per_seconds(3600, 1),
                RateLimitRule::per_seconds(3600, 3),
                RateLimitRule::per_seconds(3600, 5),
                RateLimitRule::per_seconds(3600, 10),
                RateLimitRule::per_seconds(3600, 20),
            ],
        }
    }
}

/// Fields shared by create and update requests.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectDraft {
    /// 1-32 characters
    pub name: String,
    /// Up to 1024 characters
    #[serde(default)]
    pub description: String,
    /// Each 1-16 characters
    #[serde(default)]
    pub project_tags: Vec<String>,
    /// Claims open at
    pub start_time: DateTime<Utc>,
    /// Claims close at, after `start_time`
    pub end_time: DateTime<Utc>,
    /// 0-4
    #[serde(default)]
    pub minimum_trust_level: u8,
    /// Allow repeat claims from one IP address
    #[serde(default)]
    pub allow_same_ip: bool,
    /// 0-100
    #[serde(default)]
    pub risk_level: i32,
    /// Exclude from public listings
    #[serde(default)]
    pub hide_from_explore: bool,
}

/// Request to create a project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateProject {
    /// Common fields
    #[serde(flatten)]
    pub draft: ProjectDraft,
    /// First-come or lottery
    pub distribution_mode: DistributionMode,
    /// Items (first-come) or prizes in winner order (lottery)
    pub project_items: Vec<String>,
    /// Forum topic holding the lottery result
    #[serde(default)]
    pub topic_id: Option<u64>,
}

/// Request to update a project.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateProject {
    /// Common fields
    #[serde(flatten)]
    pub draft: ProjectDraft,
    /// Items to append (first-come only)
    #[serde(default)]
    pub project_items: Vec<String>,
    /// Skip items whose content already exists in the project
    #[serde(default)]
    pub enable_filter: bool,
}

pub(crate) fn char_len(s: &str) -> usize {
    s.chars().count()
}

pub(crate) fn invalid(message: impl Into<String>) -> ProjectError {
    ProjectError::Validation(message.into())
}

struct ValidDraft {
    minimum_trust_level: TrustLevel,
    risk_level: u8,
}

fn validate_draft(draft: &ProjectDraft) -> Result<ValidDraft, ProjectError> {
    let name_len = char_len(&draft.name);
    if name_len == 0 || name_len > NAME_MAX_CHARS {
        return Err(invalid(format!("name must be 1-{NAME_MAX_CHARS} characters")));
    }
    if char_len(&draft.description) > DESCRIPTION_MAX_CHARS {
        return Err(invalid(format!(
            "description must be at most {DESCRIPTION_MAX_CHARS} characters"
        )));
    }
    if let Some(tag) = draft
        .project_tags
        .iter()
        .find(|t| t.is_empty() || char_len(t) > TAG_MAX_CHARS)
    {
        return Err(invalid(format!(
            "tag {tag:?} must be 1-{TAG_MAX_CHARS} characters"
        )));
    }
    if draft.end_time <= draft.start_time {
        return Err(invalid("end_time must be after start_time"));
    }
    let minimum_trust_level = TrustLevel::try_from(draft.minimum_trust_level).map_err(invalid)?;
    let risk_level = u8::try_from(draft.risk_level)
        .ok()
        .filter(|r| i32::from(*r) <= RISK_LEVEL_MAX)
        .ok_or_else(|| invalid(format!("risk_level must be 0-{RISK_LEVEL_MAX}")))?;

    Ok(ValidDraft {
        minimum_trust_level,
        risk_level,
    })
}

fn validate_items(items: &[String]) -> Result<(), ProjectError> {
    if items
        .iter()
        .any(|i| i.is_empty() || char_len(i) > ITEM_MAX_CHARS)
    {
        return Err(invalid(format!(
            "each item must be 1-{ITEM_MAX_CHARS} characters"
        )));
    }
    Ok(())
}

fn validate_reason(reason: &str) -> Result<(), ProjectError> {
    let len = char_len(reason);
    if len == 0 || len > REASON_MAX_CHARS {
        return Err(invalid(format!(
            "reason must be 1-{REASON_MAX_CHARS} characters"
        )));
    }
    Ok(())
}

fn create_rate_limit_key(user: &User, rule: RateLimitRule) -> String {
    format!(
        "rate_limit:project:create:{}:{}",
        user.id,
        rule.interval.as_secs()
    )
}

/// Project management operations.
#[derive(Clone, Debug)]
pub struct ProjectService {
    pub(crate) env: DistributionEnvironment,
    settings: ProjectSettings,
}

impl ProjectService {
    /// Create a service over the given providers.
    #[must_use]
    pub const fn new(env: DistributionEnvironment, settings: ProjectSettings) -> Self {
        Self { env, settings }
    }

    /// Active settings.
    #[must_use]
    pub const fn settings(&self) -> &ProjectSettings {
        &self.settings
    }

    /// Create a project and populate its inventory.
    ///
    /// # Errors
    ///
    /// - [`ProjectError::Validation`] on invalid input
    /// - [`ProjectError::RateLimited`] when the creator's window is exhausted
    /// - [`ProjectError::Lottery`] when the lottery thread cannot be resolved
    /// - [`ProjectError::Storage`] on backend failures
    pub async fn create(&self, creator: &User, req: CreateProject) -> Result<Project, ProjectError> {
        let valid = validate_draft(&req.draft)?;
        if req.project_items.is_empty() {
            return Err(invalid("at least one item is required"));
        }
        validate_items(&req.project_items)?;
        let topic_id = match (req.distribution_mode, req.topic_id) {
            (DistributionMode::Lottery, Some(id)) if id > 0 => Some(id),
            (DistributionMode::Lottery, _) => {
                return Err(invalid("topic_id is required for lottery projects"));
            }
            (DistributionMode::FirstCome, _) => None,
        };

        let rule = self.settings.rule_for(creator.trust_level);
        let allowed = self
            .env
            .rate_limiter
            .check_and_record(&create_rate_limit_key(creator, rule), rule.max_count, rule.interval)
            .await?;
        if !allowed {
            return Err(ProjectError::RateLimited {
                retry_after: rule.interval.as_secs(),
            });
        }

        // Resolve the lottery before writing anything.
        let allocations = match topic_id {
            Some(topic_id) => Some(
                lottery::resolve_winners(
                    self.env.forum.as_ref(),
                    topic_id,
                    &creator.username,
                    &req.project_items,
                )
                .await?,
            ),
            None => None,
        };

        let now = self.env.now();
        let draft = req.draft;
        let project = Project {
            id: ProjectId::new(),
            name: draft.name,
            description: draft.description,
            distribution_mode: req.distribution_mode,
            total_items: req.project_items.len() as u64,
            start_time: draft.start_time,
            end_time: draft.end_time,
            minimum_trust_level: valid.minimum_trust_level,
            allow_same_ip: draft.allow_same_ip,
            risk_level: valid.risk_level,
            creator_id: creator.id,
            is_completed: false,
            status: ProjectStatus::Normal,
            report_count: 0,
            hide_from_explore: draft.hide_from_explore,
            created_at: now,
            updated_at: now,
        };

        let entries = match allocations {
            Some(allocations) => {
                let contents: Vec<String> =
                    allocations.iter().map(|a| a.content.clone()).collect();
                let ids = self
                    .env
                    .repository
                    .insert_project(&project, &draft.project_tags, &contents)
                    .await?;
                allocations
                    .into_iter()
                    .zip(ids)
                    .map(|(a, item_id)| InventoryEntry::Assigned {
                        winner: a.winner,
                        item_id,
                    })
                    .collect::<Vec<_>>()
            }
            None => self
                .env
                .repository
                .insert_project(&project, &draft.project_tags, &req.project_items)
                .await?
                .into_iter()
                .map(InventoryEntry::Queued)
                .collect(),
        };

        if let Err(e) = self.env.inventory.populate(&project.id, &entries).await {
            tracing::error!(
                project_id = %project.id,
                error = %e,
                "Failed to populate inventory, rolling back project"
            );
            if let Err(rollback) = self.env.repository.delete_project(&project.id).await {
                tracing::error!(
                    project_id = %project.id,
                    error = %rollback,
                    "Failed to roll back project after inventory failure"
                );
            }
            return Err(e.into());
        }

        metrics::record_project_created(project.distribution_mode);
        tracing::info!(
            project_id = %project.id,
            user_id = %creator.id,
            mode = project.distribution_mode.label(),
            items = entries.len(),
            "Project created"
        );
        Ok(project)
    }

    /// Update a project's metadata and append items.
    ///
    /// Lottery projects only take metadata changes. If the appended items
    /// cannot be queued, the row, tags and items are restored to their
    /// previous state.
    ///
    /// # Errors
    ///
    /// - [`ProjectError::NotFound`] if the project is missing, hidden or in violation
    /// - [`ProjectError::Forbidden`] if the caller is not the creator
    /// - [`ProjectError::Validation`] on invalid input
    /// - [`ProjectError::Storage`] on backend failures
    pub async fn update(
        &self,
        editor: &User,
        project_id: &ProjectId,
        req: UpdateProject,
    ) -> Result<Project, ProjectError> {
        let valid = validate_draft(&req.draft)?;
        validate_items(&req.project_items)?;
        let mut project = self.owned_project(editor, project_id).await?;
        let previous = project.clone();

        let draft = req.draft;
        project.name = draft.name;
        project.description = draft.description;
        project.start_time = draft.start_time;
        project.end_time = draft.end_time;
        project.minimum_trust_level = valid.minimum_trust_level;
        project.allow_same_ip = draft.allow_same_ip;
        project.risk_level = valid.risk_level;
        project.hide_from_explore = draft.hide_from_explore;
        project.updated_at = self.env.now();

        let new_items = match project.distribution_mode {
            DistributionMode::Lottery => Vec::new(),
            DistributionMode::FirstCome if req.enable_filter => {
                let existing = self.env.repository.existing_contents(project_id).await?;
                req.project_items
                    .into_iter()
                    .filter(|item| !existing.contains(item))
                    .collect()
            }
            DistributionMode::FirstCome => req.project_items,
        };

        if !new_items.is_empty() {
            project.total_items += new_items.len() as u64;
            project.is_completed = false;
        }

        let previous_tags = self.env.repository.project_tags(project_id).await?;
        let ids: Vec<ItemId> = self
            .env
            .repository
            .update_project(&project, &draft.project_tags, &new_items)
            .await?;

        if !ids.is_empty() {
            let entries: Vec<InventoryEntry> =
                ids.iter().copied().map(InventoryEntry::Queued).collect();
            if let Err(e) = self.env.inventory.populate(project_id, &entries).await {
                tracing::error!(
                    project_id = %project_id,
                    error = %e,
                    "Failed to populate inventory, reverting project update"
                );
                if let Err(revert) = self
                    .env
                    .repository
                    .revert_update(&previous, &previous_tags, &ids)
                    .await
                {
                    tracing::error!(
                        project_id = %project_id,
                        error = %revert,
                        items = ids.len(),
                        "Failed to revert project update, appended items are unclaimable"
                    );
                }
                return Err(e.into());
            }
        }

        tracing::info!(
            project_id = %project_id,
            added = new_items.len(),
            "Project updated"
        );
        Ok(project)
    }

    /// Delete a project that has no claimed items.
    ///
    /// # Errors
    ///
    /// - [`ProjectError::NotFound`] if the project is missing, hidden or in violation
    /// - [`ProjectError::Forbidden`] if the caller is not the creator
    /// - [`ProjectError::AlreadyClaimed`] if any item was claimed
    /// - [`ProjectError::Storage`] on backend failures
    pub async fn delete(&self, editor: &User, project_id: &ProjectId) -> Result<(), ProjectError> {
        self.owned_project(editor, project_id).await?;

        if self.env.repository.claimed_count(project_id).await? > 0 {
            return Err(ProjectError::AlreadyClaimed);
        }

        self.env.repository.delete_project(project_id).await?;
        if let Err(e) = self.env.inventory.purge(project_id).await {
            tracing::error!(
                project_id = %project_id,
                error = %e,
                "Project deleted but inventory purge failed"
            );
        }

        tracing::info!(project_id = %project_id, "Project deleted");
        Ok(())
    }

    /// Project as seen by `viewer`, including stock and the viewer's claim.
    ///
    /// # Errors
    ///
    /// - [`ProjectError::NotFound`] if the project is missing, not visible,
    ///   or gated above the viewer's trust or risk level
    /// - [`ProjectError::Storage`] on backend failures
    pub async fn detail(
        &self,
        viewer: &User,
        project_id: &ProjectId,
    ) -> Result<ProjectDetail, ProjectError> {
        let project = self
            .env
            .repository
            .find_project(project_id)
            .await?
            .filter(|p| p.status == ProjectStatus::Normal && p.admits(viewer))
            .ok_or(ProjectError::NotFound)?;

        let repo = &self.env.repository;
        let tags = repo.project_tags(project_id).await?;
        let creator = repo
            .find_user(project.creator_id)
            .await?
            .ok_or_else(|| ProjectError::Storage(format!("creator {} missing", project.creator_id)))?;
        let available_items_count = self
            .env
            .inventory
            .stock(project_id, project.distribution_mode)
            .await?;
        let received = repo.received_item(project_id, viewer.id).await?;

        Ok(ProjectDetail {
            creator_username: creator.username.clone(),
            creator_nickname: creator.display_name().to_string(),
            tags,
            available_items_count,
            is_received: received.is_some(),
            received_content: received.map(|item| item.content),
            project,
        })
    }

    /// Report a project. Each user may report a project once.
    ///
    /// # Errors
    ///
    /// - [`ProjectError::Validation`] if the reason is empty or too long
    /// - [`ProjectError::NotFound`] if the project is missing or not visible
    /// - [`ProjectError::AlreadyReported`] on a repeat report
    /// - [`ProjectError::Storage`] on backend failures
    pub async fn report(
        &self,
        reporter: &User,
        project_id: &ProjectId,
        reason: &str,
    ) -> Result<ReportOutcome, ProjectError> {
        validate_reason(reason)?;
        self.env
            .repository
            .find_project(project_id)
            .await?
            .filter(|p| p.status == ProjectStatus::Normal)
            .ok_or(ProjectError::NotFound)?;

        let outcome = self
            .env
            .repository
            .record_report(
                project_id,
                reporter.id,
                reason,
                self.settings.hidden_threshold,
                self.env.now(),
            )
            .await
            .map_err(|e| match e {
                StoreError::Conflict(_) => ProjectError::AlreadyReported,
                other => other.into(),
            })?;

        metrics::record_project_reported();
        if outcome.hidden {
            tracing::warn!(
                project_id = %project_id,
                report_count = outcome.report_count,
                "Project hidden after reaching report threshold"
            );
        }
        Ok(outcome)
    }

    pub(crate) async fn owned_project(
        &self,
        user: &User,
        project_id: &ProjectId,
    ) -> Result<Project, ProjectError> {
        let project = self
            .env
            .repository
            .find_project(project_id)
            .await?
            .filter(|p| p.status == ProjectStatus::Normal)
            .ok_or(ProjectError::NotFound)?;
        if project.creator_id != user.id {
            return Err(ProjectError::Forbidden);
        }
        Ok(project)
    }
}
