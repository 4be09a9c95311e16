//! Provider traits for every external dependency.
//!
//! Production implementations live in `cdk-redis`, `cdk-postgres` and
//! `cdk-forum`; in-memory versions live in `cdk-testing`. All traits are
//! object safe so they can be shared as `Arc<dyn ...>` across request tasks.

use crate::error::{ForumError, StoreResult};
use crate::types::{
    ClaimRecord, DistributionMode, ExploreFilter, InventoryEntry, Item, ItemId, Page, Paged,
    Project, ProjectId, ProjectListing, ReceivedRecord, ReceiverRecord, ReportOutcome, User,
    UserId,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;

/// Atomically poppable per-project inventory.
///
/// A first-come project is a FIFO list of item ids. A lottery project is a
/// map from winner username to the item reserved for them.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Atomically remove and return one entry.
    ///
    /// First-come projects return the head of the list; lottery projects
    /// return (and delete) the entry keyed by `claimant`. Two concurrent pops
    /// never return the same entry.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Unavailable`] if the store cannot be reached.
    async fn pop(
        &self,
        project_id: &ProjectId,
        mode: DistributionMode,
        claimant: &str,
    ) -> StoreResult<Option<ItemId>>;

    /// Return an entry to the inventory (compensation after a failed claim).
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Unavailable`] if the store cannot be reached.
    async fn push(&self, project_id: &ProjectId, entry: &InventoryEntry) -> StoreResult<()>;

    /// Number of entries currently held.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Unavailable`] if the store cannot be reached.
    async fn stock(&self, project_id: &ProjectId, mode: DistributionMode) -> StoreResult<u64>;

    /// Append entries in order (project creation and update).
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Unavailable`] if the store cannot be reached.
    async fn populate(&self, project_id: &ProjectId, entries: &[InventoryEntry])
    -> StoreResult<()>;

    /// Drop the whole inventory of a project.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Unavailable`] if the store cannot be reached.
    async fn purge(&self, project_id: &ProjectId) -> StoreResult<()>;
}

/// Per project/IP markers enforcing one claim per address.
#[async_trait]
pub trait SameIpStore: Send + Sync {
    /// Whether a claim from `ip` was already recorded.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Unavailable`] if the store cannot be reached.
    async fn exists(&self, project_id: &ProjectId, ip: &str) -> StoreResult<bool>;

    /// Set the marker if absent. Returns `false` when it already existed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Unavailable`] if the store cannot be reached.
    async fn mark(&self, project_id: &ProjectId, ip: &str, ttl: Duration) -> StoreResult<bool>;

    /// Remove a marker (compensation after a failed claim).
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Unavailable`] if the store cannot be reached.
    async fn clear(&self, project_id: &ProjectId, ip: &str) -> StoreResult<()>;
}

/// Fixed-window counter used to throttle project creation.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Count one hit against `key`. Returns `false` when the hit exceeds
    /// `max` within the current `window`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Unavailable`] if the store cannot be reached.
    async fn check_and_record(&self, key: &str, max: u32, window: Duration) -> StoreResult<bool>;
}

/// Session token lookup written by the external login flow.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Resolve a bearer token to a user id.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Unavailable`] if the store cannot be reached.
    async fn user_for_session(&self, token: &str) -> StoreResult<Option<UserId>>;
}

/// Relational source of truth for projects, items, users and reports.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// Load a project.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the query fails.
    async fn find_project(&self, project_id: &ProjectId) -> StoreResult<Option<Project>>;

    /// Load a user.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the query fails.
    async fn find_user(&self, user_id: UserId) -> StoreResult<Option<User>>;

    /// Load an item.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the query fails.
    async fn find_item(&self, item_id: ItemId) -> StoreResult<Option<Item>>;

    /// Record a claim in one transaction: set the item's receiver and claim
    /// time, and mark the project completed when requested.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Conflict`] when the receiver already holds
    /// an item of this project or the item was claimed meanwhile.
    async fn commit_claim(&self, record: &ClaimRecord) -> StoreResult<()>;

    /// Clear `is_completed` after an entry went back into the inventory.
    /// Returns whether the flag was set.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the update fails.
    async fn reopen_project(&self, project_id: &ProjectId) -> StoreResult<bool>;

    /// The item `user_id` claimed from a project, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the query fails.
    async fn received_item(
        &self,
        project_id: &ProjectId,
        user_id: UserId,
    ) -> StoreResult<Option<Item>>;

    /// Insert a project with its tags and items. Returns the item ids in the
    /// order of `items`.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the transaction fails.
    async fn insert_project(
        &self,
        project: &Project,
        tags: &[String],
        items: &[String],
    ) -> StoreResult<Vec<ItemId>>;

    /// Update project metadata, replace its tags and append `new_items`.
    /// Returns the ids of the appended items.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the transaction fails.
    async fn update_project(
        &self,
        project: &Project,
        tags: &[String],
        new_items: &[String],
    ) -> StoreResult<Vec<ItemId>>;

    /// Undo an [`update_project`](Self::update_project) whose items never
    /// reached the inventory: write back `previous`'s editable fields,
    /// `total_items` and `is_completed`, restore `tags` and delete the
    /// `appended` items that are still unclaimed. Moderation fields are left
    /// untouched.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the transaction fails.
    async fn revert_update(
        &self,
        previous: &Project,
        tags: &[String],
        appended: &[ItemId],
    ) -> StoreResult<()>;

    /// Every item content already stored for a project.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the query fails.
    async fn existing_contents(&self, project_id: &ProjectId) -> StoreResult<HashSet<String>>;

    /// Number of claimed items.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the query fails.
    async fn claimed_count(&self, project_id: &ProjectId) -> StoreResult<u64>;

    /// Delete a project together with its tags and items.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the transaction fails.
    async fn delete_project(&self, project_id: &ProjectId) -> StoreResult<()>;

    /// Tags attached to a project.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the query fails.
    async fn project_tags(&self, project_id: &ProjectId) -> StoreResult<Vec<String>>;

    /// Record a report, bump the report counter and hide the project once
    /// the counter reaches `hidden_threshold`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::Conflict`] when the reporter already
    /// reported this project.
    async fn record_report(
        &self,
        project_id: &ProjectId,
        reporter_id: UserId,
        reason: &str,
        hidden_threshold: u16,
        now: DateTime<Utc>,
    ) -> StoreResult<ReportOutcome>;

    /// A user's claimed items, newest first.
    ///
    /// `search` keeps rows whose creator username starts with it, or whose
    /// creator nickname or project name contains it.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the query fails.
    async fn received_history(
        &self,
        user_id: UserId,
        search: Option<&str>,
        page: Page,
    ) -> StoreResult<Paged<ReceivedRecord>>;

    /// Claims per UTC day for `user_id` in `[from, until)`. Days without
    /// claims are omitted.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the query fails.
    async fn daily_claim_counts(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<(NaiveDate, u64)>>;

    /// Projects passing `filter` that the viewer has not claimed from,
    /// soonest end first.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the query fails.
    async fn explore_projects(
        &self,
        filter: &ExploreFilter,
        page: Page,
    ) -> StoreResult<Paged<ProjectListing>>;

    /// Visible projects created by `creator_id`, newest first, optionally
    /// restricted to those carrying any of `tags`.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the query fails.
    async fn creator_projects(
        &self,
        creator_id: UserId,
        tags: &[String],
        page: Page,
    ) -> StoreResult<Paged<ProjectListing>>;

    /// Distinct tags used by visible projects, sorted.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the query fails.
    async fn active_tags(&self) -> StoreResult<Vec<String>>;

    /// Users who claimed from a project, newest claim first.
    ///
    /// `search` keeps rows whose username starts with it, or whose nickname
    /// or content contains it.
    ///
    /// # Errors
    ///
    /// Returns a [`crate::StoreError`] if the query fails.
    async fn project_receivers(
        &self,
        project_id: &ProjectId,
        search: Option<&str>,
        page: Page,
    ) -> StoreResult<Paged<ReceiverRecord>>;
}

/// Topic metadata needed to validate a lottery thread.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicSummary {
    /// Number of the last post in the topic (the lottery result)
    pub highest_post_number: u64,
    /// Topic tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the topic is closed
    #[serde(default)]
    pub closed: bool,
}

/// Read-only access to the community forum.
#[async_trait]
pub trait ForumClient: Send + Sync {
    /// Topic metadata.
    ///
    /// # Errors
    ///
    /// Returns a [`ForumError`] on transport, status or decode failures.
    async fn topic(&self, topic_id: u64) -> Result<TopicSummary, ForumError>;

    /// Raw markdown of one post.
    ///
    /// # Errors
    ///
    /// Returns a [`ForumError`] on transport or status failures.
    async fn raw_post(&self, topic_id: u64, post_number: u64) -> Result<String, ForumError>;
}
