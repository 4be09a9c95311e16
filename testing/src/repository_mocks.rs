//! In-memory relational store.

use async_trait::async_trait;
use cdk_core::error::{StoreError, StoreResult};
use cdk_core::providers::ProjectRepository;
use cdk_core::types::{
    ClaimRecord, ExploreFilter, Item, ItemId, Page, Paged, Project, ProjectId, ProjectListing,
    ProjectStatus, ReceivedRecord, ReceiverRecord, ReportOutcome, User, UserId,
};
use chrono::{DateTime, NaiveDate, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    projects: HashMap<ProjectId, Project>,
    tags: HashMap<ProjectId, Vec<String>>,
    items: BTreeMap<ItemId, Item>,
    reports: HashSet<(ProjectId, UserId)>,
    next_item_id: u64,
}

fn paginate<T>(rows: Vec<T>, page: Page) -> Paged<T> {
    let total = rows.len() as u64;
    let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
    let results = rows
        .into_iter()
        .skip(offset)
        .take(page.size as usize)
        .collect();
    Paged { total, results }
}

fn carries_any(project_tags: &[String], wanted: &[String]) -> bool {
    wanted.is_empty() || project_tags.iter().any(|t| wanted.contains(t))
}

impl Tables {
    fn listing(&self, project: &Project) -> ProjectListing {
        let mut tags = self.tags.get(&project.id).cloned().unwrap_or_default();
        tags.sort();
        ProjectListing {
            project: project.clone(),
            tags,
        }
    }

    fn has_claimed(&self, project_id: &ProjectId, user_id: UserId) -> bool {
        self.items
            .values()
            .any(|item| &item.project_id == project_id && item.receiver_id == Some(user_id))
    }

    fn insert_items(&mut self, project_id: &ProjectId, contents: &[String]) -> Vec<ItemId> {
        contents
            .iter()
            .map(|content| {
                self.next_item_id += 1;
                let id = ItemId(self.next_item_id);
                self.items.insert(
                    id,
                    Item {
                        id,
                        project_id: project_id.clone(),
                        content: content.clone(),
                        receiver_id: None,
                        received_at: None,
                    },
                );
                id
            })
            .collect()
    }
}

/// In-memory [`ProjectRepository`] with the same uniqueness rules as the
/// Postgres schema.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProjectRepository {
    tables: Arc<Mutex<Tables>>,
    fail_commit: Arc<AtomicBool>,
    fail_find_item: Arc<AtomicBool>,
    commits: Arc<AtomicUsize>,
}

impl InMemoryProjectRepository {
    /// Create an empty repository
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> StoreResult<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("Mutex lock failed".to_string()))
    }

    /// Make every subsequent claim commit fail
    pub fn fail_commits(&self, fail: bool) {
        self.fail_commit.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent item lookup fail
    pub fn fail_item_lookups(&self, fail: bool) {
        self.fail_find_item.store(fail, Ordering::SeqCst);
    }

    /// Number of successful claim commits
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Insert or replace a user
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    pub fn insert_user(&self, user: User) {
        self.tables.lock().unwrap().users.insert(user.id, user);
    }

    /// Snapshot of a project row
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn project(&self, project_id: &ProjectId) -> Option<Project> {
        self.tables.lock().unwrap().projects.get(project_id).cloned()
    }

    /// Number of stored projects
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn project_count(&self) -> usize {
        self.tables.lock().unwrap().projects.len()
    }

    /// Snapshot of all items of a project, in id order
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn items(&self, project_id: &ProjectId) -> Vec<Item> {
        self.tables
            .lock()
            .unwrap()
            .items
            .values()
            .filter(|item| &item.project_id == project_id)
            .cloned()
            .collect()
    }

    /// Overwrite an item row (to simulate inconsistent state)
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    pub fn put_item(&self, item: Item) {
        self.tables.lock().unwrap().items.insert(item.id, item);
    }
}

#[async_trait]
impl ProjectRepository for InMemoryProjectRepository {
    async fn find_project(&self, project_id: &ProjectId) -> StoreResult<Option<Project>> {
        Ok(self.tables()?.projects.get(project_id).cloned())
    }

    async fn find_user(&self, user_id: UserId) -> StoreResult<Option<User>> {
        Ok(self.tables()?.users.get(&user_id).cloned())
    }

    async fn find_item(&self, item_id: ItemId) -> StoreResult<Option<Item>> {
        if self.fail_find_item.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected item lookup failure".into()));
        }
        Ok(self.tables()?.items.get(&item_id).cloned())
    }

    async fn commit_claim(&self, record: &ClaimRecord) -> StoreResult<()> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("injected commit failure".into()));
        }
        let mut tables = self.tables()?;

        let duplicate = tables.items.values().any(|item| {
            item.project_id == record.project_id && item.receiver_id == Some(record.receiver_id)
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "user {} already received from project {}",
                record.receiver_id, record.project_id
            )));
        }

        let item = tables
            .items
            .get_mut(&record.item_id)
            .ok_or_else(|| StoreError::Unavailable(format!("item {} missing", record.item_id)))?;
        if item.is_claimed() {
            return Err(StoreError::Conflict(format!("item {} already claimed", record.item_id)));
        }
        item.receiver_id = Some(record.receiver_id);
        item.received_at = Some(record.received_at);

        if record.complete_project {
            if let Some(project) = tables.projects.get_mut(&record.project_id) {
                project.is_completed = true;
            }
        }
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn reopen_project(&self, project_id: &ProjectId) -> StoreResult<bool> {
        let mut tables = self.tables()?;
        Ok(tables
            .projects
            .get_mut(project_id)
            .is_some_and(|p| std::mem::replace(&mut p.is_completed, false)))
    }

    async fn received_item(
        &self,
        project_id: &ProjectId,
        user_id: UserId,
    ) -> StoreResult<Option<Item>> {
        Ok(self
            .tables()?
            .items
            .values()
            .find(|item| &item.project_id == project_id && item.receiver_id == Some(user_id))
            .cloned())
    }

    async fn insert_project(
        &self,
        project: &Project,
        tags: &[String],
        items: &[String],
    ) -> StoreResult<Vec<ItemId>> {
        let mut tables = self.tables()?;
        if tables.projects.contains_key(&project.id) {
            return Err(StoreError::Conflict(format!("project {} exists", project.id)));
        }
        tables.projects.insert(project.id.clone(), project.clone());
        tables.tags.insert(project.id.clone(), tags.to_vec());
        Ok(tables.insert_items(&project.id, items))
    }

    async fn update_project(
        &self,
        project: &Project,
        tags: &[String],
        new_items: &[String],
    ) -> StoreResult<Vec<ItemId>> {
        let mut tables = self.tables()?;
        if !tables.projects.contains_key(&project.id) {
            return Err(StoreError::Unavailable(format!("project {} missing", project.id)));
        }
        tables.projects.insert(project.id.clone(), project.clone());
        tables.tags.insert(project.id.clone(), tags.to_vec());
        Ok(tables.insert_items(&project.id, new_items))
    }

    async fn revert_update(
        &self,
        previous: &Project,
        tags: &[String],
        appended: &[ItemId],
    ) -> StoreResult<()> {
        let mut tables = self.tables()?;
        let project = tables
            .projects
            .get_mut(&previous.id)
            .ok_or_else(|| StoreError::Unavailable(format!("project {} missing", previous.id)))?;
        *project = Project {
            status: project.status,
            report_count: project.report_count,
            ..previous.clone()
        };
        tables.tags.insert(previous.id.clone(), tags.to_vec());
        tables
            .items
            .retain(|id, item| !(appended.contains(id) && !item.is_claimed()));
        Ok(())
    }

    async fn existing_contents(&self, project_id: &ProjectId) -> StoreResult<HashSet<String>> {
        Ok(self
            .tables()?
            .items
            .values()
            .filter(|item| &item.project_id == project_id)
            .map(|item| item.content.clone())
            .collect())
    }

    async fn claimed_count(&self, project_id: &ProjectId) -> StoreResult<u64> {
        let count = self
            .tables()?
            .items
            .values()
            .filter(|item| &item.project_id == project_id && item.is_claimed())
            .count();
        Ok(count as u64)
    }

    async fn delete_project(&self, project_id: &ProjectId) -> StoreResult<()> {
        let mut tables = self.tables()?;
        tables.tags.remove(project_id);
        tables.items.retain(|_, item| &item.project_id != project_id);
        tables.projects.remove(project_id);
        Ok(())
    }

    async fn project_tags(&self, project_id: &ProjectId) -> StoreResult<Vec<String>> {
        Ok(self.tables()?.tags.get(project_id).cloned().unwrap_or_default())
    }

    async fn record_report(
        &self,
        project_id: &ProjectId,
        reporter_id: UserId,
        _reason: &str,
        hidden_threshold: u16,
        now: DateTime<Utc>,
    ) -> StoreResult<ReportOutcome> {
        let mut tables = self.tables()?;
        if !tables.reports.insert((project_id.clone(), reporter_id)) {
            return Err(StoreError::Conflict(format!(
                "user {reporter_id} already reported project {project_id}"
            )));
        }
        let project = tables
            .projects
            .get_mut(project_id)
            .ok_or_else(|| StoreError::Unavailable(format!("project {project_id} missing")))?;
        project.report_count = project.report_count.saturating_add(1);
        if project.report_count >= hidden_threshold {
            project.status = ProjectStatus::Hidden;
        }
        project.updated_at = now;
        Ok(ReportOutcome {
            report_count: project.report_count,
            hidden: project.status == ProjectStatus::Hidden,
        })
    }

    async fn received_history(
        &self,
        user_id: UserId,
        search: Option<&str>,
        page: Page,
    ) -> StoreResult<Paged<ReceivedRecord>> {
        let tables = self.tables()?;
        let mut claimed: Vec<&Item> = tables
            .items
            .values()
            .filter(|item| item.receiver_id == Some(user_id))
            .collect();
        claimed.sort_by(|a, b| b.received_at.cmp(&a.received_at).then(b.id.cmp(&a.id)));

        let rows = claimed
            .into_iter()
            .filter_map(|item| {
                let project = tables.projects.get(&item.project_id)?;
                let creator = tables.users.get(&project.creator_id)?;
                let matches = search.is_none_or(|term| {
                    creator.username.starts_with(term)
                        || creator.nickname.contains(term)
                        || project.name.contains(term)
                });
                matches.then(|| ReceivedRecord {
                    project_id: project.id.clone(),
                    project_name: project.name.clone(),
                    project_creator: creator.username.clone(),
                    project_creator_nickname: creator.display_name().to_string(),
                    content: item.content.clone(),
                    received_at: item.received_at,
                })
            })
            .collect();

        Ok(paginate(rows, page))
    }

    async fn daily_claim_counts(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> StoreResult<Vec<(NaiveDate, u64)>> {
        let tables = self.tables()?;
        let mut counts: BTreeMap<NaiveDate, u64> = BTreeMap::new();
        for item in tables.items.values() {
            if item.receiver_id != Some(user_id) {
                continue;
            }
            if let Some(at) = item.received_at.filter(|at| *at >= from && *at < until) {
                *counts.entry(at.date_naive()).or_default() += 1;
            }
        }
        Ok(counts.into_iter().collect())
    }

    async fn explore_projects(
        &self,
        filter: &ExploreFilter,
        page: Page,
    ) -> StoreResult<Paged<ProjectListing>> {
        let tables = self.tables()?;
        let mut listed: Vec<&Project> = tables
            .projects
            .values()
            .filter(|p| filter.lists(p))
            .filter(|p| {
                carries_any(
                    tables.tags.get(&p.id).map_or(&[][..], Vec::as_slice),
                    &filter.tags,
                )
            })
            .filter(|p| !tables.has_claimed(&p.id, filter.viewer_id))
            .collect();
        listed.sort_by(|a, b| a.end_time.cmp(&b.end_time).then(a.id.cmp(&b.id)));

        let rows = listed.into_iter().map(|p| tables.listing(p)).collect();
        Ok(paginate(rows, page))
    }

    async fn creator_projects(
        &self,
        creator_id: UserId,
        tags: &[String],
        page: Page,
    ) -> StoreResult<Paged<ProjectListing>> {
        let tables = self.tables()?;
        let mut owned: Vec<&Project> = tables
            .projects
            .values()
            .filter(|p| p.creator_id == creator_id && p.status == ProjectStatus::Normal)
            .filter(|p| carries_any(tables.tags.get(&p.id).map_or(&[][..], Vec::as_slice), tags))
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));

        let rows = owned.into_iter().map(|p| tables.listing(p)).collect();
        Ok(paginate(rows, page))
    }

    async fn active_tags(&self) -> StoreResult<Vec<String>> {
        let tables = self.tables()?;
        let mut tags: Vec<String> = tables
            .tags
            .iter()
            .filter(|(id, _)| {
                tables
                    .projects
                    .get(*id)
                    .is_some_and(|p| p.status == ProjectStatus::Normal)
            })
            .flat_map(|(_, tags)| tags.iter().cloned())
            .collect();
        tags.sort();
        tags.dedup();
        Ok(tags)
    }

    async fn project_receivers(
        &self,
        project_id: &ProjectId,
        search: Option<&str>,
        page: Page,
    ) -> StoreResult<Paged<ReceiverRecord>> {
        let tables = self.tables()?;
        let mut claimed: Vec<&Item> = tables
            .items
            .values()
            .filter(|item| &item.project_id == project_id && item.is_claimed())
            .collect();
        claimed.sort_by(|a, b| b.received_at.cmp(&a.received_at).then(b.id.cmp(&a.id)));

        let rows = claimed
            .into_iter()
            .filter_map(|item| {
                let user = tables.users.get(&item.receiver_id?)?;
                let matches = search.is_none_or(|term| {
                    user.username.starts_with(term)
                        || user.nickname.contains(term)
                        || item.content.contains(term)
                });
                matches.then(|| ReceiverRecord {
                    username: user.username.clone(),
                    nickname: user.nickname.clone(),
                    content: item.content.clone(),
                    received_at: item.received_at,
                })
            })
            .collect();

        Ok(paginate(rows, page))
    }
}
