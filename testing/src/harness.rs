//! Fully wired in-memory environment.

use crate::mocks::{FixedClock, test_clock};
use crate::{
    InMemoryInventoryStore, InMemoryProjectRepository, InMemoryRateLimiter, InMemorySameIpStore,
    InMemorySessionStore, MockForumClient,
};
use cdk_core::environment::DistributionEnvironment;
use cdk_core::providers::{InventoryStore, ProjectRepository};
use cdk_core::types::{InventoryEntry, Project, User};
use cdk_core::{ClaimCoordinator, ProjectService, ProjectSettings};
use std::sync::Arc;

/// Every in-memory provider plus the environment built from them.
///
/// Fields stay accessible so tests can inject failures and inspect state.
#[derive(Debug, Clone)]
pub struct TestHarness {
    /// Inventory store
    pub inventory: InMemoryInventoryStore,
    /// Same-IP markers
    pub same_ip: InMemorySameIpStore,
    /// Relational store
    pub repository: InMemoryProjectRepository,
    /// Forum
    pub forum: MockForumClient,
    /// Creation throttle
    pub rate_limiter: InMemoryRateLimiter,
    /// Sessions
    pub sessions: InMemorySessionStore,
    /// Clock shared with the environment
    pub clock: FixedClock,
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl TestHarness {
    /// Fresh providers with the clock at 2025-01-01 00:00 UTC.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inventory: InMemoryInventoryStore::new(),
            same_ip: InMemorySameIpStore::new(),
            repository: InMemoryProjectRepository::new(),
            forum: MockForumClient::new(),
            rate_limiter: InMemoryRateLimiter::new(),
            sessions: InMemorySessionStore::new(),
            clock: test_clock(),
        }
    }

    /// Environment sharing this harness' providers.
    #[must_use]
    pub fn env(&self) -> DistributionEnvironment {
        DistributionEnvironment {
            inventory: Arc::new(self.inventory.clone()),
            same_ip: Arc::new(self.same_ip.clone()),
            repository: Arc::new(self.repository.clone()),
            forum: Arc::new(self.forum.clone()),
            rate_limiter: Arc::new(self.rate_limiter.clone()),
            sessions: Arc::new(self.sessions.clone()),
            clock: Arc::new(self.clock.clone()),
        }
    }

    /// Claim coordinator over this harness.
    #[must_use]
    pub fn coordinator(&self) -> ClaimCoordinator {
        ClaimCoordinator::new(self.env())
    }

    /// Project service with default settings.
    #[must_use]
    pub fn projects(&self) -> ProjectService {
        self.projects_with(ProjectSettings::default())
    }

    /// Project service with custom settings.
    #[must_use]
    pub fn projects_with(&self, settings: ProjectSettings) -> ProjectService {
        ProjectService::new(self.env(), settings)
    }

    /// Store a user and return it.
    #[must_use]
    pub fn seed_user(&self, user: User) -> User {
        self.repository.insert_user(user.clone());
        user
    }

    /// Store a first-come project with `contents` queued in order.
    ///
    /// # Panics
    ///
    /// Panics if an in-memory provider fails.
    #[allow(clippy::unwrap_used)]
    pub async fn seed_first_come(&self, mut project: Project, contents: &[&str]) -> Project {
        let contents: Vec<String> = contents.iter().map(ToString::to_string).collect();
        project.total_items = contents.len() as u64;
        let ids = self
            .repository
            .insert_project(&project, &[], &contents)
            .await
            .unwrap();
        let entries: Vec<InventoryEntry> = ids.into_iter().map(InventoryEntry::Queued).collect();
        self.inventory.populate(&project.id, &entries).await.unwrap();
        project
    }

    /// Store a lottery project with one item per `(winner, content)` pair.
    ///
    /// # Panics
    ///
    /// Panics if an in-memory provider fails.
    #[allow(clippy::unwrap_used)]
    pub async fn seed_lottery(&self, mut project: Project, allocations: &[(&str, &str)]) -> Project {
        let contents: Vec<String> = allocations.iter().map(|(_, c)| (*c).to_string()).collect();
        project.total_items = contents.len() as u64;
        let ids = self
            .repository
            .insert_project(&project, &[], &contents)
            .await
            .unwrap();
        let entries: Vec<InventoryEntry> = allocations
            .iter()
            .zip(ids)
            .map(|((winner, _), item_id)| InventoryEntry::Assigned {
                winner: (*winner).to_string(),
                item_id,
            })
            .collect();
        self.inventory.populate(&project.id, &entries).await.unwrap();
        project
    }
}
