//! Dependency injection for the distribution service.
//!
//! Every side effect goes through a trait object held by
//! [`DistributionEnvironment`]; production wires Redis, Postgres and the HTTP
//! forum client, tests wire in-memory mocks and a fixed clock.

use crate::providers::{
    ForumClient, InventoryStore, ProjectRepository, RateLimiter, SameIpStore, SessionStore,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Clock trait - abstracts time operations for testability
pub trait Clock: Send + Sync {
    /// Get the current time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Shared handles to every provider.
#[derive(Clone)]
pub struct DistributionEnvironment {
    /// Redis-backed inventory
    pub inventory: Arc<dyn InventoryStore>,
    /// Same-IP markers
    pub same_ip: Arc<dyn SameIpStore>,
    /// Relational store
    pub repository: Arc<dyn ProjectRepository>,
    /// Forum API
    pub forum: Arc<dyn ForumClient>,
    /// Creation throttle
    pub rate_limiter: Arc<dyn RateLimiter>,
    /// Bearer token lookup
    pub sessions: Arc<dyn SessionStore>,
    /// Time source
    pub clock: Arc<dyn Clock>,
}

impl DistributionEnvironment {
    /// Current time according to the injected clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

impl std::fmt::Debug for DistributionEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributionEnvironment").finish_non_exhaustive()
    }
}
