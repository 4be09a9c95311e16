//! In-memory Redis-side providers: inventory, same-IP markers, rate limiter
//! and sessions.

use async_trait::async_trait;
use cdk_core::error::{StoreError, StoreResult};
use cdk_core::providers::{InventoryStore, RateLimiter, SameIpStore, SessionStore};
use cdk_core::types::{DistributionMode, InventoryEntry, ItemId, ProjectId, UserId};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

fn lock<T>(mutex: &Mutex<T>) -> StoreResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| StoreError::Unavailable("Mutex lock failed".to_string()))
}

fn injected(op: &str) -> StoreError {
    StoreError::Unavailable(format!("injected {op} failure"))
}

#[derive(Debug, Default)]
struct Inventory {
    queued: VecDeque<ItemId>,
    assigned: HashMap<String, ItemId>,
}

/// In-memory inventory store.
///
/// Pops run under a single mutex, giving the same take-one atomicity as the
/// Redis `LPOP` / Lua get-and-delete.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    projects: Arc<Mutex<HashMap<ProjectId, Inventory>>>,
    fail_pop: Arc<AtomicBool>,
    fail_push: Arc<AtomicBool>,
    fail_stock: Arc<AtomicBool>,
    pops: Arc<AtomicUsize>,
}

impl InMemoryInventoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent pop fail
    pub fn fail_pops(&self, fail: bool) {
        self.fail_pop.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent push fail (strands popped items)
    pub fn fail_pushes(&self, fail: bool) {
        self.fail_push.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent stock lookup fail
    pub fn fail_stock(&self, fail: bool) {
        self.fail_stock.store(fail, Ordering::SeqCst);
    }

    /// Number of pop calls that reached the store
    #[must_use]
    pub fn pop_calls(&self) -> usize {
        self.pops.load(Ordering::SeqCst)
    }

    /// Queued item ids of a first-come project, head first
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn queued(&self, project_id: &ProjectId) -> Vec<ItemId> {
        self.projects
            .lock()
            .unwrap()
            .get(project_id)
            .map(|inv| inv.queued.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Winner assignments of a lottery project
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn assigned(&self, project_id: &ProjectId) -> HashMap<String, ItemId> {
        self.projects
            .lock()
            .unwrap()
            .get(project_id)
            .map(|inv| inv.assigned.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn pop(
        &self,
        project_id: &ProjectId,
        mode: DistributionMode,
        claimant: &str,
    ) -> StoreResult<Option<ItemId>> {
        self.pops.fetch_add(1, Ordering::SeqCst);
        if self.fail_pop.load(Ordering::SeqCst) {
            return Err(injected("pop"));
        }
        let mut projects = lock(&self.projects)?;
        let Some(inventory) = projects.get_mut(project_id) else {
            return Ok(None);
        };
        Ok(match mode {
            DistributionMode::FirstCome => inventory.queued.pop_front(),
            DistributionMode::Lottery => inventory.assigned.remove(claimant),
        })
    }

    async fn push(&self, project_id: &ProjectId, entry: &InventoryEntry) -> StoreResult<()> {
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(injected("push"));
        }
        let mut projects = lock(&self.projects)?;
        let inventory = projects.entry(project_id.clone()).or_default();
        match entry {
            InventoryEntry::Queued(item_id) => inventory.queued.push_back(*item_id),
            InventoryEntry::Assigned { winner, item_id } => {
                inventory.assigned.insert(winner.clone(), *item_id);
            }
        }
        Ok(())
    }

    async fn stock(&self, project_id: &ProjectId, mode: DistributionMode) -> StoreResult<u64> {
        if self.fail_stock.load(Ordering::SeqCst) {
            return Err(injected("stock"));
        }
        let projects = lock(&self.projects)?;
        let count = projects.get(project_id).map_or(0, |inv| match mode {
            DistributionMode::FirstCome => inv.queued.len(),
            DistributionMode::Lottery => inv.assigned.len(),
        });
        Ok(count as u64)
    }

    async fn populate(
        &self,
        project_id: &ProjectId,
        entries: &[InventoryEntry],
    ) -> StoreResult<()> {
        if self.fail_push.load(Ordering::SeqCst) {
            return Err(injected("populate"));
        }
        let mut projects = lock(&self.projects)?;
        let inventory = projects.entry(project_id.clone()).or_default();
        for entry in entries {
            match entry {
                InventoryEntry::Queued(item_id) => inventory.queued.push_back(*item_id),
                InventoryEntry::Assigned { winner, item_id } => {
                    inventory.assigned.insert(winner.clone(), *item_id);
                }
            }
        }
        Ok(())
    }

    async fn purge(&self, project_id: &ProjectId) -> StoreResult<()> {
        lock(&self.projects)?.remove(project_id);
        Ok(())
    }
}

/// In-memory same-IP markers. TTLs are recorded but never expire.
#[derive(Debug, Clone, Default)]
pub struct InMemorySameIpStore {
    markers: Arc<Mutex<HashMap<(ProjectId, String), Duration>>>,
    fail_mark: Arc<AtomicBool>,
}

impl InMemorySameIpStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent mark fail
    pub fn fail_marks(&self, fail: bool) {
        self.fail_mark.store(fail, Ordering::SeqCst);
    }

    /// TTL recorded for a marker, if present
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[must_use]
    #[allow(clippy::unwrap_used)]
    pub fn ttl(&self, project_id: &ProjectId, ip: &str) -> Option<Duration> {
        self.markers
            .lock()
            .unwrap()
            .get(&(project_id.clone(), ip.to_string()))
            .copied()
    }
}

#[async_trait]
impl SameIpStore for InMemorySameIpStore {
    async fn exists(&self, project_id: &ProjectId, ip: &str) -> StoreResult<bool> {
        Ok(lock(&self.markers)?.contains_key(&(project_id.clone(), ip.to_string())))
    }

    async fn mark(&self, project_id: &ProjectId, ip: &str, ttl: Duration) -> StoreResult<bool> {
        if self.fail_mark.load(Ordering::SeqCst) {
            return Err(injected("mark"));
        }
        let mut markers = lock(&self.markers)?;
        let key = (project_id.clone(), ip.to_string());
        if markers.contains_key(&key) {
            return Ok(false);
        }
        markers.insert(key, ttl);
        Ok(true)
    }

    async fn clear(&self, project_id: &ProjectId, ip: &str) -> StoreResult<()> {
        lock(&self.markers)?.remove(&(project_id.clone(), ip.to_string()));
        Ok(())
    }
}

/// In-memory fixed-window counter. Windows never roll over; call
/// [`InMemoryRateLimiter::reset`] to start a new one.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRateLimiter {
    counts: Arc<Mutex<HashMap<String, u32>>>,
}

impl InMemoryRateLimiter {
    /// Create an empty limiter
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget all counters
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    pub fn reset(&self) {
        self.counts.lock().unwrap().clear();
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check_and_record(&self, key: &str, max: u32, _window: Duration) -> StoreResult<bool> {
        let mut counts = lock(&self.counts)?;
        let count = counts.entry(key.to_string()).or_insert(0);
        if *count >= max {
            return Ok(false);
        }
        *count += 1;
        Ok(true)
    }
}

/// In-memory session table.
#[derive(Debug, Clone, Default)]
pub struct InMemorySessionStore {
    sessions: Arc<Mutex<HashMap<String, UserId>>>,
    revoked: Arc<Mutex<HashSet<String>>>,
}

impl InMemorySessionStore {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session token
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    pub fn insert(&self, token: impl Into<String>, user_id: UserId) {
        self.sessions.lock().unwrap().insert(token.into(), user_id);
    }

    /// Invalidate a session token
    ///
    /// # Panics
    ///
    /// Panics if the mutex is poisoned.
    #[allow(clippy::unwrap_used)]
    pub fn revoke(&self, token: &str) {
        self.revoked.lock().unwrap().insert(token.to_string());
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn user_for_session(&self, token: &str) -> StoreResult<Option<UserId>> {
        if lock(&self.revoked)?.contains(token) {
            return Ok(None);
        }
        Ok(lock(&self.sessions)?.get(token).copied())
    }
}
