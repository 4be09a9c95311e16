//! Claim coordination: pop one unit, persist the assignment, compensate.
//!
//! The inventory pop is the only cross-request ordering primitive. Once an
//! entry is popped it belongs to this attempt; if the durable write fails the
//! entry is pushed back so the unit becomes claimable again. A push-back that
//! itself fails leaves the item stranded outside the inventory; strandings are
//! counted, exported as a metric and logged at error level.
//!
//! The last-unit decision is made on a stock read taken after the pop, so a
//! concurrent attempt can push its entry back after another claim decided to
//! complete the project. Both sides repair this: a successful push-back
//! reopens the project, and a completing claim re-reads the stock after its
//! commit and reopens the project if an entry reappeared.

use crate::eligibility;
use crate::environment::DistributionEnvironment;
use crate::error::{ClaimError, StoreError};
use crate::metrics;
use crate::types::{
    ClaimRecord, ClaimedItem, InventoryEntry, Project, ProjectId, ProjectStatus, User,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Smallest TTL given to a same-IP marker.
const MIN_MARKER_TTL: Duration = Duration::from_secs(1);

/// Runs the pop → persist → push-back sequence for one claim.
#[derive(Clone, Debug)]
pub struct ClaimCoordinator {
    env: DistributionEnvironment,
    stranded: Arc<AtomicU64>,
}

impl ClaimCoordinator {
    /// Create a coordinator over the given providers.
    #[must_use]
    pub fn new(env: DistributionEnvironment) -> Self {
        Self {
            env,
            stranded: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Providers used by this coordinator.
    #[must_use]
    pub const fn environment(&self) -> &DistributionEnvironment {
        &self.env
    }

    /// Number of popped items that could not be returned to inventory.
    #[must_use]
    pub fn stranded_count(&self) -> u64 {
        self.stranded.load(Ordering::Relaxed)
    }

    /// Load a project, run the eligibility chain and claim.
    ///
    /// # Errors
    ///
    /// - [`ClaimError::NotFound`] if the project is missing or not visible
    /// - [`ClaimError::AlreadyClaimed`] if the user already holds an item
    /// - any eligibility or claim failure
    pub async fn receive(
        &self,
        project_id: &ProjectId,
        user: &User,
        ip: &str,
    ) -> Result<ClaimedItem, ClaimError> {
        let result = self.receive_inner(project_id, user, ip).await;
        if let Err(e) = &result {
            if e.is_eligibility_failure() || matches!(e, ClaimError::AlreadyClaimed) {
                tracing::debug!(
                    project_id = %project_id,
                    user_id = %user.id,
                    code = e.code(),
                    "Claim rejected"
                );
            }
        }
        result
    }

    async fn receive_inner(
        &self,
        project_id: &ProjectId,
        user: &User,
        ip: &str,
    ) -> Result<ClaimedItem, ClaimError> {
        let project = match self.env.repository.find_project(project_id).await? {
            Some(project) if project.status == ProjectStatus::Normal => project,
            _ => {
                let err = ClaimError::NotFound;
                metrics::record_claim_failed(&err);
                return Err(err);
            }
        };

        if self.env.repository.received_item(project_id, user.id).await?.is_some() {
            let err = ClaimError::AlreadyClaimed;
            metrics::record_claim_failed(&err);
            return Err(err);
        }

        if let Err(err) = eligibility::check(&self.env, self.env.now(), &project, user, ip).await {
            metrics::record_claim_failed(&err);
            return Err(err);
        }

        self.claim(&project, user, ip).await
    }

    /// Claim one unit of `project` for `user`.
    ///
    /// Eligibility must already have been checked. On success exactly one
    /// inventory entry has been consumed and recorded against the user.
    ///
    /// # Errors
    ///
    /// - [`ClaimError::NoStock`] if the project is completed or the inventory is empty
    /// - [`ClaimError::NotFound`] if the popped id has no matching unclaimed item
    /// - [`ClaimError::DuplicateIp`] if another claim from `ip` won the marker
    /// - [`ClaimError::AlreadyClaimed`] on the unique-receiver violation
    /// - [`ClaimError::PersistenceFailure`] if the durable write failed
    /// - [`ClaimError::StoreUnavailable`] if the pop itself failed
    pub async fn claim(
        &self,
        project: &Project,
        user: &User,
        ip: &str,
    ) -> Result<ClaimedItem, ClaimError> {
        let started = Instant::now();
        let result = self.claim_inner(project, user, ip).await;
        match &result {
            Ok(claimed) => {
                metrics::record_claim_succeeded(started.elapsed().as_secs_f64());
                tracing::info!(
                    project_id = %project.id,
                    user_id = %user.id,
                    item_id = %claimed.item_id,
                    completed = claimed.completed_project,
                    "Item claimed"
                );
            }
            Err(e) => metrics::record_claim_failed(e),
        }
        result
    }

    async fn claim_inner(
        &self,
        project: &Project,
        user: &User,
        ip: &str,
    ) -> Result<ClaimedItem, ClaimError> {
        if project.is_completed {
            return Err(ClaimError::NoStock);
        }

        let mode = project.distribution_mode;
        let Some(item_id) = self.env.inventory.pop(&project.id, mode, &user.username).await? else {
            return Err(ClaimError::NoStock);
        };
        let entry = InventoryEntry::for_mode(mode, item_id, &user.username);

        let item = match self.env.repository.find_item(item_id).await {
            Ok(Some(item)) if item.project_id == project.id && !item.is_claimed() => item,
            Ok(_) => {
                tracing::error!(
                    project_id = %project.id,
                    item_id = %item_id,
                    "Inventory entry has no matching unclaimed item"
                );
                return Err(ClaimError::NotFound);
            }
            Err(e) => {
                self.compensate(project, &entry, None).await;
                return Err(ClaimError::PersistenceFailure(e.to_string()));
            }
        };

        let remaining = match self.env.inventory.stock(&project.id, mode).await {
            Ok(remaining) => remaining,
            Err(e) => {
                self.compensate(project, &entry, None).await;
                return Err(ClaimError::PersistenceFailure(e.to_string()));
            }
        };

        let mut marked_ip = None;
        if !project.allow_same_ip {
            let now = self.env.now();
            let ttl = (project.end_time - now)
                .to_std()
                .unwrap_or(MIN_MARKER_TTL)
                .max(MIN_MARKER_TTL);
            match self.env.same_ip.mark(&project.id, ip, ttl).await {
                Ok(true) => marked_ip = Some(ip),
                Ok(false) => {
                    self.compensate(project, &entry, None).await;
                    return Err(ClaimError::DuplicateIp);
                }
                Err(e) => {
                    self.compensate(project, &entry, None).await;
                    return Err(ClaimError::PersistenceFailure(e.to_string()));
                }
            }
        }

        let record = ClaimRecord {
            project_id: project.id.clone(),
            item_id,
            receiver_id: user.id,
            received_at: self.env.now(),
            complete_project: remaining == 0,
        };

        if let Err(e) = self.env.repository.commit_claim(&record).await {
            self.compensate(project, &entry, marked_ip).await;
            return Err(match e {
                StoreError::Conflict(_) => ClaimError::AlreadyClaimed,
                other => ClaimError::PersistenceFailure(other.to_string()),
            });
        }

        let completed_project =
            record.complete_project && !self.reopen_if_restocked(project).await;

        Ok(ClaimedItem {
            project_id: project.id.clone(),
            item_id,
            content: item.content,
            received_at: record.received_at,
            completed_project,
        })
    }

    /// After completing a project, reopen it if the inventory refilled
    /// meanwhile. Returns whether it was reopened.
    async fn reopen_if_restocked(&self, project: &Project) -> bool {
        match self.env.inventory.stock(&project.id, project.distribution_mode).await {
            Ok(0) => false,
            Ok(remaining) => {
                tracing::warn!(
                    project_id = %project.id,
                    remaining,
                    "Stock reappeared after completion, reopening project"
                );
                self.reopen(project).await
            }
            Err(e) => {
                tracing::warn!(
                    project_id = %project.id,
                    error = %e,
                    "Failed to re-read stock after completing project"
                );
                false
            }
        }
    }

    async fn reopen(&self, project: &Project) -> bool {
        match self.env.repository.reopen_project(&project.id).await {
            Ok(reopened) => reopened,
            Err(e) => {
                tracing::error!(
                    project_id = %project.id,
                    error = %e,
                    "Failed to reopen project, remaining stock is unclaimable"
                );
                false
            }
        }
    }

    /// Undo the side effects of a failed attempt: clear the marker this
    /// attempt set, then return the popped entry to inventory.
    async fn compensate(&self, project: &Project, entry: &InventoryEntry, marked_ip: Option<&str>) {
        if let Some(ip) = marked_ip {
            if let Err(e) = self.env.same_ip.clear(&project.id, ip).await {
                tracing::warn!(
                    project_id = %project.id,
                    error = %e,
                    "Failed to clear same-IP marker after failed claim"
                );
            }
        }

        if let Err(e) = self.env.inventory.push(&project.id, entry).await {
            self.stranded.fetch_add(1, Ordering::Relaxed);
            metrics::record_claim_stranded();
            tracing::error!(
                project_id = %project.id,
                item_id = %entry.item_id(),
                error = %e,
                "Push-back failed, item stranded outside inventory"
            );
        } else {
            tracing::warn!(
                project_id = %project.id,
                item_id = %entry.item_id(),
                "Claim failed, item returned to inventory"
            );
            // A concurrent claim may have completed the project while the
            // entry was out.
            if self.reopen(project).await {
                tracing::info!(project_id = %project.id, "Project reopened after push-back");
            }
        }
    }
}
