//! Claim coordination against in-memory providers.

#![allow(clippy::unwrap_used)] // Tests can unwrap
#![allow(clippy::expect_used)] // Tests can expect

use async_trait::async_trait;
use cdk_core::environment::{Clock, DistributionEnvironment};
use cdk_core::error::{ClaimError, StoreResult};
use cdk_core::providers::{InventoryStore, ProjectRepository};
use cdk_core::types::{
    DistributionMode, InventoryEntry, Item, ItemId, Project, ProjectId, ProjectStatus, TrustLevel,
};
use cdk_core::ClaimCoordinator;
use cdk_testing::{InMemoryInventoryStore, TestHarness, fixtures};
use chrono::Duration;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

const IP: &str = "203.0.113.7";

#[tokio::test]
async fn first_come_items_are_handed_out_in_order() {
    let harness = TestHarness::new();
    let project = harness.seed_first_come(fixtures::project(), &["A", "B"]).await;
    let coordinator = harness.coordinator();

    let u1 = harness.seed_user(fixtures::user(1, "u1"));
    let u2 = harness.seed_user(fixtures::user(2, "u2"));
    let u3 = harness.seed_user(fixtures::user(3, "u3"));

    let first = coordinator.receive(&project.id, &u1, "10.0.0.1").await.unwrap();
    assert_eq!(first.content, "A");
    assert!(!first.completed_project);

    let second = coordinator.receive(&project.id, &u2, "10.0.0.2").await.unwrap();
    assert_eq!(second.content, "B");
    assert!(second.completed_project);

    let third = coordinator.receive(&project.id, &u3, "10.0.0.3").await;
    assert_eq!(third, Err(ClaimError::NoStock));

    let stored = harness.repository.project(&project.id).unwrap();
    assert!(stored.is_completed);
    assert!(harness.inventory.queued(&project.id).is_empty());
}

#[tokio::test]
async fn trust_rejection_leaves_inventory_untouched() {
    let harness = TestHarness::new();
    let mut project = fixtures::project();
    project.minimum_trust_level = TrustLevel::ActiveUser;
    let project = harness.seed_first_come(project, &["A"]).await;
    let user = harness.seed_user(fixtures::user(1, "tl2"));

    let result = harness.coordinator().receive(&project.id, &user, IP).await;

    assert_eq!(
        result,
        Err(ClaimError::TrustLevelNotMet {
            required: TrustLevel::ActiveUser
        })
    );
    assert_eq!(result.unwrap_err().to_string(), "Trust level 3 or above is required");
    assert_eq!(harness.inventory.pop_calls(), 0);
    assert_eq!(harness.inventory.queued(&project.id).len(), 1);
}

#[tokio::test]
async fn time_window_is_enforced() {
    let harness = TestHarness::new();
    let project = harness.seed_first_come(fixtures::project(), &["A"]).await;
    let user = harness.seed_user(fixtures::user(1, "alice"));
    let coordinator = harness.coordinator();

    harness.clock.set(project.start_time - Duration::seconds(1));
    assert_eq!(
        coordinator.receive(&project.id, &user, IP).await,
        Err(ClaimError::TooEarly)
    );

    harness.clock.set(project.end_time + Duration::seconds(1));
    assert_eq!(
        coordinator.receive(&project.id, &user, IP).await,
        Err(ClaimError::TooLate)
    );
    assert_eq!(harness.inventory.pop_calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_claims_never_over_allocate() {
    const UNITS: usize = 5;
    const CLAIMANTS: u64 = 50;

    let harness = TestHarness::new();
    let mut project = fixtures::project();
    project.allow_same_ip = true;
    let contents: Vec<String> = (0..UNITS).map(|i| format!("CODE-{i}")).collect();
    let refs: Vec<&str> = contents.iter().map(String::as_str).collect();
    let project = harness.seed_first_come(project, &refs).await;
    let coordinator = harness.coordinator();

    let handles: Vec<_> = (1..=CLAIMANTS)
        .map(|id| {
            let coordinator = coordinator.clone();
            let user = harness.seed_user(fixtures::user(id, &format!("user{id}")));
            let project_id = project.id.clone();
            tokio::spawn(async move { coordinator.receive(&project_id, &user, IP).await })
        })
        .collect();

    let mut claimed = HashSet::new();
    for result in futures::future::join_all(handles).await {
        match result.unwrap() {
            Ok(item) => assert!(claimed.insert(item.item_id), "item handed out twice"),
            Err(e) => assert_eq!(e, ClaimError::NoStock),
        }
    }

    assert_eq!(claimed.len(), UNITS);
    assert_eq!(harness.repository.commit_count(), UNITS);
    assert!(harness.inventory.queued(&project.id).is_empty());
    assert!(harness.repository.project(&project.id).unwrap().is_completed);
}

#[tokio::test]
async fn persistence_failure_returns_item_and_clears_marker() {
    let harness = TestHarness::new();
    let project = harness.seed_first_come(fixtures::project(), &["A"]).await;
    let user = harness.seed_user(fixtures::user(1, "alice"));
    let coordinator = harness.coordinator();

    harness.repository.fail_commits(true);
    let result = coordinator.receive(&project.id, &user, IP).await;

    assert!(matches!(result, Err(ClaimError::PersistenceFailure(_))));
    assert_eq!(harness.inventory.queued(&project.id).len(), 1);
    assert_eq!(harness.same_ip.ttl(&project.id, IP), None);
    assert_eq!(coordinator.stranded_count(), 0);

    harness.repository.fail_commits(false);
    let retry = coordinator.receive(&project.id, &user, IP).await.unwrap();
    assert_eq!(retry.content, "A");
}

#[tokio::test]
async fn failed_push_back_is_counted_as_stranded() {
    let harness = TestHarness::new();
    let project = harness.seed_first_come(fixtures::project(), &["A", "B", "C"]).await;
    let coordinator = harness.coordinator();
    let alice = harness.seed_user(fixtures::user(1, "alice"));
    let bob = harness.seed_user(fixtures::user(2, "bob"));

    coordinator.receive(&project.id, &alice, "10.0.0.1").await.unwrap();

    harness.repository.fail_commits(true);
    harness.inventory.fail_pushes(true);
    let result = coordinator.receive(&project.id, &bob, "10.0.0.2").await;
    assert!(matches!(result, Err(ClaimError::PersistenceFailure(_))));
    assert_eq!(coordinator.stranded_count(), 1);

    let remaining = harness.inventory.queued(&project.id).len() as u64;
    let claimed = harness
        .repository
        .items(&project.id)
        .iter()
        .filter(|item| item.is_claimed())
        .count() as u64;
    assert_eq!(remaining + claimed + coordinator.stranded_count(), project.total_items);
}

#[tokio::test]
async fn same_ip_is_rejected_once_marked() {
    let harness = TestHarness::new();
    let project = harness.seed_first_come(fixtures::project(), &["A", "B"]).await;
    let coordinator = harness.coordinator();
    let alice = harness.seed_user(fixtures::user(1, "alice"));
    let bob = harness.seed_user(fixtures::user(2, "bob"));

    coordinator.receive(&project.id, &alice, IP).await.unwrap();
    assert_eq!(
        coordinator.receive(&project.id, &bob, IP).await,
        Err(ClaimError::DuplicateIp)
    );
    assert_eq!(harness.inventory.queued(&project.id).len(), 1);

    let now = harness.clock.now();
    let expected = (project.end_time - now).to_std().unwrap();
    assert_eq!(harness.same_ip.ttl(&project.id, IP), Some(expected));
}

#[tokio::test]
async fn same_ip_allowed_when_project_permits() {
    let harness = TestHarness::new();
    let mut project = fixtures::project();
    project.allow_same_ip = true;
    let project = harness.seed_first_come(project, &["A", "B"]).await;
    let coordinator = harness.coordinator();
    let alice = harness.seed_user(fixtures::user(1, "alice"));
    let bob = harness.seed_user(fixtures::user(2, "bob"));

    coordinator.receive(&project.id, &alice, IP).await.unwrap();
    coordinator.receive(&project.id, &bob, IP).await.unwrap();
    assert_eq!(harness.same_ip.ttl(&project.id, IP), None);
}

#[tokio::test]
async fn second_claim_by_same_user_is_rejected() {
    let harness = TestHarness::new();
    let mut project = fixtures::project();
    project.allow_same_ip = true;
    let project = harness.seed_first_come(project, &["A", "B"]).await;
    let coordinator = harness.coordinator();
    let alice = harness.seed_user(fixtures::user(1, "alice"));

    coordinator.receive(&project.id, &alice, IP).await.unwrap();
    assert_eq!(
        coordinator.receive(&project.id, &alice, IP).await,
        Err(ClaimError::AlreadyClaimed)
    );
    assert_eq!(harness.inventory.queued(&project.id).len(), 1);
}

#[tokio::test]
async fn unique_receiver_violation_maps_to_already_claimed() {
    let harness = TestHarness::new();
    let mut project = fixtures::project();
    project.allow_same_ip = true;
    let project = harness.seed_first_come(project, &["A", "B"]).await;
    let coordinator = harness.coordinator();
    let alice = harness.seed_user(fixtures::user(1, "alice"));

    coordinator.claim(&project, &alice, IP).await.unwrap();
    // Bypass the received-item pre-check to hit the constraint.
    assert_eq!(
        coordinator.claim(&project, &alice, IP).await,
        Err(ClaimError::AlreadyClaimed)
    );
    assert_eq!(harness.inventory.queued(&project.id).len(), 1);
}

#[tokio::test]
async fn completed_project_never_pops() {
    let harness = TestHarness::new();
    let mut project = fixtures::project();
    project.is_completed = true;
    let project = harness.seed_first_come(project, &["A"]).await;
    let user = harness.seed_user(fixtures::user(1, "alice"));

    assert_eq!(
        harness.coordinator().claim(&project, &user, IP).await,
        Err(ClaimError::NoStock)
    );
    assert_eq!(harness.inventory.pop_calls(), 0);
}

#[tokio::test]
async fn dangling_inventory_entry_is_not_pushed_back() {
    let harness = TestHarness::new();
    let project = harness.seed_first_come(fixtures::project(), &["A"]).await;
    let user = harness.seed_user(fixtures::user(1, "alice"));

    let item_id = harness.inventory.queued(&project.id)[0];
    harness.repository.put_item(Item {
        id: item_id,
        project_id: project.id.clone(),
        content: "A".into(),
        receiver_id: Some(fixtures::creator().id),
        received_at: None,
    });

    assert_eq!(
        harness.coordinator().claim(&project, &user, IP).await,
        Err(ClaimError::NotFound)
    );
    assert!(harness.inventory.queued(&project.id).is_empty());
}

#[tokio::test]
async fn item_lookup_failure_is_compensated() {
    let harness = TestHarness::new();
    let project = harness.seed_first_come(fixtures::project(), &["A"]).await;
    let user = harness.seed_user(fixtures::user(1, "alice"));

    harness.repository.fail_item_lookups(true);
    let result = harness.coordinator().claim(&project, &user, IP).await;

    assert!(matches!(result, Err(ClaimError::PersistenceFailure(_))));
    assert_eq!(harness.inventory.queued(&project.id).len(), 1);
}

#[tokio::test]
async fn store_outage_fails_closed() {
    let harness = TestHarness::new();
    let project = harness.seed_first_come(fixtures::project(), &["A"]).await;
    let user = harness.seed_user(fixtures::user(1, "alice"));

    harness.inventory.fail_pops(true);
    let result = harness.coordinator().claim(&project, &user, IP).await;

    assert!(matches!(result, Err(ClaimError::StoreUnavailable(_))));
    assert_eq!(harness.repository.commit_count(), 0);
}

#[tokio::test]
async fn hidden_project_is_not_found() {
    let harness = TestHarness::new();
    let mut project = fixtures::project();
    project.status = ProjectStatus::Hidden;
    let project = harness.seed_first_come(project, &["A"]).await;
    let user = harness.seed_user(fixtures::user(1, "alice"));

    assert_eq!(
        harness.coordinator().receive(&project.id, &user, IP).await,
        Err(ClaimError::NotFound)
    );
}

#[tokio::test]
async fn lottery_winner_receives_reserved_item() {
    let harness = TestHarness::new();
    let project = harness
        .seed_lottery(
            fixtures::lottery_project(),
            &[("bob", "中奖码1: X"), ("carol", "中奖码1: Y")],
        )
        .await;
    let coordinator = harness.coordinator();
    let carol = harness.seed_user(fixtures::user(3, "carol"));
    let dave = harness.seed_user(fixtures::user(4, "dave"));

    let claimed = coordinator.receive(&project.id, &carol, IP).await.unwrap();
    assert_eq!(claimed.content, "中奖码1: Y");
    assert!(!claimed.completed_project);

    assert_eq!(
        coordinator.receive(&project.id, &dave, IP).await,
        Err(ClaimError::NoStock)
    );
    assert_eq!(harness.inventory.assigned(&project.id).len(), 1);
    assert!(harness.inventory.assigned(&project.id).contains_key("bob"));
}

#[tokio::test]
async fn lottery_failed_commit_restores_assignment() {
    let harness = TestHarness::new();
    let project = harness
        .seed_lottery(fixtures::lottery_project(), &[("bob", "中奖码1: X")])
        .await;
    let bob = harness.seed_user(fixtures::user(2, "bob"));

    harness.repository.fail_commits(true);
    let result = harness.coordinator().receive(&project.id, &bob, IP).await;

    assert!(matches!(result, Err(ClaimError::PersistenceFailure(_))));
    assert!(harness.inventory.assigned(&project.id).contains_key("bob"));
}

/// Inventory that returns `pending` to the queue right after the first stock
/// read, as a concurrent failed claim pushing back would.
struct PushBackAfterStockRead {
    inner: InMemoryInventoryStore,
    pending: Mutex<Option<InventoryEntry>>,
}

#[async_trait]
impl InventoryStore for PushBackAfterStockRead {
    async fn pop(
        &self,
        project_id: &ProjectId,
        mode: DistributionMode,
        claimant: &str,
    ) -> StoreResult<Option<ItemId>> {
        self.inner.pop(project_id, mode, claimant).await
    }

    async fn push(&self, project_id: &ProjectId, entry: &InventoryEntry) -> StoreResult<()> {
        self.inner.push(project_id, entry).await
    }

    async fn stock(&self, project_id: &ProjectId, mode: DistributionMode) -> StoreResult<u64> {
        let stock = self.inner.stock(project_id, mode).await?;
        let pending = self.pending.lock().unwrap().take();
        if let Some(entry) = pending {
            self.inner.push(project_id, &entry).await?;
        }
        Ok(stock)
    }

    async fn populate(&self, project_id: &ProjectId, entries: &[InventoryEntry]) -> StoreResult<()> {
        self.inner.populate(project_id, entries).await
    }

    async fn purge(&self, project_id: &ProjectId) -> StoreResult<()> {
        self.inner.purge(project_id).await
    }
}

#[tokio::test]
async fn completing_claim_reopens_when_an_entry_comes_back() {
    let harness = TestHarness::new();
    let project = harness.seed_first_come(fixtures::project(), &["A", "B"]).await;
    // Another attempt holds "A" while this claim takes "B".
    let held = harness
        .inventory
        .pop(&project.id, DistributionMode::FirstCome, "other")
        .await
        .unwrap()
        .unwrap();

    let env = DistributionEnvironment {
        inventory: Arc::new(PushBackAfterStockRead {
            inner: harness.inventory.clone(),
            pending: Mutex::new(Some(InventoryEntry::Queued(held))),
        }),
        ..harness.env()
    };
    let alice = harness.seed_user(fixtures::user(1, "alice"));

    let claimed = ClaimCoordinator::new(env)
        .claim(&project, &alice, IP)
        .await
        .unwrap();

    assert_eq!(claimed.content, "B");
    assert!(!claimed.completed_project);
    assert!(!harness.repository.project(&project.id).unwrap().is_completed);
    assert_eq!(harness.inventory.queued(&project.id), vec![held]);
}

#[tokio::test]
async fn push_back_reopens_a_project_completed_meanwhile() {
    let harness = TestHarness::new();
    let project = harness.seed_first_come(fixtures::project(), &["A", "B"]).await;
    let coordinator = harness.coordinator();
    let bob = harness.seed_user(fixtures::user(2, "bob"));

    // A concurrent claim took the last unit while this attempt is in flight.
    let completed = Project {
        is_completed: true,
        ..project.clone()
    };
    harness
        .repository
        .update_project(&completed, &[], &[])
        .await
        .unwrap();
    harness.repository.fail_commits(true);

    let result = coordinator.claim(&project, &bob, IP).await;

    assert!(matches!(result, Err(ClaimError::PersistenceFailure(_))));
    assert_eq!(harness.inventory.queued(&project.id).len(), 2);
    assert!(!harness.repository.project(&project.id).unwrap().is_completed);
}
