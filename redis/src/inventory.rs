//! Redis-backed inventory store.
//!
//! # Layout
//!
//! One key per project, `project:{id}:items`:
//! - first-come: a list of item ids, popped from the head (`LPOP`) and
//!   returned to the tail (`RPUSH`)
//! - lottery: a hash `winner username → item id`; a claim removes the
//!   claimant's field with an atomic get-and-delete script

use async_trait::async_trait;
use cdk_core::error::{StoreError, StoreResult};
use cdk_core::providers::InventoryStore;
use cdk_core::types::{DistributionMode, InventoryEntry, ItemId, ProjectId};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// HGET + HDEL as one server-side step, so two requests for the same winner
/// cannot both receive the item.
const TAKE_ASSIGNED: &str = r"
    local item = redis.call('HGET', KEYS[1], ARGV[1])
    if item then
        redis.call('HDEL', KEYS[1], ARGV[1])
    end
    return item
";

/// Inventory store on a Redis list / hash per project.
#[derive(Clone)]
pub struct RedisInventoryStore {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
    take_assigned: redis::Script,
}

impl RedisInventoryStore {
    /// Create a store on an existing connection.
    #[must_use]
    pub fn new(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            take_assigned: redis::Script::new(TAKE_ASSIGNED),
        }
    }

    /// Get the `Redis` key holding a project's inventory.
    fn items_key(project_id: &ProjectId) -> String {
        format!("project:{project_id}:items")
    }
}

#[async_trait]
impl InventoryStore for RedisInventoryStore {
    async fn pop(
        &self,
        project_id: &ProjectId,
        mode: DistributionMode,
        claimant: &str,
    ) -> StoreResult<Option<ItemId>> {
        let mut conn = self.conn_manager.clone();
        let key = Self::items_key(project_id);

        let popped: Option<u64> = match mode {
            DistributionMode::FirstCome => conn.lpop(&key, None).await,
            DistributionMode::Lottery => {
                self.take_assigned
                    .key(&key)
                    .arg(claimant)
                    .invoke_async(&mut conn)
                    .await
            }
        }
        .map_err(|e| StoreError::Unavailable(format!("Failed to pop inventory: {e}")))?;

        tracing::debug!(
            project_id = %project_id,
            mode = mode.label(),
            popped = ?popped,
            "Inventory pop"
        );

        Ok(popped.map(ItemId))
    }

    async fn push(&self, project_id: &ProjectId, entry: &InventoryEntry) -> StoreResult<()> {
        let mut conn = self.conn_manager.clone();
        let key = Self::items_key(project_id);

        let result: redis::RedisResult<()> = match entry {
            InventoryEntry::Queued(item_id) => conn.rpush(&key, item_id.0).await,
            InventoryEntry::Assigned { winner, item_id } => {
                conn.hset(&key, winner, item_id.0).await
            }
        };
        result.map_err(|e| StoreError::Unavailable(format!("Failed to push inventory: {e}")))
    }

    async fn stock(&self, project_id: &ProjectId, mode: DistributionMode) -> StoreResult<u64> {
        let mut conn = self.conn_manager.clone();
        let key = Self::items_key(project_id);

        match mode {
            DistributionMode::FirstCome => conn.llen(&key).await,
            DistributionMode::Lottery => conn.hlen(&key).await,
        }
        .map_err(|e| StoreError::Unavailable(format!("Failed to read stock: {e}")))
    }

    async fn populate(
        &self,
        project_id: &ProjectId,
        entries: &[InventoryEntry],
    ) -> StoreResult<()> {
        let mut queued = Vec::new();
        let mut assigned = Vec::new();
        for entry in entries {
            match entry {
                InventoryEntry::Queued(item_id) => queued.push(item_id.0),
                InventoryEntry::Assigned { winner, item_id } => {
                    assigned.push((winner.as_str(), item_id.0));
                }
            }
        }
        if queued.is_empty() && assigned.is_empty() {
            return Ok(());
        }

        let key = Self::items_key(project_id);
        let mut pipe = redis::pipe();
        pipe.atomic();
        if !queued.is_empty() {
            pipe.rpush(&key, &queued).ignore();
        }
        if !assigned.is_empty() {
            pipe.hset_multiple(&key, &assigned).ignore();
        }

        let mut conn = self.conn_manager.clone();
        pipe.query_async::<()>(&mut conn).await.map_err(|e| {
            StoreError::Unavailable(format!("Failed to populate inventory: {e}"))
        })?;

        tracing::debug!(
            project_id = %project_id,
            queued = queued.len(),
            assigned = assigned.len(),
            "Inventory populated"
        );
        Ok(())
    }

    async fn purge(&self, project_id: &ProjectId) -> StoreResult<()> {
        let mut conn = self.conn_manager.clone();
        conn.del::<_, ()>(Self::items_key(project_id))
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to purge inventory: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Note: These tests require a running Redis instance
    // Run with: docker run -d -p 6379:6379 redis:7-alpine

    #[allow(clippy::unwrap_used)]
    async fn store() -> RedisInventoryStore {
        RedisInventoryStore::new(crate::connect("redis://127.0.0.1:6379").await.unwrap())
    }

    #[test]
    fn items_key_format() {
        let id = ProjectId::from_string("abc");
        assert_eq!(RedisInventoryStore::items_key(&id), "project:abc:items");
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn test_first_come_fifo_and_push_back() {
        let store = store().await;
        let project = ProjectId::new();
        let mode = DistributionMode::FirstCome;
        store
            .populate(
                &project,
                &[InventoryEntry::Queued(ItemId(1)), InventoryEntry::Queued(ItemId(2))],
            )
            .await
            .unwrap();

        assert_eq!(store.stock(&project, mode).await.unwrap(), 2);
        assert_eq!(store.pop(&project, mode, "x").await.unwrap(), Some(ItemId(1)));

        store.push(&project, &InventoryEntry::Queued(ItemId(1))).await.unwrap();
        assert_eq!(store.pop(&project, mode, "x").await.unwrap(), Some(ItemId(2)));
        assert_eq!(store.pop(&project, mode, "x").await.unwrap(), Some(ItemId(1)));
        assert_eq!(store.pop(&project, mode, "x").await.unwrap(), None);

        store.purge(&project).await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    #[allow(clippy::unwrap_used)]
    async fn test_lottery_take_is_per_winner() {
        let store = store().await;
        let project = ProjectId::new();
        let mode = DistributionMode::Lottery;
        store
            .populate(
                &project,
                &[InventoryEntry::Assigned {
                    winner: "bob".into(),
                    item_id: ItemId(7),
                }],
            )
            .await
            .unwrap();

        assert_eq!(store.pop(&project, mode, "carol").await.unwrap(), None);
        assert_eq!(store.pop(&project, mode, "bob").await.unwrap(), Some(ItemId(7)));
        assert_eq!(store.pop(&project, mode, "bob").await.unwrap(), None);
        assert_eq!(store.stock(&project, mode).await.unwrap(), 0);

        store.purge(&project).await.unwrap();
    }
}
