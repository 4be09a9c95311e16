//! Same-IP markers: `project:{id}:receive:ip:{ip}`, expiring when the
//! project's claim window closes.

use async_trait::async_trait;
use cdk_core::error::{StoreError, StoreResult};
use cdk_core::providers::SameIpStore;
use cdk_core::types::ProjectId;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use std::time::Duration;

/// Redis-backed [`SameIpStore`].
#[derive(Clone)]
pub struct RedisSameIpStore {
    conn_manager: ConnectionManager,
}

impl RedisSameIpStore {
    /// Create a store on an existing connection.
    #[must_use]
    pub const fn new(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }

    fn marker_key(project_id: &ProjectId, ip: &str) -> String {
        format!("project:{project_id}:receive:ip:{ip}")
    }
}

#[async_trait]
impl SameIpStore for RedisSameIpStore {
    async fn exists(&self, project_id: &ProjectId, ip: &str) -> StoreResult<bool> {
        let mut conn = self.conn_manager.clone();
        conn.exists(Self::marker_key(project_id, ip))
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to check same-IP marker: {e}")))
    }

    async fn mark(&self, project_id: &ProjectId, ip: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn_manager.clone();
        let ttl_secs = ttl.as_secs().max(1);

        // SET NX EX: `OK` when written, nil when the marker already exists.
        let written: Option<String> = redis::cmd("SET")
            .arg(Self::marker_key(project_id, ip))
            .arg(ip)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to set same-IP marker: {e}")))?;

        tracing::debug!(
            project_id = %project_id,
            ip = %ip,
            ttl_secs,
            written = written.is_some(),
            "Same-IP marker"
        );
        Ok(written.is_some())
    }

    async fn clear(&self, project_id: &ProjectId, ip: &str) -> StoreResult<()> {
        let mut conn = self.conn_manager.clone();
        conn.del::<_, ()>(Self::marker_key(project_id, ip))
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to clear same-IP marker: {e}")))
    }
}
