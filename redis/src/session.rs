//! Session lookup. Sessions are written by the login flow as
//! `session:{token}` → user id; this crate only reads them.

use async_trait::async_trait;
use cdk_core::error::{StoreError, StoreResult};
use cdk_core::providers::SessionStore;
use cdk_core::types::UserId;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

/// Redis-backed [`SessionStore`].
#[derive(Clone)]
pub struct RedisSessionStore {
    conn_manager: ConnectionManager,
}

impl RedisSessionStore {
    /// Create a store on an existing connection.
    #[must_use]
    pub const fn new(conn_manager: ConnectionManager) -> Self {
        Self { conn_manager }
    }

    fn session_key(token: &str) -> String {
        format!("session:{token}")
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn user_for_session(&self, token: &str) -> StoreResult<Option<UserId>> {
        let mut conn = self.conn_manager.clone();
        let user_id: Option<u64> = conn
            .get(Self::session_key(token))
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to get session: {e}")))?;
        Ok(user_id.map(UserId))
    }
}
