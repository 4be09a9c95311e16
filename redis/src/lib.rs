//! # CDK Redis
//!
//! Redis implementations of the fast-path providers:
//!
//! - [`RedisInventoryStore`]: `project:{id}:items` as a list (first-come) or a
//!   hash keyed by winner username (lottery)
//! - [`RedisSameIpStore`]: `project:{id}:receive:ip:{ip}` markers with a TTL
//! - [`RedisRateLimiter`]: fixed-window counters under `rate_limit:{key}`
//! - [`RedisSessionStore`]: `session:{token}` → user id
//!
//! All stores share one multiplexed [`ConnectionManager`]; build it once with
//! [`connect`] and hand clones to each store.

use cdk_core::error::{StoreError, StoreResult};
use redis::Client;
use redis::aio::ConnectionManager;

mod inventory;
mod rate_limiter;
mod same_ip;
mod session;

pub use inventory::RedisInventoryStore;
pub use rate_limiter::RedisRateLimiter;
pub use same_ip::RedisSameIpStore;
pub use session::RedisSessionStore;

/// Open a connection manager for `redis_url`.
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if the URL is invalid or the server
/// cannot be reached.
pub async fn connect(redis_url: &str) -> StoreResult<ConnectionManager> {
    let client = Client::open(redis_url)
        .map_err(|e| StoreError::Unavailable(format!("Failed to create Redis client: {e}")))?;

    ConnectionManager::new(client).await.map_err(|e| {
        StoreError::Unavailable(format!("Failed to create Redis connection manager: {e}"))
    })
}

/// Round-trip a `PING` (readiness probe).
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if the server does not answer.
pub async fn ping(conn_manager: &ConnectionManager) -> StoreResult<()> {
    let mut conn = conn_manager.clone();
    redis::cmd("PING")
        .query_async::<String>(&mut conn)
        .await
        .map(|_| ())
        .map_err(|e| StoreError::Unavailable(format!("Redis ping failed: {e}")))
}
