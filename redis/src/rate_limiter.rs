//! Redis-based fixed-window rate limiter.
//!
//! # Algorithm
//!
//! One counter per key under `rate_limit:{key}`:
//! 1. Read the counter; reject when it already reached the limit
//! 2. Otherwise `INCR`, and start the window (`EXPIRE`) on the first hit
//!
//! Both steps run in one Lua script so concurrent requests cannot slip past
//! the limit between the read and the increment.

use async_trait::async_trait;
use cdk_core::error::{StoreError, StoreResult};
use cdk_core::providers::RateLimiter;
use redis::aio::ConnectionManager;
use std::time::Duration;

const CHECK_AND_RECORD: &str = r"
    local current = tonumber(redis.call('GET', KEYS[1]) or '0')
    if current >= tonumber(ARGV[1]) then
        return 0
    end
    current = redis.call('INCR', KEYS[1])
    if current == 1 then
        redis.call('EXPIRE', KEYS[1], ARGV[2])
    end
    return 1
";

/// `Redis`-based fixed-window rate limiter.
#[derive(Clone)]
pub struct RedisRateLimiter {
    /// Connection manager for connection pooling.
    conn_manager: ConnectionManager,
    script: redis::Script,
}

impl RedisRateLimiter {
    /// Create a limiter on an existing connection.
    #[must_use]
    pub fn new(conn_manager: ConnectionManager) -> Self {
        Self {
            conn_manager,
            script: redis::Script::new(CHECK_AND_RECORD),
        }
    }

    /// Get the `Redis` key for rate limiting.
    fn rate_limit_key(key: &str) -> String {
        format!("rate_limit:{key}")
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check_and_record(&self, key: &str, max: u32, window: Duration) -> StoreResult<bool> {
        let mut conn = self.conn_manager.clone();
        let rate_key = Self::rate_limit_key(key);
        let window_secs = window.as_secs().max(1);

        let allowed: i64 = self
            .script
            .key(&rate_key)
            .arg(max)
            .arg(window_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| {
                tracing::error!(
                    error = %e,
                    key = %key,
                    "Redis script failed during rate limit check"
                );
                StoreError::Unavailable(format!("Failed to check and record rate limit: {e}"))
            })?;

        if allowed == 0 {
            tracing::warn!(
                rate_limit_exceeded = true,
                key = %key,
                max_count = max,
                window_secs,
                "Rate limit exceeded"
            );
            return Ok(false);
        }

        tracing::debug!(key = %key, max_count = max, window_secs, "Rate limit check passed");
        Ok(true)
    }
}
