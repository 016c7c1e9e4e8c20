//! Redis-backed sliding window shared by every instance.
//!
//! Each check runs one atomic pipeline on a sorted set per key:
//! `ZREMRANGEBYSCORE` (drop hits older than the window), `ZADD` (record this
//! hit), `ZCARD` (count), `PEXPIRE` (let idle keys disappear).

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::Client;
use redis::aio::MultiplexedConnection;
use uuid::Uuid;

use super::{RateDecision, RateLimitError, RateLimiter};
use crate::config::RateLimitConfig;

const KEY_PREFIX: &str = "saasbill:ratelimit";

#[derive(Clone)]
pub struct RedisRateLimiter {
    conn: MultiplexedConnection,
    config: RateLimitConfig,
}

impl RedisRateLimiter {
    pub async fn connect(url: &str, config: RateLimitConfig) -> Result<Self, RateLimitError> {
        let client = Client::open(url).map_err(|e| RateLimitError::Backend(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;
        Ok(Self { conn, config })
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn check(&self, key: &str) -> Result<RateDecision, RateLimitError> {
        let now_ms = whole_millis(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map_err(|e| RateLimitError::Backend(e.to_string()))?,
        );
        let window_ms = whole_millis(self.config.window);
        let redis_key = format!("{KEY_PREFIX}:{key}");
        let member = format!("{now_ms}:{}", Uuid::now_v7());

        let mut conn = self.conn.clone();
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .cmd("ZREMRANGEBYSCORE")
            .arg(&redis_key)
            .arg(0)
            .arg(now_ms.saturating_sub(window_ms))
            .ignore()
            .cmd("ZADD")
            .arg(&redis_key)
            .arg(now_ms)
            .arg(member)
            .ignore()
            .cmd("ZCARD")
            .arg(&redis_key)
            .cmd("PEXPIRE")
            .arg(&redis_key)
            .arg(window_ms)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| RateLimitError::Backend(e.to_string()))?;

        Ok(RateDecision::from_count(count, self.config.max_requests, self.config.window))
    }
}

/// Milliseconds in `d`, saturating at `u64::MAX`.
fn whole_millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
