//! Sliding-window request limiting keyed by client.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

use crate::config::RateLimitConfig;

#[cfg(feature = "redis")]
pub mod redis_window;

#[cfg(feature = "redis")]
pub use redis_window::RedisRateLimiter;

/// Outcome of counting one request against its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub limit: u32,
    pub remaining: u32,
    pub window: Duration,
}

impl RateDecision {
    fn from_count(count: u64, limit: u32, window: Duration) -> Self {
        Self {
            allowed: count <= u64::from(limit),
            limit,
            remaining: u64::from(limit).saturating_sub(count) as u32,
            window,
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RateLimitError {
    #[error("rate limit backend unavailable: {0}")]
    Backend(String),
}

/// Counts a request for `key` and decides whether it may proceed.
///
/// Every call is recorded, including rejected ones, so a client that keeps
/// hammering stays limited until it backs off for a full window.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, key: &str) -> Result<RateDecision, RateLimitError>;
}

/// Keys swept for empty windows once the map grows past this.
const SWEEP_THRESHOLD: usize = 10_000;

/// Process-local sliding window; suitable for a single instance.
#[derive(Debug)]
pub struct InMemoryRateLimiter {
    config: RateLimitConfig,
    hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl InMemoryRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            hits: Mutex::new(HashMap::new()),
        }
    }

    fn record(&self, key: &str, now: Instant) -> Result<RateDecision, RateLimitError> {
        let window = self.config.window;
        let mut hits = self
            .hits
            .lock()
            .map_err(|_| RateLimitError::Backend("rate limiter lock poisoned".into()))?;

        if hits.len() > SWEEP_THRESHOLD {
            hits.retain(|_, q| q.back().is_some_and(|t| now.duration_since(*t) < window));
        }

        let queue = hits.entry(key.to_string()).or_default();
        while queue.front().is_some_and(|t| now.duration_since(*t) >= window) {
            queue.pop_front();
        }
        queue.push_back(now);

        let count = u64::try_from(queue.len()).unwrap_or(u64::MAX);
        Ok(RateDecision::from_count(count, self.config.max_requests, window))
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn check(&self, key: &str) -> Result<RateDecision, RateLimitError> {
        self.record(key, Instant::now())
    }
}
