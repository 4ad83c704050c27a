//! Per-destination delivery throttling.
//!
//! Token buckets keyed by subscription id, held in a process-wide
//! registry with explicit eviction (`remove`, `clear`). The state lives
//! and dies with this process: running several server instances
//! multiplies the effective limit, so a multi-instance deployment needs
//! a shared TTL-based counter store instead.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Token bucket parameters for one destination.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Sustained request rate (tokens refilled per second).
    pub requests_per_second: f64,
    /// Bucket capacity: requests allowed in a burst.
    pub burst_size: u32,
}

impl RateLimitConfig {
    #[must_use]
    pub fn new(requests_per_second: f64, burst_size: u32) -> Self {
        Self {
            requests_per_second,
            burst_size,
        }
    }

    #[must_use]
    pub fn with_requests_per_second(mut self, rps: f64) -> Self {
        self.requests_per_second = rps;
        self
    }

    #[must_use]
    pub fn with_burst_size(mut self, burst: u32) -> Self {
        self.burst_size = burst;
        self
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 10.0,
            burst_size: 20,
        }
    }
}

/// Outcome of a non-consuming rate limit check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RateLimitResult {
    Allowed,
    Wait(Duration),
}

/// A single token bucket.
#[derive(Debug)]
pub struct RateLimiter {
    config: RateLimitConfig,
    tokens: f64,
    last_refill: Instant,
}

impl RateLimiter {
    #[must_use]
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            tokens: f64::from(config.burst_size),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.last_refill = now;
        self.tokens =
            (self.tokens + elapsed * self.rps()).min(f64::from(self.config.burst_size));
    }

    fn rps(&self) -> f64 {
        self.config.requests_per_second.max(f64::EPSILON)
    }

    /// Consume one token if available, without waiting.
    pub fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Tokens currently available.
    pub fn available_tokens(&mut self) -> f64 {
        self.refill();
        self.tokens.max(0.0)
    }

    /// Whether a request would be admitted right now.
    pub fn has_capacity(&mut self) -> bool {
        self.available_tokens() >= 1.0
    }

    /// Non-consuming check.
    pub fn check(&mut self) -> RateLimitResult {
        self.refill();
        if self.tokens >= 1.0 {
            RateLimitResult::Allowed
        } else {
            RateLimitResult::Wait(Duration::from_secs_f64((1.0 - self.tokens) / self.rps()))
        }
    }

    /// Reserve one token, going into debt if none are available.
    ///
    /// Returns how long the caller must wait before sending. Debt keeps
    /// concurrent reservations fair: each gets a later slot.
    fn reserve(&mut self) -> Duration {
        self.refill();
        self.tokens -= 1.0;
        if self.tokens >= 0.0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(-self.tokens / self.rps())
        }
    }

    /// Acquire one token, sleeping until the bucket allows it.
    ///
    /// Returns the time actually waited (`ZERO` when admitted at once).
    pub async fn acquire(&mut self) -> Duration {
        let wait = self.reserve();
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        wait
    }
}

/// Process-wide registry of per-subscription rate limiters.
pub struct RateLimiterRegistry {
    default_config: RateLimitConfig,
    limiters: Mutex<HashMap<Uuid, RateLimiter>>,
}

impl RateLimiterRegistry {
    #[must_use]
    pub fn new(default_config: RateLimitConfig) -> Self {
        Self {
            default_config,
            limiters: Mutex::new(HashMap::new()),
        }
    }

    /// Acquire a delivery slot for a subscription, waiting if throttled.
    ///
    /// The reservation happens under the registry lock but the wait does
    /// not, so one throttled destination never delays the others.
    pub async fn acquire(&self, subscription_id: Uuid) -> Duration {
        let wait = {
            let mut limiters = self.limiters.lock().await;
            limiters
                .entry(subscription_id)
                .or_insert_with(|| RateLimiter::new(self.default_config))
                .reserve()
        };
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        wait
    }

    /// Consume a token if available, without waiting.
    pub async fn try_acquire(&self, subscription_id: Uuid) -> bool {
        let mut limiters = self.limiters.lock().await;
        limiters
            .entry(subscription_id)
            .or_insert_with(|| RateLimiter::new(self.default_config))
            .try_acquire()
    }

    /// Non-consuming check.
    pub async fn check(&self, subscription_id: Uuid) -> RateLimitResult {
        let mut limiters = self.limiters.lock().await;
        limiters
            .entry(subscription_id)
            .or_insert_with(|| RateLimiter::new(self.default_config))
            .check()
    }

    /// Install a custom config for one subscription, resetting its bucket.
    pub async fn set_config(&self, subscription_id: Uuid, config: RateLimitConfig) {
        let mut limiters = self.limiters.lock().await;
        limiters.insert(subscription_id, RateLimiter::new(config));
    }

    /// Evict one subscription's bucket.
    pub async fn remove(&self, subscription_id: Uuid) {
        self.limiters.lock().await.remove(&subscription_id);
    }

    /// Evict all buckets.
    pub async fn clear(&self) {
        self.limiters.lock().await.clear();
    }

    /// Number of tracked subscriptions.
    pub async fn count(&self) -> usize {
        self.limiters.lock().await.len()
    }
}
