//! Rate Limiting Infrastructure
//!
//! Sliding-window limiter keyed by an arbitrary string (typically a client
//! IP). Hits are kept per key as timestamps; a hit is admitted when fewer
//! than `max_requests` hits fall inside the trailing window.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::clock::SharedClock;

/// Rate limit configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Maximum requests allowed in the window
    pub max_requests: u32,
    /// Time window duration
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 5,
            window: Duration::from_secs(60),
        }
    }
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window.as_millis() as i64
    }
}

/// Rate limit check result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub remaining: u32,
    /// When the oldest counted hit leaves the window
    pub reset_at_ms: i64,
    /// Zero when allowed
    pub retry_after_ms: i64,
}

impl RateLimitResult {
    /// Whole seconds suitable for a `Retry-After` header (at least 1 when denied)
    pub fn retry_after_secs(&self) -> u64 {
        if self.allowed {
            return 0;
        }
        ((self.retry_after_ms.max(1) + 999) / 1000) as u64
    }
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("rate limit backend unavailable: {0}")]
    Backend(String),
}

/// Trait for rate limit storage backends
#[trait_variant::make(RateLimitStore: Send)]
pub trait LocalRateLimitStore {
    /// Record a hit for `key` if the window has room
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, RateLimitError>;
}

/// Process-local sliding-window limiter
pub struct SlidingWindowRateLimiter {
    hits: Mutex<HashMap<String, VecDeque<i64>>>,
    clock: SharedClock,
}

impl SlidingWindowRateLimiter {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            hits: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Drop hits older than `window` and forget keys left with none
    ///
    /// Returns the number of keys removed.
    pub async fn prune(&self, window: Duration) -> usize {
        let cutoff = self.clock.now_ms() - window.as_millis() as i64;
        let mut hits = self.hits.lock().await;
        let before = hits.len();
        hits.retain(|_, stamps| {
            evict_before(stamps, cutoff);
            !stamps.is_empty()
        });
        before - hits.len()
    }

    /// Number of keys currently tracked
    pub async fn tracked_keys(&self) -> usize {
        self.hits.lock().await.len()
    }
}

fn evict_before(stamps: &mut VecDeque<i64>, cutoff: i64) {
    while stamps.front().is_some_and(|&t| t <= cutoff) {
        stamps.pop_front();
    }
}

impl RateLimitStore for SlidingWindowRateLimiter {
    async fn check_and_increment(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, RateLimitError> {
        let now = self.clock.now_ms();
        let window_ms = config.window_ms();

        let mut hits = self.hits.lock().await;
        let stamps = hits.entry(key.to_string()).or_default();
        evict_before(stamps, now - window_ms);

        let used = stamps.len() as u32;
        if used < config.max_requests {
            stamps.push_back(now);
            let reset_at_ms = stamps.front().copied().unwrap_or(now) + window_ms;
            return Ok(RateLimitResult {
                allowed: true,
                remaining: config.max_requests - used - 1,
                reset_at_ms,
                retry_after_ms: 0,
            });
        }

        let reset_at_ms = stamps.front().copied().unwrap_or(now) + window_ms;
        Ok(RateLimitResult {
            allowed: false,
            remaining: 0,
            reset_at_ms,
            retry_after_ms: (reset_at_ms - now).max(0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{RateLimitConfig, RateLimitResult, RateLimitStore, SlidingWindowRateLimiter};
    use crate::clock::ManualClock;
    use std::time::Duration;
    use std::sync::Arc;

    fn limiter() -> (SlidingWindowRateLimiter, ManualClock) {
        let clock = ManualClock::new(1_000_000);
        (SlidingWindowRateLimiter::new(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_admits_up_to_max_then_denies() {
        let (limiter, _clock) = limiter();
        let config = RateLimitConfig::new(5, 60);

        for expected_remaining in (0..5).rev() {
            let result = limiter.check_and_increment("10.0.0.1", &config).await.unwrap();
            assert!(result.allowed);
            assert_eq!(result.remaining, expected_remaining);
        }

        let denied = limiter.check_and_increment("10.0.0.1", &config).await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_ms, 60_000);
        assert_eq!(denied.retry_after_secs(), 60);
    }

    #[tokio::test]
    async fn test_window_slides() {
        let (limiter, clock) = limiter();
        let config = RateLimitConfig::new(2, 60);

        limiter.check_and_increment("k", &config).await.unwrap();
        clock.advance(Duration::from_secs(30));
        limiter.check_and_increment("k", &config).await.unwrap();
        assert!(!limiter.check_and_increment("k", &config).await.unwrap().allowed);

        // first hit leaves the window
        clock.advance(Duration::from_secs(30));
        let result = limiter.check_and_increment("k", &config).await.unwrap();
        assert!(result.allowed);
        assert_eq!(result.remaining, 0);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let (limiter, _clock) = limiter();
        let config = RateLimitConfig::new(1, 60);

        assert!(limiter.check_and_increment("a", &config).await.unwrap().allowed);
        assert!(limiter.check_and_increment("b", &config).await.unwrap().allowed);
        assert!(!limiter.check_and_increment("a", &config).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_denied_hits_are_not_counted() {
        let (limiter, clock) = limiter();
        let config = RateLimitConfig::new(1, 10);

        limiter.check_and_increment("k", &config).await.unwrap();
        clock.advance(Duration::from_secs(5));
        limiter.check_and_increment("k", &config).await.unwrap();
        clock.advance(Duration::from_secs(5));

        assert!(limiter.check_and_increment("k", &config).await.unwrap().allowed);
    }

    #[tokio::test]
    async fn test_prune_forgets_idle_keys() {
        let (limiter, clock) = limiter();
        let config = RateLimitConfig::new(3, 60);

        limiter.check_and_increment("old", &config).await.unwrap();
        clock.advance(Duration::from_secs(45));
        limiter.check_and_increment("fresh", &config).await.unwrap();
        clock.advance(Duration::from_secs(20));

        assert_eq!(limiter.prune(config.window).await, 1);
        assert_eq!(limiter.tracked_keys().await, 1);
    }

    #[tokio::test]
    async fn test_limiter_usable_through_generic_store_bound() {
        async fn hit<S: RateLimitStore + Sync>(store: &S, key: &str) -> RateLimitResult {
            store
                .check_and_increment(key, &RateLimitConfig::new(1, 1))
                .await
                .unwrap()
        }

        let (limiter, _clock) = limiter();
        assert!(hit(&limiter, "k").await.allowed);

        let denied = hit(&limiter, "k").await;
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after_secs(), 1);
    }

    #[test]
    fn test_retry_after_secs_rounds_up() {
        let result = RateLimitResult {
            allowed: false,
            remaining: 0,
            reset_at_ms: 0,
            retry_after_ms: 1_001,
        };
        assert_eq!(result.retry_after_secs(), 2);
    }
}
