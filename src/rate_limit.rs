use crate::error::ScrapeError;
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_RATE_LIMIT: u32 = 10;
pub const DEFAULT_RATE_WINDOW: Duration = Duration::from_secs(60);

/// Outcome of one check-and-increment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Time until the oldest request leaves the window. Zero when allowed.
    pub retry_after: Duration,
}

/// Per-key request limiter. `check` both tests and records the request.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    async fn check(&self, key: &str) -> Result<RateDecision, ScrapeError>;
}

/// In-memory sliding window. Each key keeps the timestamps of its accepted requests.
#[derive(Clone)]
pub struct SlidingWindowLimiter {
    limit: u32,
    window: Duration,
    hits: Arc<DashMap<String, VecDeque<Instant>>>,
}

impl Default for SlidingWindowLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT, DEFAULT_RATE_WINDOW)
    }
}

impl SlidingWindowLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            hits: Arc::new(DashMap::new()),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Drops keys whose windows are empty.
    pub fn purge_idle(&self) {
        let now = Instant::now();
        let window = self.window;
        self.hits.retain(|_, stamps| {
            stamps
                .back()
                .map_or(false, |last| now.duration_since(*last) < window)
        });
    }

    fn check_at(&self, key: &str, now: Instant) -> RateDecision {
        // The entry guard holds the shard lock, making check and record atomic per key.
        let mut stamps = self.hits.entry(key.to_string()).or_default();
        while let Some(oldest) = stamps.front() {
            if now.duration_since(*oldest) >= self.window {
                stamps.pop_front();
            } else {
                break;
            }
        }

        let used = stamps.len() as u32;
        if used >= self.limit {
            let retry_after = stamps
                .front()
                .map(|oldest| self.window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(self.window);
            debug!(key = %key, used, limit = self.limit, "Rate limit reached");
            return RateDecision {
                allowed: false,
                remaining: 0,
                retry_after,
            };
        }

        stamps.push_back(now);
        RateDecision {
            allowed: true,
            remaining: self.limit - used - 1,
            retry_after: Duration::ZERO,
        }
    }
}

#[async_trait]
impl RateLimiter for SlidingWindowLimiter {
    async fn check(&self, key: &str) -> Result<RateDecision, ScrapeError> {
        Ok(self.check_at(key, Instant::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_sliding_window() {
        let limiter = SlidingWindowLimiter::new(3, Duration::from_secs(60));

        for expected_remaining in [2, 1, 0] {
            let decision = limiter.check("user:1").await.unwrap();
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = limiter.check("user:1").await.unwrap();
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, Duration::from_secs(60));

        // other identities have their own window
        assert!(limiter.check("ip:10.1.1.1").await.unwrap().allowed);

        tokio::time::advance(Duration::from_secs(20)).await;
        let denied = limiter.check("user:1").await.unwrap();
        assert_eq!(denied.retry_after, Duration::from_secs(40));

        tokio::time::advance(Duration::from_secs(40)).await;
        assert!(limiter.check("user:1").await.unwrap().allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_denied_requests_do_not_extend_window() {
        let limiter = SlidingWindowLimiter::new(1, Duration::from_secs(10));
        assert!(limiter.check("k").await.unwrap().allowed);
        for _ in 0..5 {
            assert!(!limiter.check("k").await.unwrap().allowed);
        }
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(limiter.check("k").await.unwrap().allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_idle() {
        let limiter = SlidingWindowLimiter::new(5, Duration::from_secs(10));
        limiter.check("a").await.unwrap();
        tokio::time::advance(Duration::from_secs(11)).await;
        limiter.check("b").await.unwrap();

        limiter.purge_idle();
        assert_eq!(limiter.hits.len(), 1);
        assert!(limiter.hits.contains_key("b"));
    }
}
