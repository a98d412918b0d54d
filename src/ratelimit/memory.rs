//! In-process sliding-window rate limiter.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::ratelimit::{RateDecision, RateLimiter};

/// Sliding window of admission timestamps per key.
///
/// The evict/count/append sequence for a key runs while holding that key's
/// map entry, so concurrent callers for one key are serialized.
#[derive(Debug, Default)]
pub struct InMemoryRateLimiter {
    windows: DashMap<String, VecDeque<Instant>>,
}

impl InMemoryRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admission check evaluated at `now`.
    pub fn check_at(&self, key: &str, max_requests: u32, window_secs: u64, now: Instant) -> RateDecision {
        let window = Duration::from_secs(window_secs);
        let mut timestamps = self.windows.entry(key.to_string()).or_default();

        while let Some(&oldest) = timestamps.front() {
            if now.saturating_duration_since(oldest) >= window {
                timestamps.pop_front();
            } else {
                break;
            }
        }

        let count = u32::try_from(timestamps.len()).unwrap_or(u32::MAX);
        if count >= max_requests {
            let reset_secs = timestamps
                .front()
                .map(|&oldest| (oldest + window).saturating_duration_since(now).as_secs())
                .unwrap_or(window_secs);
            return RateDecision::denied(reset_secs);
        }

        timestamps.push_back(now);
        RateDecision::allowed(max_requests - count - 1, window_secs)
    }

    /// Number of keys that have been seen.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }
}

#[async_trait]
impl RateLimiter for InMemoryRateLimiter {
    async fn is_rate_limited(&self, key: &str, max_requests: u32, window_secs: u64) -> RateDecision {
        self.check_at(key, max_requests, window_secs, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn remaining_counts_down_then_denies() {
        let limiter = InMemoryRateLimiter::new();
        let now = Instant::now();

        let remaining: Vec<u32> = (0..5)
            .map(|_| {
                let decision = limiter.check_at("client:/items", 5, 60, now);
                assert!(!decision.limited);
                assert_eq!(decision.reset_secs, 60);
                decision.remaining
            })
            .collect();
        assert_eq!(remaining, vec![4, 3, 2, 1, 0]);

        let denied = limiter.check_at("client:/items", 5, 60, now + Duration::from_secs(10));
        assert_eq!(denied, RateDecision::denied(50));
    }

    #[test]
    fn denied_requests_are_not_recorded() {
        let limiter = InMemoryRateLimiter::new();
        let start = Instant::now();
        limiter.check_at("k", 1, 10, start);

        for offset in 1..5 {
            assert!(limiter.check_at("k", 1, 10, start + Duration::from_secs(offset)).limited);
        }

        // Only the first admission occupies the window.
        let after = limiter.check_at("k", 1, 10, start + Duration::from_secs(10));
        assert!(!after.limited);
    }

    #[test]
    fn window_expiry_readmits() {
        let limiter = InMemoryRateLimiter::new();
        let start = Instant::now();
        for _ in 0..5 {
            limiter.check_at("k", 5, 60, start);
        }
        assert!(limiter.check_at("k", 5, 60, start + Duration::from_secs(59)).limited);

        let later = limiter.check_at("k", 5, 60, start + Duration::from_secs(60));
        assert_eq!(later, RateDecision::allowed(4, 60));
    }

    #[test]
    fn keys_are_independent() {
        let limiter = InMemoryRateLimiter::new();
        let now = Instant::now();
        for _ in 0..5 {
            limiter.check_at("a", 5, 60, now);
        }
        assert!(limiter.check_at("a", 5, 60, now).limited);
        assert_eq!(limiter.check_at("b", 5, 60, now), RateDecision::allowed(4, 60));
        assert_eq!(limiter.tracked_keys(), 2);
    }

    #[test]
    fn zero_limit_always_denies() {
        let limiter = InMemoryRateLimiter::new();
        assert_eq!(limiter.check_at("k", 0, 30, Instant::now()), RateDecision::denied(30));
    }

    #[tokio::test]
    async fn concurrent_callers_never_over_admit() {
        let limiter = Arc::new(InMemoryRateLimiter::new());
        let mut handles = Vec::new();
        for _ in 0..64 {
            let limiter = Arc::clone(&limiter);
            handles.push(tokio::spawn(async move {
                limiter.is_rate_limited("shared", 10, 60).await
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if !handle.await.unwrap().limited {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 10);
    }
}
