//! Exponential backoff with jitter.
//!
//! `delay(attempt) = min(min_delay * multiplier^attempt, max_delay)`, then
//! perturbed by up to `±jitter * delay` and clamped to `[0, max_delay]`.

use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use crate::config::BackoffConfig;

/// Exponent cap used by the worker's error escalation.
pub const WORKER_EXPONENT_CAP: u32 = 10;

/// Errors produced by the backoff calculator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackoffError {
    /// The configured retry ceiling has already been reached.
    #[error("Maximum retries ({max_retries}) exceeded")]
    RetriesExhausted { max_retries: u32 },
}

/// Immutable backoff parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of the delay used as the jitter range.
    pub jitter: f64,
    /// Retry ceiling; unlimited when `None`.
    pub max_retries: Option<u32>,
}

impl BackoffPolicy {
    /// Build a policy from configuration with the given retry ceiling.
    pub fn from_config(config: &BackoffConfig, max_retries: Option<u32>) -> Self {
        Self {
            min_delay: secs(config.min_delay_secs),
            max_delay: secs(config.max_delay_secs),
            multiplier: config.multiplier,
            jitter: config.jitter,
            max_retries,
        }
    }

    /// Policy used for worker error escalation: doubling, no jitter, no
    /// ceiling (the worker enforces its own).
    pub fn worker(config: &BackoffConfig) -> Self {
        Self {
            min_delay: secs(config.min_delay_secs),
            max_delay: secs(config.max_delay_secs),
            multiplier: 2.0,
            jitter: 0.0,
            max_retries: None,
        }
    }

    /// Delay for `attempt` before jitter is applied.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let min = self.min_delay.as_secs_f64();
        let max = self.max_delay.as_secs_f64();
        if min == 0.0 {
            return Duration::ZERO;
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay = (min * self.multiplier.powi(exponent)).min(max);
        Duration::try_from_secs_f64(delay).unwrap_or(self.max_delay)
    }

    /// Delay for `attempt` with jitter applied.
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.base_delay(attempt);
        if self.jitter <= 0.0 || base.is_zero() {
            return base;
        }

        let base_secs = base.as_secs_f64();
        let range = base_secs * self.jitter;
        let jittered = base_secs + rand::thread_rng().gen_range(-range..=range);
        let clamped = jittered.clamp(0.0, self.max_delay.as_secs_f64());
        Duration::try_from_secs_f64(clamped).unwrap_or(base)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from_config(&BackoffConfig::default(), None)
    }
}

fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or_default()
}

/// Stateful backoff calculator for a single retry session.
#[derive(Debug, Clone)]
pub struct BackoffCalculator {
    policy: BackoffPolicy,
    attempt: u32,
    total_delay: Duration,
}

impl BackoffCalculator {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            total_delay: Duration::ZERO,
        }
    }

    /// Return the next delay and advance the attempt counter.
    pub fn next_delay(&mut self) -> Result<Duration, BackoffError> {
        if let Some(max_retries) = self.policy.max_retries {
            if self.attempt >= max_retries {
                return Err(BackoffError::RetriesExhausted { max_retries });
            }
        }

        let delay = self.policy.delay(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        self.total_delay = self.total_delay.saturating_add(delay);
        Ok(delay)
    }

    /// Compute the delay the next call would return without advancing.
    pub fn peek_delay(&self) -> Duration {
        self.policy.delay(self.attempt)
    }

    /// Take the next delay and sleep for it.
    pub async fn wait(&mut self) -> Result<Duration, BackoffError> {
        let delay = self.next_delay()?;
        tokio::time::sleep(delay).await;
        Ok(delay)
    }

    /// Whether another `next_delay` call would succeed.
    pub fn can_retry(&self) -> bool {
        match self.policy.max_retries {
            Some(max_retries) => self.attempt < max_retries,
            None => true,
        }
    }

    /// Zero the attempt and cumulative-delay counters.
    pub fn reset(&mut self) {
        self.attempt = 0;
        self.total_delay = Duration::ZERO;
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn total_delay(&self) -> Duration {
        self.total_delay
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(min: u64, max: u64, multiplier: f64, jitter: f64, max_retries: Option<u32>) -> BackoffPolicy {
        BackoffPolicy {
            min_delay: Duration::from_secs(min),
            max_delay: Duration::from_secs(max),
            multiplier,
            jitter,
            max_retries,
        }
    }

    #[test]
    fn delay_without_jitter_is_exact() {
        let p = policy(1, 60, 2.0, 0.0, None);
        let expected = [1, 2, 4, 8, 16, 32, 60, 60];
        for (attempt, secs) in expected.iter().enumerate() {
            assert_eq!(p.delay(attempt as u32), Duration::from_secs(*secs), "attempt {}", attempt);
        }

        let p = policy(2, 100, 3.0, 0.0, None);
        assert_eq!(p.delay(0), Duration::from_secs(2));
        assert_eq!(p.delay(2), Duration::from_secs(18));
        assert_eq!(p.delay(4), Duration::from_secs(100));
    }

    #[test]
    fn huge_attempt_saturates_at_max() {
        let p = policy(1, 60, 2.0, 0.0, None);
        assert_eq!(p.delay(u32::MAX), Duration::from_secs(60));

        let zero = policy(0, 60, 2.0, 0.0, None);
        assert_eq!(zero.delay(5000), Duration::ZERO);
    }

    #[test]
    fn jitter_stays_within_bounds() {
        let p = policy(10, 15, 2.0, 0.5, None);
        for _ in 0..200 {
            let d0 = p.delay(0);
            assert!(d0 >= Duration::from_secs(5) && d0 <= Duration::from_secs(15));
            let d5 = p.delay(5);
            assert!(d5 <= Duration::from_secs(15));
        }
    }

    #[test]
    fn ceiling_is_enforced() {
        let mut calc = BackoffCalculator::new(policy(1, 60, 2.0, 0.0, Some(3)));
        for _ in 0..3 {
            assert!(calc.can_retry());
            calc.next_delay().unwrap();
        }
        assert!(!calc.can_retry());
        assert_eq!(calc.next_delay(), Err(BackoffError::RetriesExhausted { max_retries: 3 }));
        assert_eq!(calc.attempt(), 3);
        assert_eq!(calc.total_delay(), Duration::from_secs(1 + 2 + 4));

        calc.reset();
        assert_eq!(calc.attempt(), 0);
        assert_eq!(calc.total_delay(), Duration::ZERO);
        assert_eq!(calc.next_delay(), Ok(Duration::from_secs(1)));
    }

    #[test]
    fn peek_does_not_advance() {
        let mut calc = BackoffCalculator::new(policy(1, 60, 2.0, 0.0, None));
        calc.next_delay().unwrap();
        assert_eq!(calc.peek_delay(), Duration::from_secs(2));
        assert_eq!(calc.peek_delay(), Duration::from_secs(2));
        assert_eq!(calc.attempt(), 1);
        assert!(calc.can_retry());
    }

    #[test]
    fn worker_policy_doubles_without_jitter() {
        let config = BackoffConfig {
            min_delay_secs: 1.0,
            max_delay_secs: 60.0,
            multiplier: 5.0,
            jitter: 0.3,
        };
        let p = BackoffPolicy::worker(&config);
        assert_eq!(p.delay(1), Duration::from_secs(2));
        assert_eq!(p.delay(3), Duration::from_secs(8));
        assert_eq!(p.delay(WORKER_EXPONENT_CAP), Duration::from_secs(60));
    }

    #[test]
    fn error_display() {
        let err = BackoffError::RetriesExhausted { max_retries: 4 };
        assert_eq!(err.to_string(), "Maximum retries (4) exceeded");
    }
}
