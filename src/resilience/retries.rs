//! Retry execution.
//!
//! # Responsibilities
//! - Decide whether a failure is retryable
//! - Sleep a fresh backoff between attempts
//! - Surface the last failure unchanged once the ceiling is reached
//!
//! With `max_retries = n` an operation is called at most `n + 1` times and
//! there is no sleep after the final attempt.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::observability::metrics;
use crate::resilience::backoff::{BackoffCalculator, BackoffPolicy};

type RetryPredicate<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;
type RetryObserver<E> = Arc<dyn Fn(&E, u32, Duration) + Send + Sync>;

/// Wraps fallible async operations with backoff-driven retries.
pub struct RetryExecutor<E> {
    name: String,
    policy: BackoffPolicy,
    retryable: RetryPredicate<E>,
    observer: Option<RetryObserver<E>>,
}

impl<E> Clone for RetryExecutor<E> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            policy: self.policy.clone(),
            retryable: Arc::clone(&self.retryable),
            observer: self.observer.clone(),
        }
    }
}

impl<E> RetryExecutor<E> {
    /// Retry every failure according to `policy`.
    pub fn new(name: impl Into<String>, policy: BackoffPolicy) -> Self {
        Self {
            name: name.into(),
            policy,
            retryable: Arc::new(|_| true),
            observer: None,
        }
    }

    /// Only retry failures for which `predicate` returns true.
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.retryable = Arc::new(predicate);
        self
    }

    /// Call `observer(error, attempt, delay)` before each sleep.
    pub fn on_retry<O>(mut self, observer: O) -> Self
    where
        O: Fn(&E, u32, Duration) + Send + Sync + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}

impl<E: Display> RetryExecutor<E> {
    /// Run `op`, retrying retryable failures until it succeeds or the
    /// backoff ceiling is reached.
    pub async fn run<F, Fut, T>(&self, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut backoff = BackoffCalculator::new(self.policy.clone());

        loop {
            let error = match op().await {
                Ok(value) => {
                    if backoff.attempt() > 0 {
                        tracing::debug!(
                            operation = %self.name,
                            attempts = backoff.attempt() + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(value);
                }
                Err(e) => e,
            };

            if !(self.retryable)(&error) {
                tracing::debug!(operation = %self.name, error = %error, "Non-retryable failure");
                return Err(error);
            }

            let delay = match backoff.next_delay() {
                Ok(delay) => delay,
                Err(exhausted) => {
                    tracing::error!(
                        operation = %self.name,
                        attempts = backoff.attempt() + 1,
                        error = %error,
                        reason = %exhausted,
                        "Operation failed, giving up"
                    );
                    return Err(error);
                }
            };

            if let Some(observer) = &self.observer {
                observer(&error, backoff.attempt(), delay);
            }
            metrics::record_retry(&self.name);
            tracing::warn!(
                operation = %self.name,
                attempt = backoff.attempt(),
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Operation failed, retrying"
            );

            tokio::time::sleep(delay).await;
        }
    }
}
