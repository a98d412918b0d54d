//! Circuit breaker for downstream protection.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: dependency assumed down, calls fail fast
//! - Half-Open: a limited number of trial calls test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_count >= failure_threshold
//! Open → Half-Open: recovery_timeout elapsed since last failure (checked lazily)
//! Half-Open → Closed: half_open_max_calls consecutive successes
//! Half-Open → Open: any failure
//! ```
//!
//! `CircuitBreaker` is plain state with `&mut self` methods. Share one
//! between tasks through `SharedCircuitBreaker`.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::observability::metrics;

/// Circuit state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Breaker thresholds.
#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Failures in Closed before the circuit opens.
    pub failure_threshold: u32,
    /// Time after the last failure before a trial is allowed.
    pub recovery_timeout: Duration,
    /// Trial calls (and successes needed to close) in Half-Open.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
            half_open_max_calls: 3,
        }
    }
}

#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    half_open_calls: u32,
    last_failure: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            half_open_calls: 0,
            last_failure: None,
        }
    }

    /// Current state, promoting Open to Half-Open if the timeout elapsed.
    pub fn state(&mut self) -> CircuitState {
        self.update_state(Instant::now());
        self.state
    }

    pub fn is_open(&mut self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Whether a call may be attempted now. In Half-Open each `true`
    /// consumes one trial slot.
    pub fn allow_request(&mut self) -> bool {
        self.update_state(Instant::now());
        match self.state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => {
                if self.half_open_calls < self.config.half_open_max_calls {
                    self.half_open_calls += 1;
                    true
                } else {
                    false
                }
            }
            CircuitState::Open => false,
        }
    }

    pub fn record_success(&mut self) {
        match self.state {
            CircuitState::HalfOpen => {
                self.success_count += 1;
                if self.success_count >= self.config.half_open_max_calls {
                    self.transition(CircuitState::Closed);
                    self.failure_count = 0;
                    self.success_count = 0;
                }
            }
            CircuitState::Closed => {
                self.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&mut self) {
        self.failure_count = self.failure_count.saturating_add(1);
        self.last_failure = Some(Instant::now());

        match self.state {
            CircuitState::HalfOpen => {
                self.transition(CircuitState::Open);
                self.success_count = 0;
            }
            CircuitState::Closed if self.failure_count >= self.config.failure_threshold => {
                self.transition(CircuitState::Open);
            }
            _ => {}
        }
    }

    /// Force the breaker back to Closed and clear all counters.
    pub fn reset(&mut self) {
        if self.state != CircuitState::Closed {
            self.transition(CircuitState::Closed);
        }
        self.failure_count = 0;
        self.success_count = 0;
        self.half_open_calls = 0;
        self.last_failure = None;
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn update_state(&mut self, now: Instant) {
        if self.state != CircuitState::Open {
            return;
        }
        if let Some(last_failure) = self.last_failure {
            if now.saturating_duration_since(last_failure) >= self.config.recovery_timeout {
                self.transition(CircuitState::HalfOpen);
                self.half_open_calls = 0;
                self.success_count = 0;
            }
        }
    }

    fn transition(&mut self, to: CircuitState) {
        tracing::info!(
            breaker = %self.name,
            from = self.state.as_str(),
            to = to.as_str(),
            failures = self.failure_count,
            "Circuit breaker state change"
        );
        metrics::record_circuit_transition(&self.name, to.as_str());
        self.state = to;
    }
}

/// Error returned by [`SharedCircuitBreaker::call`].
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The breaker did not admit the call.
    #[error("circuit breaker is open")]
    Open,
    /// The call was attempted and failed.
    #[error("{0}")]
    Inner(E),
}

/// A circuit breaker shared across tasks.
#[derive(Debug, Clone)]
pub struct SharedCircuitBreaker {
    inner: Arc<Mutex<CircuitBreaker>>,
}

impl SharedCircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CircuitBreaker::new(name, config))),
        }
    }

    /// Run `op` if admitted, reporting its outcome to the breaker.
    pub async fn call<F, Fut, T, E>(&self, op: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.with(|cb| cb.allow_request()) {
            return Err(CallError::Open);
        }

        match op().await {
            Ok(value) => {
                self.with(|cb| cb.record_success());
                Ok(value)
            }
            Err(e) => {
                self.with(|cb| cb.record_failure());
                Err(CallError::Inner(e))
            }
        }
    }

    pub fn state(&self) -> CircuitState {
        self.with(|cb| cb.state())
    }

    pub fn allow_request(&self) -> bool {
        self.with(|cb| cb.allow_request())
    }

    pub fn record_success(&self) {
        self.with(|cb| cb.record_success())
    }

    pub fn record_failure(&self) {
        self.with(|cb| cb.record_failure())
    }

    pub fn reset(&self) {
        self.with(|cb| cb.reset())
    }

    fn with<R>(&self, f: impl FnOnce(&mut CircuitBreaker) -> R) -> R {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
