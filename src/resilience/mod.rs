//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Call to an unreliable dependency:
//!     → circuit_breaker.rs (fail fast while the dependency is assumed down)
//!     → retries.rs (retry retryable failures)
//!         → backoff.rs (jittered exponential delay between attempts)
//!     → report success/failure back to the breaker
//! ```
//!
//! # Design Decisions
//! - Primitives are independent; callers compose them per dependency
//! - Backoff state lives per retry session, breaker state per dependency
//! - The worker loop reuses `BackoffPolicy` for its error escalation

pub mod backoff;
pub mod circuit_breaker;
pub mod retries;

pub use backoff::{BackoffCalculator, BackoffError, BackoffPolicy};
pub use circuit_breaker::{CallError, CircuitBreaker, CircuitBreakerConfig, CircuitState, SharedCircuitBreaker};
pub use retries::RetryExecutor;
