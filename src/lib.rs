//! Operational resilience core library

pub mod config;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod ratelimit;
pub mod resilience;

pub use config::AppConfig;
pub use health::HealthHandle;
pub use lifecycle::{BatchProcessor, Shutdown, WorkerLifecycle};
pub use ratelimit::RateLimiter;
pub use resilience::{BackoffCalculator, CircuitBreaker, RetryExecutor};
