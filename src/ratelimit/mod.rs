//! Request admission (sliding-window rate limiting).
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → middleware.rs (build key "<subject-or-ip>:<path>", pick limit)
//!     → RateLimiter::is_rate_limited
//!         → distributed.rs (shared store, atomic script)
//!         → memory.rs (in-process window; also the fallback)
//!     → 429 with Retry-After, or pass through with X-RateLimit-* headers
//! ```
//!
//! # Design Decisions
//! - Both limiters record only admitted requests; a denied request never
//!   consumes a slot
//! - Store failures are recovered locally and never reach the client
//! - Per-path limits override the global default

pub mod distributed;
pub mod memory;
pub mod middleware;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::RateLimitConfig;

pub use distributed::RedisRateLimiter;
pub use memory::InMemoryRateLimiter;
pub use middleware::{rate_limit_middleware, AuthenticatedSubject, RateLimitState};

/// Window used when a limit string names an unknown unit.
pub const DEFAULT_WINDOW_SECS: u64 = 60;

/// How long to wait for the shared store before falling back.
pub const STORE_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("invalid rate limit {0:?}: expected <count>/<unit>")]
    InvalidLimit(String),
}

/// A parsed `<count>/<unit>` limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub max_requests: u32,
    pub window_secs: u64,
}

/// Parse a limit string such as `"100/minute"`.
///
/// A missing unit means `minute`; an unrecognized unit means a 60 second
/// window.
pub fn parse_rate_limit(value: &str) -> Result<RateLimit, RateLimitError> {
    let mut parts = value.trim().splitn(2, '/');
    let max_requests = parts
        .next()
        .map(str::trim)
        .and_then(|count| count.parse::<u32>().ok())
        .ok_or_else(|| RateLimitError::InvalidLimit(value.to_string()))?;

    let unit = parts.next().map(|u| u.trim().to_lowercase());
    let window_secs = match unit.as_deref() {
        Some("second") => 1,
        Some("minute") | None => 60,
        Some("hour") => 3600,
        Some("day") => 86400,
        Some(_) => DEFAULT_WINDOW_SECS,
    };

    Ok(RateLimit {
        max_requests,
        window_secs,
    })
}

/// Outcome of one admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub limited: bool,
    pub remaining: u32,
    pub reset_secs: u64,
}

impl RateDecision {
    pub fn allowed(remaining: u32, reset_secs: u64) -> Self {
        Self {
            limited: false,
            remaining,
            reset_secs,
        }
    }

    pub fn denied(reset_secs: u64) -> Self {
        Self {
            limited: true,
            remaining: 0,
            reset_secs,
        }
    }
}

/// Sliding-window admission contract.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Decide whether one more request for `key` fits within
    /// `max_requests` per `window_secs`, recording it if admitted.
    async fn is_rate_limited(&self, key: &str, max_requests: u32, window_secs: u64) -> RateDecision;
}

/// Default limit plus per-path overrides.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    default: RateLimit,
    endpoints: HashMap<String, RateLimit>,
}

impl RateLimitPolicy {
    pub fn new(default: RateLimit) -> Self {
        Self {
            default,
            endpoints: HashMap::new(),
        }
    }

    pub fn from_config(config: &RateLimitConfig) -> Result<Self, RateLimitError> {
        let mut policy = Self::new(parse_rate_limit(&config.default_limit)?);
        for (path, limit) in &config.endpoint_limits {
            policy.endpoints.insert(path.clone(), parse_rate_limit(limit)?);
        }
        Ok(policy)
    }

    pub fn with_endpoint(mut self, path: impl Into<String>, limit: RateLimit) -> Self {
        self.endpoints.insert(path.into(), limit);
        self
    }

    /// Limit for an exact request path.
    pub fn limit_for(&self, path: &str) -> RateLimit {
        self.endpoints.get(path).copied().unwrap_or(self.default)
    }
}

/// Build the limiter named by the configuration: the shared store when a
/// URL is set, the in-process window otherwise.
pub async fn build_limiter(config: &RateLimitConfig) -> Arc<dyn RateLimiter> {
    match &config.redis_url {
        Some(url) => Arc::new(RedisRateLimiter::connect(url, &config.key_prefix, STORE_CONNECT_TIMEOUT).await),
        None => {
            tracing::info!("Using in-process rate limiter");
            Arc::new(InMemoryRateLimiter::new())
        }
    }
}
