//! Shared-store sliding-window rate limiter.
//!
//! Each key is a sorted set of admission timestamps (milliseconds). Eviction,
//! counting and recording run inside one server-side script so concurrent
//! callers on different hosts cannot both take the last slot. Any store error
//! falls back to the in-process window for that call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Script;
use tracing::{debug, info, warn};

use crate::observability::metrics;
use crate::ratelimit::{InMemoryRateLimiter, RateDecision, RateLimiter};

/// Returns `{limited, remaining, reset_ms}`.
const SLIDING_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window = tonumber(ARGV[2])
local limit = tonumber(ARGV[3])
local member = ARGV[4]

redis.call('ZREMRANGEBYSCORE', key, '-inf', now - window)
local count = redis.call('ZCARD', key)

if count >= limit then
    local oldest = redis.call('ZRANGE', key, 0, 0, 'WITHSCORES')
    local reset = window
    if oldest[2] then
        reset = tonumber(oldest[2]) + window - now
    end
    return {1, 0, reset}
end

redis.call('ZADD', key, now, member)
redis.call('PEXPIRE', key, window)
return {0, limit - count - 1, window}
"#;

/// Upper bound on a single store round trip before falling back.
const STORE_CALL_TIMEOUT: Duration = Duration::from_millis(500);

pub struct RedisRateLimiter {
    conn: Option<ConnectionManager>,
    script: Script,
    fallback: InMemoryRateLimiter,
    fallbacks: AtomicU64,
    key_prefix: String,
}

impl RedisRateLimiter {
    /// Connect to the store at `url`.
    ///
    /// Never fails: when the store cannot be reached within `timeout` the
    /// limiter serves every request from the in-process window.
    pub async fn connect(url: &str, key_prefix: &str, timeout: Duration) -> Self {
        let conn = match Self::open(url, timeout).await {
            Ok(conn) => {
                info!("Rate limiter connected to shared store");
                Some(conn)
            }
            Err(e) => {
                warn!(error = %e, "Shared rate limit store unavailable, using in-process limiter");
                None
            }
        };

        Self {
            conn,
            script: Script::new(SLIDING_WINDOW_SCRIPT),
            fallback: InMemoryRateLimiter::new(),
            fallbacks: AtomicU64::new(0),
            key_prefix: key_prefix.to_string(),
        }
    }

    async fn open(url: &str, timeout: Duration) -> Result<ConnectionManager, String> {
        let client = redis::Client::open(url).map_err(|e| e.to_string())?;

        let mut conn = tokio::time::timeout(timeout, client.get_connection_manager())
            .await
            .map_err(|_| format!("connect timed out after {:?}", timeout))?
            .map_err(|e| e.to_string())?;

        let _: String = tokio::time::timeout(timeout, redis::cmd("PING").query_async(&mut conn))
            .await
            .map_err(|_| "ping timed out".to_string())?
            .map_err(|e| e.to_string())?;

        Ok(conn)
    }

    /// Whether calls go to the shared store.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    fn build_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }

    async fn check_store(
        &self,
        conn: &ConnectionManager,
        key: &str,
        max_requests: u32,
        window_secs: u64,
    ) -> Result<RateDecision, String> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| e.to_string())?;
        let now_ms = now.as_millis() as i64;
        let window_ms = window_secs.saturating_mul(1000) as i64;
        let member = format!("{}-{}", now.as_micros(), fastrand::u32(..));

        let mut conn = conn.clone();
        let mut invocation = self.script.key(self.build_key(key));
        invocation
            .arg(now_ms)
            .arg(window_ms)
            .arg(max_requests)
            .arg(member);

        let reply: (i64, i64, i64) =
            tokio::time::timeout(STORE_CALL_TIMEOUT, invocation.invoke_async(&mut conn))
                .await
                .map_err(|_| "store call timed out".to_string())?
                .map_err(|e| e.to_string())?;

        Ok(decision_from_reply(reply))
    }

    /// Calls answered by the in-process window after a store error.
    pub fn fallback_count(&self) -> u64 {
        self.fallbacks.load(Ordering::Relaxed)
    }
}

/// Map a script reply `{limited, remaining, reset_ms}` to a decision.
/// The reset is truncated to whole seconds.
fn decision_from_reply((limited, remaining, reset_ms): (i64, i64, i64)) -> RateDecision {
    let reset_secs = (reset_ms.max(0) as u64) / 1000;
    if limited != 0 {
        RateDecision::denied(reset_secs)
    } else {
        RateDecision::allowed(u32::try_from(remaining.max(0)).unwrap_or(u32::MAX), reset_secs)
    }
}

#[async_trait]
impl RateLimiter for RedisRateLimiter {
    async fn is_rate_limited(&self, key: &str, max_requests: u32, window_secs: u64) -> RateDecision {
        let Some(conn) = &self.conn else {
            return self.fallback.is_rate_limited(key, max_requests, window_secs).await;
        };

        match self.check_store(conn, key, max_requests, window_secs).await {
            Ok(decision) => {
                debug!(key, limited = decision.limited, remaining = decision.remaining, "Store decision");
                decision
            }
            Err(e) => {
                warn!(key, error = %e, "Rate limit store call failed, falling back");
                metrics::record_store_fallback();
                self.fallbacks.fetch_add(1, Ordering::Relaxed);
                self.fallback.is_rate_limited(key, max_requests, window_secs).await
            }
        }
    }
}
