//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for workers and
//! the request-admission layer. All types derive Serde traits for
//! deserialization from config files.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Background worker loop settings.
    pub worker: WorkerConfig,

    /// Backoff delays for retries and worker error escalation.
    pub backoff: BackoffConfig,

    /// Request admission (rate limiting) settings.
    pub rate_limit: RateLimitConfig,

    /// Health probe server settings.
    pub health: HealthConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Worker run loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Worker name used in logs and the health record.
    pub name: String,

    /// Sleep between iterations when the last batch found no work.
    pub idle_interval_secs: f64,

    /// Sleep between iterations when the last batch processed items.
    pub active_interval_secs: f64,

    /// Consecutive batch failures before the worker stops itself.
    pub max_retries: u32,

    /// Port for the health probe server (disabled when unset).
    pub health_port: Option<u16>,
}

impl WorkerConfig {
    pub fn idle_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.idle_interval_secs).unwrap_or_default()
    }

    pub fn active_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.active_interval_secs).unwrap_or_default()
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name: "example".to_string(),
            idle_interval_secs: 30.0,
            active_interval_secs: 1.0,
            max_retries: 5,
            health_port: None,
        }
    }
}

/// Exponential backoff configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Delay for the first attempt in seconds.
    pub min_delay_secs: f64,

    /// Upper bound for any computed delay in seconds.
    pub max_delay_secs: f64,

    /// Growth factor applied per attempt.
    pub multiplier: f64,

    /// Fraction of the delay used as the +/- jitter range (0.1 = 10%).
    pub jitter: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            min_delay_secs: 1.0,
            max_delay_secs: 60.0,
            multiplier: 2.0,
            jitter: 0.1,
        }
    }
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Enable rate limiting.
    pub enabled: bool,

    /// Limit applied to paths without an override, e.g. "100/minute".
    pub default_limit: String,

    /// Shared counter store URL. In-process limiting is used when unset.
    pub redis_url: Option<String>,

    /// Prefix for keys written to the shared store.
    pub key_prefix: String,

    /// Per-path limits that take precedence over `default_limit`.
    pub endpoint_limits: HashMap<String, String>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        let mut endpoint_limits = HashMap::new();
        endpoint_limits.insert("/api/v1/auth/login".to_string(), "10/minute".to_string());
        endpoint_limits.insert("/api/v1/auth/register".to_string(), "5/minute".to_string());

        Self {
            enabled: true,
            default_limit: "100/minute".to_string(),
            redis_url: None,
            key_prefix: "rl".to_string(),
            endpoint_limits,
        }
    }
}

/// Health probe server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Interface the probe server binds to.
    pub bind_host: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "text" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
