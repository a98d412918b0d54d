//! Shared health record.
//!
//! # States
//! - Healthy: probes answer 200
//! - Unhealthy: probes answer 503
//!
//! The record starts unhealthy with no details until the worker publishes.

use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;
use serde_json::{Map, Value};

/// Snapshot served as the probe response body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub details: Map<String, Value>,
}

/// Cloneable handle to the process health record.
#[derive(Debug, Clone, Default)]
pub struct HealthHandle {
    inner: Arc<RwLock<HealthStatus>>,
}

impl HealthHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark healthy, merging `details` into the existing ones.
    pub fn set_healthy(&self, details: Map<String, Value>) {
        let mut status = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        status.healthy = true;
        status.details.extend(details);
    }

    /// Mark unhealthy and record `reason` alongside the existing details.
    pub fn set_unhealthy(&self, reason: impl Into<String>) {
        let reason = reason.into();
        tracing::warn!(reason = %reason, "Health status set to unhealthy");

        let mut status = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        status.healthy = false;
        status.details.insert("reason".to_string(), Value::String(reason));
    }

    pub fn is_healthy(&self) -> bool {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).healthy
    }

    pub fn snapshot(&self) -> HealthStatus {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}
