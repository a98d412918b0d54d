//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and that every
//! limit string parses. All errors are collected, not just the first.

use std::fmt;

use crate::config::schema::AppConfig;
use crate::ratelimit::parse_rate_limit;

/// A single semantic problem found in the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a loaded configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let worker = &config.worker;
    if !(worker.idle_interval_secs >= 0.0 && worker.idle_interval_secs.is_finite()) {
        errors.push(ValidationError::new("worker.idle_interval_secs", "must be a finite value >= 0"));
    }
    if !(worker.active_interval_secs >= 0.0 && worker.active_interval_secs.is_finite()) {
        errors.push(ValidationError::new("worker.active_interval_secs", "must be a finite value >= 0"));
    }
    if worker.max_retries == 0 {
        errors.push(ValidationError::new("worker.max_retries", "must be at least 1"));
    }

    let backoff = &config.backoff;
    if !(backoff.min_delay_secs >= 0.0 && backoff.min_delay_secs.is_finite()) {
        errors.push(ValidationError::new("backoff.min_delay_secs", "must be a finite value >= 0"));
    }
    if !backoff.max_delay_secs.is_finite() || backoff.max_delay_secs < backoff.min_delay_secs {
        errors.push(ValidationError::new("backoff.max_delay_secs", "must be >= min_delay_secs"));
    }
    if !(backoff.multiplier >= 1.0 && backoff.multiplier.is_finite()) {
        errors.push(ValidationError::new("backoff.multiplier", "must be >= 1.0"));
    }
    if !(0.0..=1.0).contains(&backoff.jitter) {
        errors.push(ValidationError::new("backoff.jitter", "must be within [0, 1]"));
    }

    if let Err(e) = parse_rate_limit(&config.rate_limit.default_limit) {
        errors.push(ValidationError::new("rate_limit.default_limit", e.to_string()));
    }
    let mut paths: Vec<_> = config.rate_limit.endpoint_limits.iter().collect();
    paths.sort();
    for (path, limit) in paths {
        if let Err(e) = parse_rate_limit(limit) {
            errors.push(ValidationError::new(format!("rate_limit.endpoint_limits.{}", path), e.to_string()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn collects_every_error() {
        let mut config = AppConfig::default();
        config.worker.max_retries = 0;
        config.backoff.min_delay_secs = 10.0;
        config.backoff.max_delay_secs = 1.0;
        config.backoff.jitter = 1.5;
        config.rate_limit.default_limit = "lots/minute".to_string();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "worker.max_retries",
                "backoff.max_delay_secs",
                "backoff.jitter",
                "rate_limit.default_limit",
            ]
        );
    }

    #[test]
    fn rejects_bad_endpoint_override() {
        let mut config = AppConfig::default();
        config
            .rate_limit
            .endpoint_limits
            .insert("/upload".to_string(), "/minute".to_string());

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field, "rate_limit.endpoint_limits./upload");
    }
}
