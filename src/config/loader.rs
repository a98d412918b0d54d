//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::AppConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Prefix shared by every environment override.
pub const ENV_PREFIX: &str = "MYAPP_";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {var}: {value:?}")]
    Env { var: String, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from an optional TOML file, apply environment
/// overrides from the process environment, then validate.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => AppConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `MYAPP_*` overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    if let Some(v) = env.parse("WORKER_IDLE_INTERVAL")? {
        config.worker.idle_interval_secs = v;
    }
    if let Some(v) = env.parse("WORKER_ACTIVE_INTERVAL")? {
        config.worker.active_interval_secs = v;
    }
    if let Some(v) = env.parse("WORKER_MAX_RETRIES")? {
        config.worker.max_retries = v;
    }
    if let Some(v) = env.parse("HEALTH_PORT")? {
        config.worker.health_port = Some(v);
    }
    if let Some(v) = env.parse("BACKOFF_MIN_DELAY")? {
        config.backoff.min_delay_secs = v;
    }
    if let Some(v) = env.parse("BACKOFF_MAX_DELAY")? {
        config.backoff.max_delay_secs = v;
    }
    if let Some(v) = env.parse("BACKOFF_MULTIPLIER")? {
        config.backoff.multiplier = v;
    }
    if let Some(v) = env.raw("RATE_LIMIT_ENABLED") {
        config.rate_limit.enabled = parse_flag(&v);
    }
    if let Some(v) = env.raw("RATE_LIMIT_DEFAULT") {
        config.rate_limit.default_limit = v;
    }
    if let Some(v) = env.raw("RATE_LIMIT_REDIS_URL") {
        // An empty URL means "no shared store".
        config.rate_limit.redis_url = Some(v).filter(|url| !url.trim().is_empty());
    }
    if let Some(v) = env.raw("LOG_LEVEL") {
        config.observability.log_level = v.to_lowercase();
    }
    if let Some(v) = env.raw("LOG_FORMAT") {
        config.observability.log_format = v.to_lowercase();
    }

    Ok(())
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn var_name(name: &str) -> String {
        format!("{}{}", ENV_PREFIX, name)
    }

    fn raw(&self, name: &str) -> Option<String> {
        (self.lookup)(&Self::var_name(name))
    }

    fn parse<T: FromStr>(&self, name: &str) -> Result<Option<T>, ConfigError> {
        match self.raw(name) {
            None => Ok(None),
            Some(value) => value.trim().parse().map(Some).map_err(|_| ConfigError::Env {
                var: Self::var_name(name),
                value,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_apply() {
        let mut config = AppConfig::default();
        apply_env_overrides(
            &mut config,
            lookup(&[
                ("MYAPP_WORKER_IDLE_INTERVAL", "5"),
                ("MYAPP_WORKER_MAX_RETRIES", "3"),
                ("MYAPP_BACKOFF_MIN_DELAY", "0.5"),
                ("MYAPP_RATE_LIMIT_ENABLED", "off"),
                ("MYAPP_RATE_LIMIT_DEFAULT", "10/second"),
                ("MYAPP_RATE_LIMIT_REDIS_URL", "redis://cache:6379"),
                ("MYAPP_LOG_FORMAT", "JSON"),
            ]),
        )
        .unwrap();

        assert_eq!(config.worker.idle_interval_secs, 5.0);
        assert_eq!(config.worker.max_retries, 3);
        assert_eq!(config.backoff.min_delay_secs, 0.5);
        assert!(!config.rate_limit.enabled);
        assert_eq!(config.rate_limit.default_limit, "10/second");
        assert_eq!(config.rate_limit.redis_url.as_deref(), Some("redis://cache:6379"));
        assert_eq!(config.observability.log_format, "json");
    }

    #[test]
    fn empty_redis_url_disables_store() {
        let mut config = AppConfig::default();
        config.rate_limit.redis_url = Some("redis://old".to_string());
        apply_env_overrides(&mut config, lookup(&[("MYAPP_RATE_LIMIT_REDIS_URL", "")])).unwrap();
        assert!(config.rate_limit.redis_url.is_none());
    }

    #[test]
    fn unparseable_env_value_is_an_error() {
        let mut config = AppConfig::default();
        let err = apply_env_overrides(&mut config, lookup(&[("MYAPP_WORKER_MAX_RETRIES", "many")]))
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid value for MYAPP_WORKER_MAX_RETRIES: \"many\"");
    }

    #[test]
    fn flag_parsing() {
        assert!(parse_flag("TRUE"));
        assert!(parse_flag("1"));
        assert!(parse_flag("yes"));
        assert!(!parse_flag("no"));
        assert!(!parse_flag(""));
    }
}
