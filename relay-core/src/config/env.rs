//! Environment variable interpolation and overrides for configuration

use super::error::ConfigError;
use super::schema::RelayConfig;
use regex::{Captures, Regex};
use std::str::FromStr;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").expect("env var pattern is valid")
});

/// Interpolate `${VAR}` references using the process environment
pub fn interpolate_env_vars(content: &str) -> Result<String, ConfigError> {
    interpolate_with(content, |var| std::env::var(var).ok())
}

/// Interpolate `${VAR}` references, reporting the first missing variable
pub fn interpolate_with<F>(content: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut missing: Option<String> = None;
    let result = ENV_VAR_PATTERN.replace_all(content, |caps: &Captures<'_>| {
        let var = &caps[1];
        match lookup(var) {
            Some(value) => value,
            None => {
                missing.get_or_insert_with(|| var.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(var) => Err(ConfigError::EnvVarNotFound { var }),
        None => Ok(result.into_owned()),
    }
}

/// Environment variable toggling a provider, e.g. `RELAY_OPENAI_ENABLED`
pub fn enabled_var(provider: &str) -> String {
    let normalized: String = provider
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("RELAY_{}_ENABLED", normalized)
}

/// Apply `RELAY_*` overrides on top of a loaded configuration
pub fn apply_env_overrides<F>(config: &mut RelayConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    for provider in &mut config.providers {
        let var = enabled_var(&provider.name);
        if let Some(value) = lookup(&var) {
            provider.enabled = parse_bool(&var, &value)?;
        }
    }

    if let Some(name) = lookup("RELAY_DEFAULT_PROVIDER").filter(|v| !v.trim().is_empty()) {
        config.default_provider = Some(name.trim().to_string());
    }

    let health = &mut config.health;
    if let Some(v) = parse_var(&lookup, "RELAY_HEALTH_WINDOW_SIZE")? {
        health.window_size = v;
    }
    if let Some(v) = parse_var(&lookup, "RELAY_HEALTH_DEGRADED_SUCCESS_RATE")? {
        health.degraded_success_rate = v;
    }
    if let Some(v) = parse_var(&lookup, "RELAY_HEALTH_UNHEALTHY_SUCCESS_RATE")? {
        health.unhealthy_success_rate = v;
    }
    if let Some(v) = parse_var(&lookup, "RELAY_HEALTH_FAILURE_THRESHOLD")? {
        health.failure_threshold = v;
    }
    if let Some(v) = parse_var(&lookup, "RELAY_HEALTH_COOLDOWN_SECS")? {
        health.cooldown_secs = v;
    }
    if let Some(v) = parse_var(&lookup, "RELAY_HEALTH_PROBE_INTERVAL_SECS")? {
        health.probe_interval_secs = v;
    }

    if let Some(v) = parse_var(&lookup, "RELAY_ATTEMPT_TIMEOUT_MS")? {
        config.failover.attempt_timeout_ms = v;
    }
    if let Some(v) = parse_var(&lookup, "RELAY_REQUEST_TIMEOUT_MS")? {
        config.failover.request_timeout_ms = v;
    }

    Ok(())
}

fn parse_var<F, T>(lookup: &F, var: &str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvValue {
                var: var.to_string(),
                value,
                expected: std::any::type_name::<T>().to_string(),
            }),
    }
}

fn parse_bool(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnvValue {
            var: var.to_string(),
            value: value.to_string(),
            expected: "a boolean".to_string(),
        }),
    }
}
