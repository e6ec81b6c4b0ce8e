//! Serde model of the relay configuration file

use super::error::ValidationError;
use super::secrets::SecretString;
use crate::providers::adapter::{Capabilities, Capability, ProviderConfig, ProviderKind};
use crate::providers::pricing::Pricing;
use crate::providers::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

/// Root configuration structure for the relay
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Format revision of the file; must be "0.1"
    pub version: String,

    /// Provider used first when the caller expresses no preference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_provider: Option<String>,

    /// Configured backends, in registration order
    #[serde(default)]
    pub providers: Vec<ProviderEntry>,

    /// Global health tunables, overridable per provider
    #[serde(default)]
    pub health: HealthPolicy,

    #[serde(default)]
    pub failover: FailoverConfig,

    /// Shared HTTP connection settings
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Known task types and the capabilities each requires
    #[serde(default = "default_task_types")]
    pub task_types: Vec<TaskTypeConfig>,
}

/// One provider as written in the configuration file
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProviderEntry {
    /// Unique provider name
    pub name: String,

    /// Backend kind (openai, anthropic, ollama, ...)
    #[serde(rename = "type")]
    pub kind: ProviderKind,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Environment variable holding the credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Inline credential (supports `${VAR}` interpolation)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecretString>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_context_tokens: Option<usize>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capabilities: Option<Capabilities>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,

    /// Azure `api-version`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Per-provider health overrides
    #[serde(default)]
    pub health: HealthOverrides,
}

/// Health tunables driving the per-provider state machine
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HealthPolicy {
    /// Number of trailing outcomes in the rolling window
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    /// Success rate (percent) below which a healthy provider degrades
    #[serde(default = "default_degraded_success_rate")]
    pub degraded_success_rate: f64,

    /// Success rate (percent) below which a degraded provider is unhealthy
    #[serde(default = "default_unhealthy_success_rate")]
    pub unhealthy_success_rate: f64,

    /// Average latency ceiling (milliseconds)
    #[serde(default = "default_max_avg_latency")]
    pub max_avg_latency_ms: u64,

    /// Consecutive failures that make a provider unhealthy
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Time an unhealthy provider sits out before a half-open trial
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,

    #[serde(default = "default_probe_interval")]
    pub probe_interval_secs: u64,

    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Outcomes needed before rate-based transitions apply
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
}

/// Per-provider replacements for [`HealthPolicy`] fields
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HealthOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_size: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded_success_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unhealthy_success_rate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_avg_latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_threshold: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_interval_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe_timeout_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_samples: Option<usize>,
}

/// Failover timing and retry settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct FailoverConfig {
    /// Budget for a single provider attempt (milliseconds)
    #[serde(default = "default_attempt_timeout")]
    pub attempt_timeout_ms: u64,

    /// Deadline for the whole request across all candidates (milliseconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Extra attempts granted to the final candidate on transient failures
    #[serde(default = "default_last_candidate_retries")]
    pub last_candidate_retries: u32,

    #[serde(default)]
    pub retry: RetryPolicy,
}

/// Global connection settings
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Maximum idle connections per host
    #[serde(default = "default_max_idle")]
    pub max_idle_per_host: usize,

    /// Keep-alive timeout in seconds
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,

    /// Largest response body accepted from a provider
    #[serde(default = "default_max_response_bytes")]
    pub max_response_bytes: usize,
}

/// A task type and the capabilities a provider needs to serve it
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TaskTypeConfig {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub requires: Vec<Capability>,
}

impl TaskTypeConfig {
    pub fn new(name: impl Into<String>, requires: Vec<Capability>) -> Self {
        Self {
            name: name.into(),
            requires,
        }
    }
}

/// Name of the task type that always exists
pub const GENERAL_TASK: &str = "general";

fn default_task_types() -> Vec<TaskTypeConfig> {
    vec![
        TaskTypeConfig::new(GENERAL_TASK, Vec::new()),
        TaskTypeConfig::new("evidence_analysis", Vec::new()),
        TaskTypeConfig::new("risk_assessment", Vec::new()),
        TaskTypeConfig::new("control_mapping", vec![Capability::JsonMode]),
        TaskTypeConfig::new("policy_drafting", Vec::new()),
        TaskTypeConfig::new("document_review", vec![Capability::Vision]),
    ]
}

impl Default for HealthPolicy {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            degraded_success_rate: default_degraded_success_rate(),
            unhealthy_success_rate: default_unhealthy_success_rate(),
            max_avg_latency_ms: default_max_avg_latency(),
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown(),
            probe_interval_secs: default_probe_interval(),
            probe_timeout_ms: default_probe_timeout(),
            min_samples: default_min_samples(),
        }
    }
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: default_attempt_timeout(),
            request_timeout_ms: default_request_timeout(),
            last_candidate_retries: default_last_candidate_retries(),
            retry: RetryPolicy::default(),
        }
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            max_idle_per_host: default_max_idle(),
            keepalive_secs: default_keepalive(),
            max_response_bytes: default_max_response_bytes(),
        }
    }
}

// serde defaults
fn default_true() -> bool { true }
fn default_window_size() -> usize { 20 }
fn default_degraded_success_rate() -> f64 { 90.0 }
fn default_unhealthy_success_rate() -> f64 { 50.0 }
fn default_max_avg_latency() -> u64 { 10_000 }
fn default_failure_threshold() -> u32 { 3 }
fn default_cooldown() -> u64 { 60 }
fn default_probe_interval() -> u64 { 30 }
fn default_probe_timeout() -> u64 { 5_000 }
fn default_min_samples() -> usize { 5 }
fn default_attempt_timeout() -> u64 { 30_000 }
fn default_request_timeout() -> u64 { 120_000 }
fn default_last_candidate_retries() -> u32 { 1 }
fn default_connect_timeout() -> u64 { 10_000 }
fn default_max_idle() -> usize { 10 }
fn default_keepalive() -> u64 { 90 }
fn default_max_response_bytes() -> usize { 10 * 1024 * 1024 }

impl HealthPolicy {
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Apply per-provider overrides on top of this policy
    pub fn with_overrides(&self, overrides: &HealthOverrides) -> Self {
        Self {
            window_size: overrides.window_size.unwrap_or(self.window_size),
            degraded_success_rate: overrides
                .degraded_success_rate
                .unwrap_or(self.degraded_success_rate),
            unhealthy_success_rate: overrides
                .unhealthy_success_rate
                .unwrap_or(self.unhealthy_success_rate),
            max_avg_latency_ms: overrides.max_avg_latency_ms.unwrap_or(self.max_avg_latency_ms),
            failure_threshold: overrides.failure_threshold.unwrap_or(self.failure_threshold),
            cooldown_secs: overrides.cooldown_secs.unwrap_or(self.cooldown_secs),
            probe_interval_secs: overrides.probe_interval_secs.unwrap_or(self.probe_interval_secs),
            probe_timeout_ms: overrides.probe_timeout_ms.unwrap_or(self.probe_timeout_ms),
            min_samples: overrides.min_samples.unwrap_or(self.min_samples),
        }
    }

    /// Validate the policy
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        for (field, value) in [
            ("degraded_success_rate", self.degraded_success_rate),
            ("unhealthy_success_rate", self.unhealthy_success_rate),
        ] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ValidationError::out_of_range(
                    format!("{}.{}", path, field),
                    "Must be between 0 and 100",
                ));
            }
        }

        if self.unhealthy_success_rate >= self.degraded_success_rate {
            return Err(ValidationError::conflict(
                format!("{}.unhealthy_success_rate", path),
                "Must be lower than degraded_success_rate",
            ));
        }

        if self.window_size == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.window_size", path),
                "Must be greater than 0",
            ));
        }

        if self.min_samples == 0 || self.min_samples > self.window_size {
            return Err(ValidationError::out_of_range(
                format!("{}.min_samples", path),
                "Must be between 1 and window_size",
            ));
        }

        for (field, value) in [
            ("failure_threshold", u64::from(self.failure_threshold)),
            ("probe_interval_secs", self.probe_interval_secs),
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("max_avg_latency_ms", self.max_avg_latency_ms),
        ] {
            if value == 0 {
                return Err(ValidationError::out_of_range(
                    format!("{}.{}", path, field),
                    "Must be greater than 0",
                ));
            }
        }

        Ok(())
    }
}

impl FailoverConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.attempt_timeout_ms == 0 {
            return Err(ValidationError::out_of_range(
                format!("{}.attempt_timeout_ms", path),
                "Must be greater than 0",
            ));
        }

        if self.request_timeout_ms < self.attempt_timeout_ms {
            return Err(ValidationError::conflict(
                format!("{}.request_timeout_ms", path),
                "Must not be shorter than attempt_timeout_ms",
            ));
        }

        let retry = &self.retry;
        if retry.initial_delay_ms > retry.max_delay_ms {
            return Err(ValidationError::conflict(
                format!("{}.retry.initial_delay_ms", path),
                "Cannot exceed max_delay_ms",
            ));
        }

        if retry.exponential_base < 1.0 {
            return Err(ValidationError::out_of_range(
                format!("{}.retry.exponential_base", path),
                "Must be at least 1.0",
            ));
        }

        if !(0.0..=1.0).contains(&retry.jitter_factor) {
            return Err(ValidationError::out_of_range(
                format!("{}.retry.jitter_factor", path),
                "Must be between 0.0 and 1.0",
            ));
        }

        Ok(())
    }
}

impl ConnectionConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn keepalive(&self) -> Duration {
        Duration::from_secs(self.keepalive_secs)
    }
}

impl ProviderEntry {
    /// Entry for `kind` relying entirely on the kind's defaults
    pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            name: name.into(),
            kind,
            enabled: true,
            api_key_env: None,
            api_key: None,
            base_url: None,
            model: None,
            max_context_tokens: None,
            capabilities: None,
            pricing: None,
            api_version: None,
            health: HealthOverrides::default(),
        }
    }

    /// Resolve into an immutable [`ProviderConfig`].
    ///
    /// `lookup` reads environment variables. A hosted provider whose
    /// credential cannot be found, or an Azure provider without an endpoint,
    /// comes back disabled.
    pub fn resolve_with<F>(&self, global: &HealthPolicy, lookup: F) -> ProviderConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = self.kind.defaults();
        let mut config = ProviderConfig::new(&self.name, self.kind)
            .with_health(global.with_overrides(&self.health));

        if !self.enabled {
            config = config.disabled();
        }
        if let Some(base_url) = &self.base_url {
            config = config.with_base_url(base_url);
        }
        if let Some(model) = &self.model {
            config = config.with_model(model);
        }
        if let Some(max_context_tokens) = self.max_context_tokens {
            config = config.with_max_context_tokens(max_context_tokens);
        }
        if let Some(capabilities) = self.capabilities {
            config = config.with_capabilities(capabilities);
        }
        if let Some(pricing) = self.pricing {
            config = config.with_pricing(pricing);
        }
        if let Some(api_version) = &self.api_version {
            config = config.with_api_version(api_version);
        }

        config.api_key_env = self
            .api_key_env
            .clone()
            .or_else(|| defaults.credential_env.map(str::to_string));

        config.api_key = self
            .api_key
            .clone()
            .filter(|key| !key.is_empty())
            .or_else(|| {
                config
                    .api_key_env
                    .as_deref()
                    .and_then(&lookup)
                    .filter(|value| !value.trim().is_empty())
                    .map(SecretString::new)
            });

        if let Some(key) = &config.api_key {
            debug!(provider = %self.name, api_key = %key.partial_redact(), "Credential resolved");
        }

        if config.enabled && !self.kind.is_local() && config.api_key.is_none() {
            warn!(
                provider = %self.name,
                api_key_env = config.api_key_env.as_deref().unwrap_or("-"),
                "No credential found, disabling provider"
            );
            config.enabled = false;
        }

        if config.enabled && config.base_url().is_empty() {
            warn!(provider = %self.name, "No base URL configured, disabling provider");
            config.enabled = false;
        }

        config
    }

    /// Check one provider entry in isolation
    pub fn validate(&self, path: &str) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::required(format!("{}.name", path)));
        }

        if let Some(base_url) = &self.base_url {
            validate_url(&format!("{}.base_url", path), base_url)?;
        }

        if matches!(&self.model, Some(model) if model.trim().is_empty()) {
            return Err(ValidationError::required(format!("{}.model", path)));
        }

        if self.max_context_tokens == Some(0) {
            return Err(ValidationError::out_of_range(
                format!("{}.max_context_tokens", path),
                "Must be greater than 0",
            ));
        }

        if let Some(pricing) = &self.pricing {
            if pricing.input_per_1k < 0.0 || pricing.output_per_1k < 0.0 {
                return Err(ValidationError::out_of_range(
                    format!("{}.pricing", path),
                    "Costs cannot be negative",
                ));
            }
        }

        Ok(())
    }
}

fn validate_url(path: &str, value: &str) -> Result<(), ValidationError> {
    match url::Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(()),
        Ok(url) => Err(ValidationError::invalid_url(
            path,
            format!("scheme must be http or https, got: {}", url.scheme()),
        )),
        Err(e) => Err(ValidationError::invalid_url(path, e.to_string())),
    }
}

impl RelayConfig {
    /// Configuration listing every known backend under its kind name
    pub fn builtin_catalogue() -> Self {
        Self {
            version: "0.1".to_string(),
            default_provider: None,
            providers: ProviderKind::ALL
                .iter()
                .map(|kind| ProviderEntry::new(kind.as_str(), *kind))
                .collect(),
            health: HealthPolicy::default(),
            failover: FailoverConfig::default(),
            connection: ConnectionConfig::default(),
            task_types: default_task_types(),
        }
    }

    /// Add the `general` task type when the file does not declare it
    pub fn ensure_general_task(&mut self) {
        if !self.task_types.iter().any(|t| t.name == GENERAL_TASK) {
            self.task_types
                .insert(0, TaskTypeConfig::new(GENERAL_TASK, Vec::new()));
        }
    }

    /// Look up a provider entry by name
    pub fn provider(&self, name: &str) -> Option<&ProviderEntry> {
        self.providers.iter().find(|p| p.name == name)
    }

    /// Resolve every provider against the process environment
    pub fn resolve_providers(&self) -> Vec<ProviderConfig> {
        self.resolve_providers_with(|var| std::env::var(var).ok())
    }

    pub fn resolve_providers_with<F>(&self, lookup: F) -> Vec<ProviderConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        self.providers
            .iter()
            .map(|entry| entry.resolve_with(&self.health, &lookup))
            .collect()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.version.is_empty() {
            return Err(ValidationError::required("version"));
        }

        // Only one format revision exists so far
        if self.version != "0.1" {
            return Err(ValidationError::unsupported_version("0.1", self.version.clone()));
        }

        if self.providers.is_empty() {
            return Err(ValidationError::required("providers")
                .with_context("At least one provider must be configured"));
        }

        let mut seen_names = HashSet::new();
        for (i, provider) in self.providers.iter().enumerate() {
            if !seen_names.insert(provider.name.as_str()) {
                return Err(ValidationError::duplicate(
                    format!("providers[{}].name", i),
                    provider.name.clone(),
                ));
            }

            let path = format!("providers[{}]", i);
            provider.validate(&path)?;
            self.health
                .with_overrides(&provider.health)
                .validate(&format!("{}.health", path))?;
        }

        self.health.validate("health")?;
        self.failover.validate("failover")?;

        if self.connection.max_response_bytes == 0 {
            return Err(ValidationError::out_of_range(
                "connection.max_response_bytes",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationErrorKind;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn test_defaults_match_documented_values() {
        let policy = HealthPolicy::default();
        assert_eq!(policy.window_size, 20);
        assert_eq!(policy.failure_threshold, 3);
        assert_eq!(policy.cooldown(), Duration::from_secs(60));
        assert_eq!(policy.probe_interval(), Duration::from_secs(30));

        let failover = FailoverConfig::default();
        assert_eq!(failover.attempt_timeout(), Duration::from_secs(30));
        assert_eq!(failover.request_timeout(), Duration::from_secs(120));
    }

    #[test]
    fn test_overrides_replace_only_given_fields() {
        let overrides = HealthOverrides {
            cooldown_secs: Some(5),
            ..Default::default()
        };
        let policy = HealthPolicy::default().with_overrides(&overrides);
        assert_eq!(policy.cooldown_secs, 5);
        assert_eq!(policy.window_size, 20);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let policy = HealthPolicy {
            unhealthy_success_rate: 95.0,
            ..Default::default()
        };
        let err = policy.validate("health").unwrap_err();
        assert_eq!(err.field_path, "health.unhealthy_success_rate");
    }

    #[test]
    fn test_hosted_provider_without_credential_is_disabled() {
        let entry = ProviderEntry::new("openai", ProviderKind::OpenAI);
        let config = entry.resolve_with(&HealthPolicy::default(), no_env);
        assert!(!config.enabled);
        assert_eq!(config.api_key_env.as_deref(), Some("OPENAI_API_KEY"));
    }

    #[test]
    fn test_credential_resolved_from_environment() {
        let entry = ProviderEntry::new("openai", ProviderKind::OpenAI);
        let config = entry.resolve_with(&HealthPolicy::default(), |var| {
            (var == "OPENAI_API_KEY").then(|| "sk-test".to_string())
        });
        assert!(config.enabled);
        assert_eq!(config.api_key(), Some("sk-test"));
    }

    #[test]
    fn test_local_provider_needs_no_credential() {
        let entry = ProviderEntry::new("ollama", ProviderKind::Ollama);
        let config = entry.resolve_with(&HealthPolicy::default(), no_env);
        assert!(config.enabled);
        assert_eq!(config.base_url(), "http://localhost:11434");
    }

    #[test]
    fn test_azure_without_endpoint_is_disabled() {
        let mut entry = ProviderEntry::new("azure", ProviderKind::Azure);
        entry.api_key = Some(SecretString::new("key"));
        let config = entry.resolve_with(&HealthPolicy::default(), no_env);
        assert!(!config.enabled);
    }

    #[test]
    fn test_builtin_catalogue_validates() {
        let config = RelayConfig::builtin_catalogue();
        assert_eq!(config.providers.len(), ProviderKind::ALL.len());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_provider_names_rejected() {
        let mut config = RelayConfig::builtin_catalogue();
        config.providers.push(ProviderEntry::new("openai", ProviderKind::OpenAI));
        let err = config.validate().unwrap_err();
        assert!(matches!(err.kind, ValidationErrorKind::Duplicate { .. }));
    }
}
