//! Configuration for the relay
//!
//! Configuration is read once at startup from YAML, JSON or the process
//! environment, validated, and then resolved into immutable
//! [`ProviderConfig`](crate::providers::ProviderConfig) values.

mod env;
mod error;
mod schema;
mod secrets;
mod validator;

pub use env::{apply_env_overrides, enabled_var, interpolate_env_vars, interpolate_with};
pub use error::{ConfigError, ConfigResult, ValidationError, ValidationErrorKind};
pub use schema::{
    ConnectionConfig, FailoverConfig, HealthOverrides, HealthPolicy, ProviderEntry, RelayConfig,
    TaskTypeConfig, GENERAL_TASK,
};
pub use secrets::SecretString;
pub use validator::ConfigValidator;

use crate::providers::ProviderKind;
use std::fs;
use std::path::Path;

/// Environment variable holding the Azure OpenAI endpoint for the built-in catalogue
pub const AZURE_ENDPOINT_VAR: &str = "AZURE_OPENAI_ENDPOINT";

/// Load a configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<RelayConfig, ConfigError> {
    let path = path.as_ref();
    let content = read(path)?;

    // Interpolate environment variables before parsing
    let interpolated = env::interpolate_env_vars(&content)?;

    let mut config: RelayConfig =
        serde_yaml::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: e.location().map(|l| l.line()),
            column: e.location().map(|l| l.column()),
            message: e.to_string(),
        })?;

    config.ensure_general_task();
    ConfigValidator::new().validate(&config)?;
    Ok(config)
}

/// Load a configuration from a JSON file
pub fn load_from_json<P: AsRef<Path>>(path: P) -> Result<RelayConfig, ConfigError> {
    let path = path.as_ref();
    let content = read(path)?;

    let interpolated = env::interpolate_env_vars(&content)?;

    let mut config: RelayConfig =
        serde_json::from_str(&interpolated).map_err(|e| ConfigError::ParseError {
            path: path.to_string_lossy().to_string(),
            line: Some(e.line()),
            column: Some(e.column()),
            message: e.to_string(),
        })?;

    config.ensure_general_task();
    ConfigValidator::new().validate(&config)?;
    Ok(config)
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|e| ConfigError::IoError {
        path: path.to_string_lossy().to_string(),
        source: e,
    })
}

impl RelayConfig {
    /// Built-in catalogue with `RELAY_*` overrides from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with(|var| std::env::var(var).ok())
    }

    /// Same as [`RelayConfig::from_env`] with an explicit variable lookup
    pub fn from_env_with<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::builtin_catalogue();

        if let Some(endpoint) = lookup(AZURE_ENDPOINT_VAR).filter(|v| !v.trim().is_empty()) {
            for entry in config
                .providers
                .iter_mut()
                .filter(|p| p.kind == ProviderKind::Azure)
            {
                entry.base_url = Some(endpoint.trim().to_string());
            }
        }

        env::apply_env_overrides(&mut config, &lookup)?;
        ConfigValidator::new().validate(&config)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_yaml() {
        let yaml = r#"
version: "0.1"
default_provider: local
providers:
  - name: local
    type: ollama
    model: llama3.1
  - name: openai
    type: openai
    api_key_env: OPENAI_API_KEY
    health:
      cooldown_secs: 10
failover:
  attempt_timeout_ms: 5000
"#;
        let config: RelayConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[1].health.cooldown_secs, Some(10));
        assert_eq!(config.failover.attempt_timeout_ms, 5000);
        assert_eq!(config.failover.request_timeout_ms, 120_000);
        assert!(config.task_types.iter().any(|t| t.name == GENERAL_TASK));
        assert!(ConfigValidator::new().validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let yaml = r#"
version: "0.1"
providers:
  - name: local
    type: ollama
    colour: blue
"#;
        assert!(serde_yaml::from_str::<RelayConfig>(yaml).is_err());
    }

    #[test]
    fn test_from_env_sets_azure_endpoint() {
        let config = RelayConfig::from_env_with(|var| match var {
            "AZURE_OPENAI_ENDPOINT" => Some("https://example.openai.azure.com".to_string()),
            _ => None,
        })
        .unwrap();
        let azure = config.provider("azure").unwrap();
        assert_eq!(
            azure.base_url.as_deref(),
            Some("https://example.openai.azure.com")
        );
    }
}
