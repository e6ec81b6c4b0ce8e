//! Configuration validation utilities

use super::error::ValidationError;
use super::schema::{RelayConfig, GENERAL_TASK};
use regex::Regex;
use std::collections::HashSet;

/// Configuration validator with cross-field rules
pub struct ConfigValidator {
    /// Valid environment variable names
    env_var_name: Regex,
    /// Unresolved `${VAR}` placeholders
    placeholder: Regex,
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigValidator {
    pub fn new() -> Self {
        Self {
            env_var_name: Regex::new(r"^[A-Z_][A-Z0-9_]*$").expect("env var name pattern is valid"),
            placeholder: Regex::new(r"\$\{[^}]*\}").expect("placeholder pattern is valid"),
        }
    }

    /// Validate a configuration with extended rules
    pub fn validate(&self, config: &RelayConfig) -> Result<(), ValidationError> {
        config.validate()?;

        self.validate_credentials(config)?;
        self.validate_default_provider(config)?;
        self.validate_task_types(config)?;

        Ok(())
    }

    fn validate_credentials(&self, config: &RelayConfig) -> Result<(), ValidationError> {
        for (i, provider) in config.providers.iter().enumerate() {
            if let Some(var) = &provider.api_key_env {
                if !self.env_var_name.is_match(var) {
                    return Err(ValidationError::invalid_format(
                        format!("providers[{}].api_key_env", i),
                        format!("'{}' is not a valid environment variable name", var),
                    ));
                }
            }

            if let Some(key) = &provider.api_key {
                if self.placeholder.is_match(key.expose_secret()) {
                    return Err(ValidationError::invalid_format(
                        format!("providers[{}].api_key", i),
                        "unresolved placeholder",
                    ));
                }
            }
        }

        Ok(())
    }

    fn validate_default_provider(&self, config: &RelayConfig) -> Result<(), ValidationError> {
        let enabled_count = config.providers.iter().filter(|p| p.enabled).count();
        if enabled_count == 0 {
            return Err(ValidationError::conflict(
                "providers",
                "At least one provider must be enabled",
            ));
        }

        if let Some(default) = &config.default_provider {
            match config.provider(default) {
                None => {
                    return Err(ValidationError::invalid_value(
                        "default_provider",
                        "existing provider name",
                        default.clone(),
                    ))
                }
                Some(p) if !p.enabled => {
                    return Err(ValidationError::conflict(
                        "default_provider",
                        format!("Provider '{}' is disabled", default),
                    ))
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    fn validate_task_types(&self, config: &RelayConfig) -> Result<(), ValidationError> {
        let mut seen = HashSet::new();
        for (i, task) in config.task_types.iter().enumerate() {
            if task.name.trim().is_empty() {
                return Err(ValidationError::required(format!("task_types[{}].name", i)));
            }
            if !seen.insert(task.name.as_str()) {
                return Err(ValidationError::duplicate(
                    format!("task_types[{}].name", i),
                    task.name.clone(),
                ));
            }
            if task.name == GENERAL_TASK && !task.requires.is_empty() {
                return Err(ValidationError::conflict(
                    format!("task_types[{}].requires", i),
                    "The general task type cannot require capabilities",
                ));
            }
        }

        Ok(())
    }
}
