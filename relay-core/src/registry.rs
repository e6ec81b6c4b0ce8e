//! The set of providers known to the relay
//!
//! A registry is built once, explicitly, and then shared read-only (behind an
//! `Arc`) with the health monitor, cost tracker and orchestrator. Tests build
//! their own registries with fake adapters through [`ProviderRegistry::builder`].

use crate::config::{ConfigError, RelayConfig};
use crate::http::HttpClient;
use crate::providers::{create_adapter, ProviderAdapter, ProviderConfig};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Immutable collection of provider adapters in registration order
pub struct ProviderRegistry {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    index: HashMap<String, usize>,
    default_provider: Option<String>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.names())
            .field("default_provider", &self.default_provider)
            .finish()
    }
}

impl ProviderRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Build one adapter per configured provider, resolving credentials from
    /// the process environment
    pub fn from_config(config: &RelayConfig, http: HttpClient) -> Result<Self, ConfigError> {
        Self::from_resolved(config, config.resolve_providers(), http)
    }

    /// Same as [`ProviderRegistry::from_config`] with an explicit variable lookup
    pub fn from_config_with<F>(
        config: &RelayConfig,
        http: HttpClient,
        lookup: F,
    ) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::from_resolved(config, config.resolve_providers_with(lookup), http)
    }

    fn from_resolved(
        config: &RelayConfig,
        providers: Vec<ProviderConfig>,
        http: HttpClient,
    ) -> Result<Self, ConfigError> {
        let mut builder = Self::builder();
        for provider in providers {
            builder = builder.register(create_adapter(provider, http.clone()));
        }
        if let Some(default) = &config.default_provider {
            builder = builder.with_default_provider(default.clone());
        }

        let registry = builder.build()?;
        info!(
            providers = registry.len(),
            enabled = registry.enabled_providers().len(),
            "Provider registry loaded"
        );
        Ok(registry)
    }

    /// Enabled providers, in registration order
    pub fn enabled_providers(&self) -> Vec<&ProviderConfig> {
        self.adapters
            .iter()
            .map(|a| a.config())
            .filter(|c| c.enabled)
            .collect()
    }

    /// Every registered provider, enabled or not
    pub fn iter(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.adapters.iter().map(|a| a.config())
    }

    pub fn get(&self, name: &str) -> Option<&ProviderConfig> {
        self.index.get(name).map(|&i| self.adapters[i].config())
    }

    pub fn adapter(&self, name: &str) -> Option<Arc<dyn ProviderAdapter>> {
        self.index.get(name).map(|&i| Arc::clone(&self.adapters[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }

    /// Configured default provider, if it is registered and enabled
    pub fn default_provider(&self) -> Option<&str> {
        self.default_provider
            .as_deref()
            .filter(|name| self.get(name).is_some_and(|c| c.enabled))
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

/// Builder for [`ProviderRegistry`]
#[derive(Default)]
pub struct RegistryBuilder {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    default_provider: Option<String>,
}

impl RegistryBuilder {
    pub fn register(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn with_default_provider(mut self, name: impl Into<String>) -> Self {
        self.default_provider = Some(name.into());
        self
    }

    pub fn build(self) -> Result<ProviderRegistry, ConfigError> {
        let mut index = HashMap::with_capacity(self.adapters.len());
        for (i, adapter) in self.adapters.iter().enumerate() {
            if index.insert(adapter.name().to_string(), i).is_some() {
                return Err(ConfigError::Invalid {
                    message: format!("Provider '{}' registered twice", adapter.name()),
                });
            }
        }

        if let Some(default) = &self.default_provider {
            if !index.contains_key(default) {
                warn!(provider = %default, "Default provider is not registered");
            }
        }

        Ok(ProviderRegistry {
            adapters: self.adapters,
            index,
            default_provider: self.default_provider,
        })
    }
}
