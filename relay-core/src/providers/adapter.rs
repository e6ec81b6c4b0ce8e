//! Provider adapter trait, capabilities and the backend catalogue
//!
//! Every backend is reached through one [`ProviderAdapter`]. Concrete adapters
//! are picked from [`ProviderKind`] when the registry is built, never by
//! probing objects at runtime.

use crate::config::{HealthPolicy, SecretString};
use crate::http::client::HttpClient;
use crate::protocol::types::{Completion, GenerationRequest, TokenUsage};
use crate::providers::error::ProviderResult;
use crate::providers::pricing::Pricing;
use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::sync::Arc;

/// Incremental text produced by a streaming generation
pub type TextStream = Pin<Box<dyn Stream<Item = ProviderResult<String>> + Send>>;

/// Uniform contract implemented by every backend.
///
/// Adapters only perform network I/O and report outcomes. They never touch
/// health or cost state; the orchestrator records what they return.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Resolved configuration this adapter was built from
    fn config(&self) -> &ProviderConfig;

    /// Unique provider name
    fn name(&self) -> &str {
        &self.config().name
    }

    /// Backend kind
    fn kind(&self) -> ProviderKind {
        self.config().kind
    }

    /// Run a single, non-streaming generation
    async fn generate(&self, request: &GenerationRequest) -> ProviderResult<Completion>;

    /// Open a streaming generation.
    ///
    /// Backends without a native stream produce the whole completion as one chunk.
    async fn stream(&self, request: &GenerationRequest) -> ProviderResult<TextStream> {
        let completion = self.generate(request).await?;
        Ok(Box::pin(futures::stream::once(async move {
            Ok(completion.text)
        })))
    }

    /// Cheap reachability round trip. Callers bound it with a short timeout.
    async fn health_check(&self) -> bool;

    /// Cost of the given token usage according to the published pricing table
    fn estimate_cost(&self, usage: &TokenUsage) -> f64 {
        self.config().pricing.cost(usage)
    }
}

/// A single optional feature a backend may offer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Streaming,
    FunctionCalling,
    Vision,
    JsonMode,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Streaming => "streaming",
            Capability::FunctionCalling => "function_calling",
            Capability::Vision => "vision",
            Capability::JsonMode => "json_mode",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capability set of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Capabilities {
    pub streaming: bool,
    pub function_calling: bool,
    pub vision: bool,
    pub json_mode: bool,
}

impl Capabilities {
    /// Every capability enabled
    pub const fn full() -> Self {
        Self {
            streaming: true,
            function_calling: true,
            vision: true,
            json_mode: true,
        }
    }

    const fn new(streaming: bool, function_calling: bool, vision: bool, json_mode: bool) -> Self {
        Self {
            streaming,
            function_calling,
            vision,
            json_mode,
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Streaming => self.streaming,
            Capability::FunctionCalling => self.function_calling,
            Capability::Vision => self.vision,
            Capability::JsonMode => self.json_mode,
        }
    }

    pub fn supports_all(&self, required: &[Capability]) -> bool {
        required.iter().all(|c| self.supports(*c))
    }
}

/// Wire protocol family shared by several backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFamily {
    OpenAICompatible,
    Azure,
    Anthropic,
    Gemini,
    Ollama,
}

/// Every backend the relay knows how to talk to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    OpenAI,
    Azure,
    Anthropic,
    Gemini,
    Mistral,
    Groq,
    DeepSeek,
    Together,
    Perplexity,
    XAi,
    OpenRouter,
    Fireworks,
    Cohere,
    Ollama,
    LmStudio,
    Vllm,
}

/// Built-in defaults for a backend kind
#[derive(Debug, Clone, Copy)]
pub struct KindDefaults {
    pub base_url: Option<&'static str>,
    pub model: &'static str,
    pub max_context_tokens: usize,
    pub capabilities: Capabilities,
    pub pricing: Pricing,
    /// Environment variable holding the credential, `None` for local servers
    pub credential_env: Option<&'static str>,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 16] = [
        ProviderKind::OpenAI,
        ProviderKind::Azure,
        ProviderKind::Anthropic,
        ProviderKind::Gemini,
        ProviderKind::Mistral,
        ProviderKind::Groq,
        ProviderKind::DeepSeek,
        ProviderKind::Together,
        ProviderKind::Perplexity,
        ProviderKind::XAi,
        ProviderKind::OpenRouter,
        ProviderKind::Fireworks,
        ProviderKind::Cohere,
        ProviderKind::Ollama,
        ProviderKind::LmStudio,
        ProviderKind::Vllm,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Azure => "azure",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Gemini => "gemini",
            ProviderKind::Mistral => "mistral",
            ProviderKind::Groq => "groq",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Together => "together",
            ProviderKind::Perplexity => "perplexity",
            ProviderKind::XAi => "xai",
            ProviderKind::OpenRouter => "openrouter",
            ProviderKind::Fireworks => "fireworks",
            ProviderKind::Cohere => "cohere",
            ProviderKind::Ollama => "ollama",
            ProviderKind::LmStudio => "lmstudio",
            ProviderKind::Vllm => "vllm",
        }
    }

    pub fn family(&self) -> WireFamily {
        match self {
            ProviderKind::Azure => WireFamily::Azure,
            ProviderKind::Anthropic => WireFamily::Anthropic,
            ProviderKind::Gemini => WireFamily::Gemini,
            ProviderKind::Ollama => WireFamily::Ollama,
            _ => WireFamily::OpenAICompatible,
        }
    }

    /// Local inference servers need no credential
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            ProviderKind::Ollama | ProviderKind::LmStudio | ProviderKind::Vllm
        )
    }

    pub fn defaults(&self) -> KindDefaults {
        let text_tools = Capabilities::new(true, true, false, true);
        match self {
            ProviderKind::OpenAI => KindDefaults {
                base_url: Some("https://api.openai.com/v1"),
                model: "gpt-4o-mini",
                max_context_tokens: 128_000,
                capabilities: Capabilities::full(),
                pricing: Pricing::per_1k(0.000_15, 0.000_6),
                credential_env: Some("OPENAI_API_KEY"),
            },
            ProviderKind::Azure => KindDefaults {
                base_url: None,
                model: "gpt-4o",
                max_context_tokens: 128_000,
                capabilities: Capabilities::full(),
                pricing: Pricing::per_1k(0.002_5, 0.01),
                credential_env: Some("AZURE_OPENAI_API_KEY"),
            },
            ProviderKind::Anthropic => KindDefaults {
                base_url: Some("https://api.anthropic.com/v1"),
                model: "claude-3-5-haiku-latest",
                max_context_tokens: 200_000,
                capabilities: Capabilities::new(true, true, true, false),
                pricing: Pricing::per_1k(0.000_8, 0.004),
                credential_env: Some("ANTHROPIC_API_KEY"),
            },
            ProviderKind::Gemini => KindDefaults {
                base_url: Some("https://generativelanguage.googleapis.com/v1beta"),
                model: "gemini-1.5-flash",
                max_context_tokens: 1_000_000,
                capabilities: Capabilities::new(false, true, true, true),
                pricing: Pricing::per_1k(0.000_075, 0.000_3),
                credential_env: Some("GEMINI_API_KEY"),
            },
            ProviderKind::Mistral => KindDefaults {
                base_url: Some("https://api.mistral.ai/v1"),
                model: "mistral-small-latest",
                max_context_tokens: 32_000,
                capabilities: text_tools,
                pricing: Pricing::per_1k(0.000_2, 0.000_6),
                credential_env: Some("MISTRAL_API_KEY"),
            },
            ProviderKind::Groq => KindDefaults {
                base_url: Some("https://api.groq.com/openai/v1"),
                model: "llama-3.1-8b-instant",
                max_context_tokens: 131_072,
                capabilities: text_tools,
                pricing: Pricing::per_1k(0.000_05, 0.000_08),
                credential_env: Some("GROQ_API_KEY"),
            },
            ProviderKind::DeepSeek => KindDefaults {
                base_url: Some("https://api.deepseek.com/v1"),
                model: "deepseek-chat",
                max_context_tokens: 64_000,
                capabilities: text_tools,
                pricing: Pricing::per_1k(0.000_27, 0.001_1),
                credential_env: Some("DEEPSEEK_API_KEY"),
            },
            ProviderKind::Together => KindDefaults {
                base_url: Some("https://api.together.xyz/v1"),
                model: "meta-llama/Llama-3.3-70B-Instruct-Turbo",
                max_context_tokens: 131_072,
                capabilities: Capabilities::new(true, false, false, true),
                pricing: Pricing::per_1k(0.000_88, 0.000_88),
                credential_env: Some("TOGETHER_API_KEY"),
            },
            ProviderKind::Perplexity => KindDefaults {
                base_url: Some("https://api.perplexity.ai"),
                model: "sonar",
                max_context_tokens: 127_072,
                capabilities: Capabilities::new(true, false, false, false),
                pricing: Pricing::per_1k(0.001, 0.001),
                credential_env: Some("PERPLEXITY_API_KEY"),
            },
            ProviderKind::XAi => KindDefaults {
                base_url: Some("https://api.x.ai/v1"),
                model: "grok-2-latest",
                max_context_tokens: 131_072,
                capabilities: text_tools,
                pricing: Pricing::per_1k(0.002, 0.01),
                credential_env: Some("XAI_API_KEY"),
            },
            ProviderKind::OpenRouter => KindDefaults {
                base_url: Some("https://openrouter.ai/api/v1"),
                model: "openai/gpt-4o-mini",
                max_context_tokens: 128_000,
                capabilities: Capabilities::full(),
                pricing: Pricing::per_1k(0.000_15, 0.000_6),
                credential_env: Some("OPENROUTER_API_KEY"),
            },
            ProviderKind::Fireworks => KindDefaults {
                base_url: Some("https://api.fireworks.ai/inference/v1"),
                model: "accounts/fireworks/models/llama-v3p1-8b-instruct",
                max_context_tokens: 131_072,
                capabilities: Capabilities::new(true, false, false, true),
                pricing: Pricing::per_1k(0.000_2, 0.000_2),
                credential_env: Some("FIREWORKS_API_KEY"),
            },
            ProviderKind::Cohere => KindDefaults {
                base_url: Some("https://api.cohere.ai/compatibility/v1"),
                model: "command-r-08-2024",
                max_context_tokens: 128_000,
                capabilities: text_tools,
                pricing: Pricing::per_1k(0.000_15, 0.000_6),
                credential_env: Some("COHERE_API_KEY"),
            },
            ProviderKind::Ollama => KindDefaults {
                base_url: Some("http://localhost:11434"),
                model: "llama3.1",
                max_context_tokens: 8_192,
                capabilities: Capabilities::new(true, false, false, true),
                pricing: Pricing::free(),
                credential_env: None,
            },
            ProviderKind::LmStudio => KindDefaults {
                base_url: Some("http://localhost:1234/v1"),
                model: "local-model",
                max_context_tokens: 8_192,
                capabilities: Capabilities::new(true, false, false, false),
                pricing: Pricing::free(),
                credential_env: None,
            },
            ProviderKind::Vllm => KindDefaults {
                base_url: Some("http://localhost:8000/v1"),
                model: "meta-llama/Llama-3.1-8B-Instruct",
                max_context_tokens: 32_768,
                capabilities: Capabilities::new(true, false, false, true),
                pricing: Pricing::free(),
                credential_env: None,
            },
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved, immutable configuration of one provider
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub enabled: bool,
    pub capabilities: Capabilities,
    pub max_context_tokens: usize,
    /// Default model (the deployment name for Azure)
    pub model: String,
    /// Name of the environment variable the credential was read from
    pub api_key_env: Option<String>,
    pub api_key: Option<SecretString>,
    pub base_url: String,
    /// Azure `api-version` query parameter
    pub api_version: Option<String>,
    pub pricing: Pricing,
    pub health: HealthPolicy,
}

impl ProviderConfig {
    /// Create an enabled provider populated from the kind's defaults
    pub fn new(name: impl Into<String>, kind: ProviderKind) -> Self {
        let defaults = kind.defaults();
        Self {
            name: name.into(),
            kind,
            enabled: true,
            capabilities: defaults.capabilities,
            max_context_tokens: defaults.max_context_tokens,
            model: defaults.model.to_string(),
            api_key_env: defaults.credential_env.map(str::to_string),
            api_key: None,
            base_url: defaults.base_url.unwrap_or_default().to_string(),
            api_version: None,
            pricing: defaults.pricing,
            health: HealthPolicy::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<SecretString>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_max_context_tokens(mut self, max_context_tokens: usize) -> Self {
        self.max_context_tokens = max_context_tokens;
        self
    }

    pub fn with_pricing(mut self, pricing: Pricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_health(mut self, health: HealthPolicy) -> Self {
        self.health = health;
        self
    }

    pub fn with_api_version(mut self, api_version: impl Into<String>) -> Self {
        self.api_version = Some(api_version.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// The credential, if one was resolved
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_ref()
            .filter(|key| !key.is_empty())
            .map(SecretString::expose_secret)
    }

    /// Base URL without a trailing slash
    pub fn base_url(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// Build the adapter matching the provider's wire family
pub fn create_adapter(config: ProviderConfig, http: HttpClient) -> Arc<dyn ProviderAdapter> {
    match config.kind.family() {
        WireFamily::OpenAICompatible => {
            Arc::new(crate::providers::openai::OpenAICompatibleProvider::new(config, http))
        }
        WireFamily::Azure => Arc::new(crate::providers::azure::AzureProvider::new(config, http)),
        WireFamily::Anthropic => {
            Arc::new(crate::providers::anthropic::AnthropicProvider::new(config, http))
        }
        WireFamily::Gemini => Arc::new(crate::providers::gemini::GeminiProvider::new(config, http)),
        WireFamily::Ollama => Arc::new(crate::providers::ollama::OllamaProvider::new(config, http)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_round_trips_through_serde() {
        for kind in ProviderKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
            let back: ProviderKind = serde_json::from_str(&json).unwrap();
            assert_eq!(back, kind);
        }
    }

    #[test]
    fn test_local_kinds_need_no_credential() {
        for kind in ProviderKind::ALL {
            assert_eq!(kind.is_local(), kind.defaults().credential_env.is_none());
        }
    }

    #[test]
    fn test_only_azure_lacks_default_url() {
        let missing: Vec<_> = ProviderKind::ALL
            .iter()
            .filter(|k| k.defaults().base_url.is_none())
            .collect();
        assert_eq!(missing, vec![&ProviderKind::Azure]);
    }

    #[test]
    fn test_capabilities_supports_all() {
        let caps = Capabilities {
            streaming: true,
            json_mode: true,
            ..Default::default()
        };
        assert!(caps.supports_all(&[Capability::Streaming, Capability::JsonMode]));
        assert!(!caps.supports_all(&[Capability::Vision]));
        assert!(caps.supports_all(&[]));
    }

    #[test]
    fn test_empty_api_key_is_treated_as_missing() {
        let config = ProviderConfig::new("openai", ProviderKind::OpenAI).with_api_key("");
        assert!(config.api_key().is_none());
    }
}
