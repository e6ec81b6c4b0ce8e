//! Core protocol types for generation requests and results

use crate::config::GENERAL_TASK;
use crate::error::AttemptFailure;
use crate::providers::adapter::TextStream;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Optional generation parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Sampling temperature (0.0 to 2.0)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// System instructions sent ahead of the prompt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
}

/// A request for text generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Correlation id, propagated to providers as `X-Request-ID`
    #[serde(default = "Uuid::new_v4")]
    pub request_id: Uuid,

    pub prompt: String,

    /// Free-form tag such as "evidence_analysis" or "general"
    #[serde(default = "default_task_type")]
    pub task_type: String,

    /// Provider to try first while it is viable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preferred_provider: Option<String>,

    #[serde(default)]
    pub params: GenerationParams,
}

fn default_task_type() -> String {
    GENERAL_TASK.to_string()
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            prompt: prompt.into(),
            task_type: default_task_type(),
            preferred_provider: None,
            params: GenerationParams::default(),
        }
    }

    pub fn with_task_type(mut self, task_type: impl Into<String>) -> Self {
        self.task_type = task_type.into();
        self
    }

    pub fn with_preferred_provider(mut self, provider: impl Into<String>) -> Self {
        self.preferred_provider = Some(provider.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.params.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.params.temperature = Some(temperature);
        self
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.params.system = Some(system.into());
        self
    }

    /// Rough context size: ~4 characters per token for the input plus the
    /// requested output budget
    pub fn estimated_tokens(&self) -> usize {
        let input_chars =
            self.prompt.chars().count() + self.params.system.as_deref().map_or(0, |s| s.chars().count());
        input_chars.div_ceil(4) + self.params.max_tokens.unwrap_or(0) as usize
    }
}

/// Token accounting for one generation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

impl TokenUsage {
    pub fn new(prompt_tokens: u32, completion_tokens: u32) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
        }
    }

    pub fn total(&self) -> u32 {
        self.prompt_tokens.saturating_add(self.completion_tokens)
    }

    /// Character-based estimate for backends that report no usage
    pub fn estimate(prompt: &str, completion: &str) -> Self {
        Self::new(estimate_tokens(prompt), estimate_tokens(completion))
    }
}

fn estimate_tokens(text: &str) -> u32 {
    u32::try_from(text.chars().count().div_ceil(4)).unwrap_or(u32::MAX)
}

/// Raw output of a single adapter call
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub text: String,
    /// Model that actually served the request
    pub model: String,
    pub usage: Option<TokenUsage>,
}

/// Outcome of an orchestrated generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub request_id: Uuid,
    pub text: String,
    /// Provider that produced the text
    pub provider: String,
    pub model: String,
    pub latency_ms: u64,
    pub cost: f64,
    pub success: bool,
    pub usage: TokenUsage,
    /// Failures of earlier candidates that the winning provider recovered from
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recovered_failures: Vec<AttemptFailure>,
    /// Summary of `recovered_failures`, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// An opened stream and the provider serving it
pub struct StreamingGeneration {
    pub request_id: Uuid,
    pub provider: String,
    pub model: String,
    pub recovered_failures: Vec<AttemptFailure>,
    pub stream: TextStream,
}

impl fmt::Debug for StreamingGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamingGeneration")
            .field("request_id", &self.request_id)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("recovered_failures", &self.recovered_failures)
            .finish_non_exhaustive()
    }
}
