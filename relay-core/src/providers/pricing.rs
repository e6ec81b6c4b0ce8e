//! Published per-token pricing

use crate::protocol::types::TokenUsage;
use serde::{Deserialize, Serialize};

/// Price per 1K tokens in USD
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Pricing {
    /// Cost per 1K prompt tokens
    #[serde(default)]
    pub input_per_1k: f64,

    /// Cost per 1K generated tokens
    #[serde(default)]
    pub output_per_1k: f64,
}

impl Pricing {
    pub const fn per_1k(input_per_1k: f64, output_per_1k: f64) -> Self {
        Self {
            input_per_1k,
            output_per_1k,
        }
    }

    /// Pricing for self-hosted inference
    pub const fn free() -> Self {
        Self::per_1k(0.0, 0.0)
    }

    pub fn is_free(&self) -> bool {
        self.input_per_1k == 0.0 && self.output_per_1k == 0.0
    }

    /// Cost of a request with the given usage
    pub fn cost(&self, usage: &TokenUsage) -> f64 {
        let input = f64::from(usage.prompt_tokens) / 1000.0 * self.input_per_1k;
        let output = f64::from(usage.completion_tokens) / 1000.0 * self.output_per_1k;
        input + output
    }
}
