//! Backoff policy for retrying the last remaining candidate
//!
//! Failover to another provider is the primary recovery mechanism. A short,
//! jittered exponential backoff is only applied when no other candidate is
//! left to try.

use crate::providers::error::ProviderError;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for retry backoff
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetryPolicy {
    /// Delay before the first retry (milliseconds)
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Upper bound for any computed delay (milliseconds)
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Base for exponential backoff (e.g., 2.0 for doubling)
    #[serde(default = "default_exponential_base")]
    pub exponential_base: f64,

    /// Jitter factor (0.0 to 1.0) to randomize delays
    #[serde(default = "default_jitter")]
    pub jitter_factor: f64,

    /// Whether to honour a provider's retry-after hint
    #[serde(default = "default_true")]
    pub respect_retry_after: bool,
}

fn default_initial_delay() -> u64 {
    250
}
fn default_max_delay() -> u64 {
    2_000
}
fn default_exponential_base() -> f64 {
    2.0
}
fn default_jitter() -> f64 {
    0.1
}
fn default_true() -> bool {
    true
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            exponential_base: default_exponential_base(),
            jitter_factor: default_jitter(),
            respect_retry_after: true,
        }
    }
}

impl RetryPolicy {
    /// A policy that never waits
    pub fn immediate() -> Self {
        Self {
            initial_delay_ms: 0,
            max_delay_ms: 0,
            jitter_factor: 0.0,
            respect_retry_after: false,
            ..Default::default()
        }
    }

    /// Calculate the delay before retry number `attempt` (0-based).
    ///
    /// A retry-after hint wins over the computed backoff but is still capped
    /// at `max_delay_ms`.
    pub fn calculate_delay(&self, attempt: u32, error: &ProviderError) -> Duration {
        let cap = Duration::from_millis(self.max_delay_ms);

        if self.respect_retry_after {
            if let Some(retry_after) = error.retry_after {
                return retry_after.min(cap);
            }
        }

        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let base_delay = self.initial_delay_ms as f64 * self.exponential_base.powi(exponent);
        let capped_delay = base_delay.min(self.max_delay_ms as f64);

        let delay_with_jitter = if self.jitter_factor > 0.0 && capped_delay > 0.0 {
            let jitter_range = capped_delay * self.jitter_factor;
            let jitter = rand::thread_rng().gen_range(-jitter_range..=jitter_range);
            (capped_delay + jitter).clamp(0.0, self.max_delay_ms as f64)
        } else {
            capped_delay
        };

        Duration::from_millis(delay_with_jitter as u64)
    }
}
