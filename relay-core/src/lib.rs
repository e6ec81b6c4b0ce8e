//! Relay Core Library
//!
//! Health-aware routing of text generation across many LLM providers. A
//! [`RequestDispatcher`] ranks the enabled providers for each request, tries
//! them in order and fails over transparently, while the [`HealthMonitor`]
//! and [`CostTracker`] keep per-provider state.
//!
//! ```no_run
//! use relay_core::{RelayConfig, RequestDispatcher};
//!
//! # async fn run() -> Result<(), relay_core::RelayError> {
//! let config = RelayConfig::from_env()?;
//! let dispatcher = RequestDispatcher::from_config(&config)?;
//! let result = dispatcher.generate("Summarise ISO 27001 A.5", "general", None).await?;
//! println!("{} answered in {} ms", result.provider, result.latency_ms);
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod config;
pub mod cost;
pub mod dispatcher;
pub mod error;
pub mod health;
pub mod http;
pub mod logging;
pub mod orchestrator;
pub mod protocol;
pub mod providers;
pub mod registry;

pub use config::{load_from_json, load_from_yaml, RelayConfig};
pub use cost::{CostTracker, UsageRecord};
pub use dispatcher::{ProviderReport, ProviderTestReport, RequestDispatcher};
pub use error::{AllProvidersFailed, AttemptFailure, RelayError, RelayResult};
pub use health::{HealthMonitor, HealthStatus, ProbeHandle, ProviderStatus};
pub use orchestrator::FailoverOrchestrator;
pub use protocol::{GenerationRequest, GenerationResult, StreamingGeneration, TokenUsage};
pub use providers::{ErrorKind, ProviderAdapter, ProviderConfig, ProviderError, ProviderKind};
pub use registry::ProviderRegistry;

/// Returns the version of the relay core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
