//! Public entry point of the relay
//!
//! [`RequestDispatcher`] validates requests and hands them to the
//! [`FailoverOrchestrator`]. It also answers the read-only queries used by
//! dashboards: recommendations, provider status and usage.

use crate::config::{RelayConfig, TaskTypeConfig};
use crate::cost::{CostTracker, UsageRecord};
use crate::error::{RelayError, RelayResult};
use crate::health::{HealthMonitor, HealthStatus, ProbeHandle};
use crate::http::HttpClient;
use crate::orchestrator::FailoverOrchestrator;
use crate::protocol::{GenerationRequest, GenerationResult, StreamingGeneration, TokenUsage};
use crate::providers::{Capabilities, ErrorKind, ProviderError, ProviderKind};
use crate::registry::ProviderRegistry;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// Status line for one provider, as shown on dashboards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderReport {
    pub kind: ProviderKind,
    pub enabled: bool,
    pub model: String,
    pub status: HealthStatus,
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
    pub consecutive_failures: u32,
    pub cooling_down: bool,
    pub requests_count: u64,
    pub total_cost: f64,
    pub daily_cost: f64,
    pub capabilities: Capabilities,
}

/// Result of a one-off provider test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderTestReport {
    pub provider: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    pub latency_ms: u64,
    pub cost: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Validates and dispatches generation requests
#[derive(Debug)]
pub struct RequestDispatcher {
    orchestrator: FailoverOrchestrator,
    attempt_timeout: Duration,
}

impl RequestDispatcher {
    /// Build the whole stack from configuration
    pub fn from_config(config: &RelayConfig) -> RelayResult<Self> {
        let http = HttpClient::from_config(&config.connection)?;
        let registry = ProviderRegistry::from_config(config, http)?;
        Ok(Self::new(Arc::new(registry), config))
    }

    /// Build on an existing registry with fresh health and cost state
    pub fn new(registry: Arc<ProviderRegistry>, config: &RelayConfig) -> Self {
        let health = Arc::new(HealthMonitor::new(Arc::clone(&registry)));
        let costs = Arc::new(CostTracker::new(&registry));
        Self::with_components(registry, health, costs, config)
    }

    /// Build from explicitly constructed components
    pub fn with_components(
        registry: Arc<ProviderRegistry>,
        health: Arc<HealthMonitor>,
        costs: Arc<CostTracker>,
        config: &RelayConfig,
    ) -> Self {
        let orchestrator = FailoverOrchestrator::new(
            registry,
            health,
            costs,
            config.failover.clone(),
            config.task_types.clone(),
        );
        Self {
            orchestrator,
            attempt_timeout: config.failover.attempt_timeout(),
        }
    }

    pub fn orchestrator(&self) -> &FailoverOrchestrator {
        &self.orchestrator
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        self.orchestrator.registry()
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        self.orchestrator.health()
    }

    pub fn costs(&self) -> &Arc<CostTracker> {
        self.orchestrator.costs()
    }

    pub fn task_types(&self) -> &[TaskTypeConfig] {
        self.orchestrator.task_types()
    }

    /// Generate text for a prompt
    pub async fn generate(
        &self,
        prompt: impl Into<String>,
        task_type: impl Into<String>,
        preferred_provider: Option<&str>,
    ) -> RelayResult<GenerationResult> {
        let mut request = GenerationRequest::new(prompt).with_task_type(task_type);
        request.preferred_provider = preferred_provider.map(str::to_string);
        self.execute(request).await
    }

    /// Validate and run a full request
    pub async fn execute(&self, request: GenerationRequest) -> RelayResult<GenerationResult> {
        self.validate(&request)?;
        self.orchestrator.execute(&request).await
    }

    /// Validate and open a streaming generation
    pub async fn stream(&self, request: GenerationRequest) -> RelayResult<StreamingGeneration> {
        self.validate(&request)?;
        self.orchestrator.execute_stream(&request).await
    }


    /// Check a request before any provider sees it
    pub fn validate(&self, request: &GenerationRequest) -> RelayResult<()> {
        if request.prompt.trim().is_empty() {
            return Err(RelayError::invalid_request("prompt", "Prompt cannot be empty"));
        }

        if self
            .orchestrator
            .required_capabilities(&request.task_type)
            .is_none()
        {
            return Err(RelayError::UnknownTaskType(request.task_type.clone()));
        }

        if let Some(temperature) = request.params.temperature {
            if !(0.0..=2.0).contains(&temperature) {
                return Err(RelayError::invalid_request(
                    "temperature",
                    format!("Must be between 0.0 and 2.0, got {}", temperature),
                ));
            }
        }

        if request.params.max_tokens == Some(0) {
            return Err(RelayError::invalid_request(
                "max_tokens",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Provider a request for `task_type` would try first
    pub fn recommend_provider(&self, task_type: &str) -> RelayResult<String> {
        if self.orchestrator.required_capabilities(task_type).is_none() {
            return Err(RelayError::UnknownTaskType(task_type.to_string()));
        }

        self.orchestrator
            .select_candidates(task_type, None)
            .first()
            .map(|config| config.name.clone())
            .ok_or(RelayError::NoProviderAvailable)
    }

    /// Health and usage of every registered provider
    pub fn list_provider_status(&self) -> BTreeMap<String, ProviderReport> {
        let health = self.health().snapshot();
        let usage = self.costs().summary();

        self.registry()
            .iter()
            .map(|config| {
                let status = health.get(&config.name);
                let record = usage.get(&config.name);
                let report = ProviderReport {
                    kind: config.kind,
                    enabled: config.enabled,
                    model: config.model.clone(),
                    status: status.map_or(HealthStatus::Healthy, |s| s.status),
                    success_rate: status.map_or(100.0, |s| s.success_rate),
                    avg_response_time_ms: status.map_or(0.0, |s| s.avg_response_time_ms),
                    consecutive_failures: status.map_or(0, |s| s.consecutive_failures),
                    cooling_down: status.is_some_and(|s| s.cooling_down),
                    requests_count: record.map_or(0, |r| r.requests),
                    total_cost: record.map_or(0.0, |r| r.total_cost),
                    daily_cost: record.map_or(0.0, |r| r.daily_cost),
                    capabilities: config.capabilities,
                };
                (config.name.clone(), report)
            })
            .collect()
    }

    /// Send one sample prompt to a specific provider, without failover.
    ///
    /// The outcome counts towards the provider's health and usage like any
    /// other request.
    pub async fn test_provider(
        &self,
        name: &str,
        sample_prompt: &str,
    ) -> RelayResult<ProviderTestReport> {
        let adapter = self
            .registry()
            .adapter(name)
            .ok_or_else(|| RelayError::UnknownProvider(name.to_string()))?;

        let prompt = if sample_prompt.trim().is_empty() {
            "Reply with the single word: ok"
        } else {
            sample_prompt
        };
        let request = GenerationRequest::new(prompt).with_preferred_provider(name);

        let started = Instant::now();
        let outcome = match tokio::time::timeout(self.attempt_timeout, adapter.generate(&request)).await {
            Ok(outcome) => outcome,
            Err(_) => Err(ProviderError::timeout(format!(
                "No response within {} ms",
                self.attempt_timeout.as_millis()
            ))),
        };
        let latency = started.elapsed();
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);

        let report = match outcome {
            Ok(completion) => {
                let usage = completion
                    .usage
                    .unwrap_or_else(|| TokenUsage::estimate(prompt, &completion.text));
                let cost = adapter.estimate_cost(&usage);
                self.health().record_outcome(name, true, latency);
                self.costs().record_usage(name, &usage, cost, true);
                ProviderTestReport {
                    provider: name.to_string(),
                    success: true,
                    response: Some(completion.text),
                    latency_ms,
                    cost,
                    error_kind: None,
                    error: None,
                }
            }
            Err(error) => {
                self.health().record_outcome(name, false, latency);
                self.costs().record(name, 0.0, false);
                warn!(provider = %name, kind = %error.kind, error = %error.message, "Provider test failed");
                ProviderTestReport {
                    provider: name.to_string(),
                    success: false,
                    response: None,
                    latency_ms,
                    cost: 0.0,
                    error_kind: Some(error.kind),
                    error: Some(error.message),
                }
            }
        };

        info!(provider = %name, success = report.success, latency_ms, "Provider test finished");
        Ok(report)
    }

    pub fn usage_summary(&self) -> BTreeMap<String, UsageRecord> {
        self.costs().summary()
    }

    /// Start background health probes; must be called inside a tokio runtime
    pub fn start_health_probes(&self) -> ProbeHandle {
        self.health().spawn_probe_loop()
    }
}
