//! Candidate ranking and failover across providers
//!
//! For every request the orchestrator ranks the enabled providers, then tries
//! them strictly in order until one succeeds. Provider errors never escape:
//! each one becomes a health update and a move to the next candidate. Only
//! when every candidate has failed does the caller see
//! [`AllProvidersFailed`].

use crate::config::{FailoverConfig, TaskTypeConfig, GENERAL_TASK};
use crate::cost::CostTracker;
use crate::error::{AllProvidersFailed, AttemptFailure, RelayError, RelayResult};
use crate::health::{HealthMonitor, HealthStatus};
use crate::protocol::{GenerationRequest, GenerationResult, StreamingGeneration, TokenUsage};
use crate::providers::{Capability, ProviderAdapter, ProviderConfig, ProviderError};
use crate::registry::ProviderRegistry;
use std::cmp::Ordering;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

/// Drives candidate selection and the failover sequence
#[derive(Debug)]
pub struct FailoverOrchestrator {
    registry: Arc<ProviderRegistry>,
    health: Arc<HealthMonitor>,
    costs: Arc<CostTracker>,
    failover: FailoverConfig,
    task_types: Vec<TaskTypeConfig>,
}

/// A successful attempt and what led up to it
struct Attempted<T> {
    value: T,
    adapter: Arc<dyn ProviderAdapter>,
    failures: Vec<AttemptFailure>,
}

impl FailoverOrchestrator {
    pub fn new(
        registry: Arc<ProviderRegistry>,
        health: Arc<HealthMonitor>,
        costs: Arc<CostTracker>,
        failover: FailoverConfig,
        mut task_types: Vec<TaskTypeConfig>,
    ) -> Self {
        if !task_types.iter().any(|t| t.name == GENERAL_TASK) {
            task_types.insert(0, TaskTypeConfig::new(GENERAL_TASK, Vec::new()));
        }
        Self {
            registry,
            health,
            costs,
            failover,
            task_types,
        }
    }

    pub fn registry(&self) -> &Arc<ProviderRegistry> {
        &self.registry
    }

    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    pub fn costs(&self) -> &Arc<CostTracker> {
        &self.costs
    }

    pub fn task_types(&self) -> &[TaskTypeConfig] {
        &self.task_types
    }

    /// Capabilities required by a task type, `None` for unknown task types
    pub fn required_capabilities(&self, task_type: &str) -> Option<&[Capability]> {
        self.task_types
            .iter()
            .find(|t| t.name == task_type)
            .map(|t| t.requires.as_slice())
    }

    /// Ordered providers to try for a task type.
    ///
    /// A viable preferred provider goes first; an unhealthy one goes after the
    /// healthy and degraded candidates. The rest are ordered by status, then
    /// success rate, then average latency, with the configured default
    /// provider winning exact ties. Providers lacking what the task needs
    /// come after those that have it. Providers cooling down are left out
    /// unless nothing else is left.
    pub fn select_candidates(
        &self,
        task_type: &str,
        preferred_provider: Option<&str>,
    ) -> Vec<&ProviderConfig> {
        self.rank(task_type, preferred_provider, 0, false)
    }

    fn rank(
        &self,
        task_type: &str,
        preferred_provider: Option<&str>,
        estimated_tokens: usize,
        streaming: bool,
    ) -> Vec<&ProviderConfig> {
        let preferred = preferred_provider.and_then(|name| match self.registry.get(name) {
            Some(config) if config.enabled => Some(config),
            Some(_) => {
                warn!(provider = %name, "Preferred provider is disabled, ignoring preference");
                None
            }
            None => {
                warn!(provider = %name, "Preferred provider is unknown, ignoring preference");
                None
            }
        });

        let others: Vec<&ProviderConfig> = self
            .registry
            .enabled_providers()
            .into_iter()
            .filter(|c| preferred.is_none_or(|p| p.name != c.name))
            .collect();

        let required = self.required_capabilities(task_type).unwrap_or(&[]);
        let default_provider = self.registry.default_provider();
        let is_default = |c: &ProviderConfig| Some(c.name.as_str()) == default_provider;

        let mut stats: Vec<_> = others
            .into_iter()
            .map(|config| {
                let fits = config.capabilities.supports_all(required)
                    && (!streaming || config.capabilities.streaming)
                    && estimated_tokens <= config.max_context_tokens;
                let status = self.health.status(&config.name);
                let cooling = status.as_ref().is_some_and(|s| s.cooling_down);
                (config, status, cooling, fits)
            })
            .collect();

        // Providers that do not fit the task stay behind every one that does
        stats.sort_by(|(ca, a, _, fits_a), (cb, b, _, fits_b)| {
            fits_b.cmp(fits_a).then_with(|| match (a, b) {
                (Some(a), Some(b)) => a
                    .status
                    .rank()
                    .cmp(&b.status.rank())
                    .then_with(|| {
                        b.success_rate
                            .partial_cmp(&a.success_rate)
                            .unwrap_or(Ordering::Equal)
                    })
                    .then_with(|| {
                        a.avg_response_time_ms
                            .partial_cmp(&b.avg_response_time_ms)
                            .unwrap_or(Ordering::Equal)
                    })
                    .then_with(|| is_default(*cb).cmp(&is_default(*ca))),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            })
        });

        let (cooling, active): (Vec<_>, Vec<_>) =
            stats.into_iter().partition(|(_, _, cooling, _)| *cooling);
        if active.iter().any(|(_, _, _, fits)| !fits) {
            debug!(
                task_type = %task_type,
                "Some providers do not satisfy the task requirements, trying them last"
            );
        }
        let mut ordered: Vec<&ProviderConfig> = active.into_iter().map(|(c, ..)| c).collect();

        if let Some(preferred) = preferred {
            if self.health.health_status(&preferred.name) == Some(HealthStatus::Unhealthy) {
                let viable = ordered
                    .iter()
                    .rposition(|c| {
                        self.health.health_status(&c.name) != Some(HealthStatus::Unhealthy)
                    })
                    .map_or(0, |i| i + 1);
                debug!(provider = %preferred.name, "Preferred provider is unhealthy, trying it after viable candidates");
                ordered.insert(viable, preferred);
            } else {
                ordered.insert(0, preferred);
            }
        }

        if ordered.is_empty() {
            ordered.extend(cooling.into_iter().map(|(c, ..)| c));
        }

        ordered
    }

    fn candidates_for(&self, request: &GenerationRequest, streaming: bool) -> Vec<&ProviderConfig> {
        let estimated = request.estimated_tokens();
        let candidates = self.rank(
            &request.task_type,
            request.preferred_provider.as_deref(),
            estimated,
            streaming,
        );
        debug!(
            request_id = %request.request_id,
            task_type = %request.task_type,
            estimated_tokens = estimated,
            candidates = ?candidates.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
            "Candidates selected"
        );
        candidates
    }

    /// Try candidates in order and return the first successful generation
    pub async fn execute(&self, request: &GenerationRequest) -> RelayResult<GenerationResult> {
        let span = info_span!("generate", request_id = %request.request_id, task_type = %request.task_type);
        self.generate_with_failover(request).instrument(span).await
    }

    async fn generate_with_failover(&self, request: &GenerationRequest) -> RelayResult<GenerationResult> {
        let started = Instant::now();
        let candidates = self.candidates_for(request, false);

        let attempted = self
            .run_attempts(&candidates, started, true, move |adapter| async move {
                adapter.generate(request).await
            })
            .await?;

        let Attempted {
            value: completion,
            adapter,
            failures,
        } = attempted;

        let usage = completion
            .usage
            .unwrap_or_else(|| TokenUsage::estimate(&request.prompt, &completion.text));
        let cost = adapter.estimate_cost(&usage);
        self.costs.record_usage(adapter.name(), &usage, cost, true);

        let latency_ms = elapsed_ms(started);
        info!(
            provider = %adapter.name(),
            model = %completion.model,
            latency_ms,
            cost,
            failovers = failures.len(),
            "Generation succeeded"
        );

        Ok(GenerationResult {
            request_id: request.request_id,
            text: completion.text,
            provider: adapter.name().to_string(),
            model: completion.model,
            latency_ms,
            cost,
            success: true,
            usage,
            error: recovery_summary(&failures),
            recovered_failures: failures,
        })
    }

    /// Open a stream on the first candidate that accepts it.
    ///
    /// Failover only happens while the stream is being opened; errors that
    /// arrive mid-stream belong to the caller. Cost is recorded for the
    /// prompt side only.
    pub async fn execute_stream(
        &self,
        request: &GenerationRequest,
    ) -> RelayResult<StreamingGeneration> {
        let span = info_span!("stream", request_id = %request.request_id, task_type = %request.task_type);
        self.stream_with_failover(request).instrument(span).await
    }

    async fn stream_with_failover(&self, request: &GenerationRequest) -> RelayResult<StreamingGeneration> {
        let started = Instant::now();
        let candidates = self.candidates_for(request, true);

        let attempted = self
            .run_attempts(&candidates, started, false, move |adapter| async move {
                adapter.stream(request).await
            })
            .await?;

        let Attempted {
            value: stream,
            adapter,
            failures,
        } = attempted;

        let usage = TokenUsage::estimate(&request.prompt, "");
        let cost = adapter.estimate_cost(&usage);
        self.costs.record_usage(adapter.name(), &usage, cost, true);
        info!(
            provider = %adapter.name(),
            latency_ms = elapsed_ms(started),
            failovers = failures.len(),
            "Stream opened"
        );

        Ok(StreamingGeneration {
            request_id: request.request_id,
            provider: adapter.name().to_string(),
            model: adapter.config().model.clone(),
            recovered_failures: failures,
            stream,
        })
    }

    /// Attempt each candidate in order, recording every outcome
    async fn run_attempts<T, F, Fut>(
        &self,
        candidates: &[&ProviderConfig],
        started: Instant,
        retry_last: bool,
        attempt: F,
    ) -> RelayResult<Attempted<T>>
    where
        F: Fn(Arc<dyn ProviderAdapter>) -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        if candidates.is_empty() {
            return Err(RelayError::NoProviderAvailable);
        }

        let attempt_timeout = self.failover.attempt_timeout();
        let deadline = started + self.failover.request_timeout();
        let last = candidates.len() - 1;
        let mut failures = Vec::new();

        for (index, config) in candidates.iter().enumerate() {
            let Some(adapter) = self.registry.adapter(&config.name) else {
                continue;
            };
            let mut retries = 0;

            loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    warn!(provider = %config.name, "Request deadline exceeded, giving up");
                    return Err(AllProvidersFailed { attempts: failures }.into());
                }

                let budget = attempt_timeout.min(remaining);
                let attempt_started = Instant::now();
                let (outcome, cut_short) =
                    match tokio::time::timeout(budget, attempt(Arc::clone(&adapter))).await {
                        Ok(outcome) => (outcome, false),
                        Err(_) => (
                            Err(ProviderError::timeout(format!(
                                "No response within {} ms",
                                budget.as_millis()
                            ))),
                            budget < attempt_timeout,
                        ),
                    };
                let latency = attempt_started.elapsed();

                let error = match outcome {
                    Ok(value) => {
                        self.health.record_outcome(&config.name, true, latency);
                        return Ok(Attempted {
                            value,
                            adapter,
                            failures,
                        });
                    }
                    Err(error) => error,
                };

                // An attempt cancelled by the request deadline says nothing
                // about the provider itself
                if !cut_short {
                    self.health.record_outcome(&config.name, false, latency);
                }
                self.costs.record(&config.name, 0.0, false);

                let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
                warn!(
                    provider = %config.name,
                    kind = %error.kind,
                    latency_ms,
                    error = %error.message,
                    "Provider attempt failed"
                );
                failures.push(AttemptFailure {
                    provider: config.name.clone(),
                    kind: error.kind,
                    message: error.message.clone(),
                    latency_ms,
                });

                if retry_last && index == last && error.is_transient() {
                    if let Some(delay) = self.last_candidate_backoff(config, retries, &error, deadline) {
                        debug!(
                            provider = %config.name,
                            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                            "Retrying last candidate"
                        );
                        retries += 1;
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                }
                break;
            }
        }

        Err(AllProvidersFailed { attempts: failures }.into())
    }

    /// Backoff before retrying the final candidate, if a retry is worthwhile
    fn last_candidate_backoff(
        &self,
        config: &ProviderConfig,
        retries: u32,
        error: &ProviderError,
        deadline: Instant,
    ) -> Option<Duration> {
        if retries >= self.failover.last_candidate_retries {
            return None;
        }
        if self.health.health_status(&config.name) == Some(HealthStatus::Unhealthy) {
            return None;
        }
        let delay = self.failover.retry.calculate_delay(retries, error);
        (Instant::now() + delay < deadline).then_some(delay)
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn recovery_summary(failures: &[AttemptFailure]) -> Option<String> {
    if failures.is_empty() {
        return None;
    }
    let attempts: Vec<String> = failures.iter().map(ToString::to_string).collect();
    Some(format!(
        "Recovered after {} failed attempt(s): {}",
        failures.len(),
        attempts.join("; ")
    ))
}
