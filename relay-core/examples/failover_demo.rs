//! Failover demo with simulated providers
//!
//! Three in-process backends stand in for real ones:
//! - `primary` times out on every call
//! - `secondary` answers, slowly
//! - `local` answers instantly and costs nothing
//!
//! Run with: RELAY_LOG=relay_core=debug cargo run --example failover_demo

use async_trait::async_trait;
use relay_core::config::HealthPolicy;
use relay_core::logging::{self, LogFormat};
use relay_core::protocol::{Completion, GenerationRequest, TokenUsage};
use relay_core::providers::{
    Pricing, ProviderAdapter, ProviderConfig, ProviderError, ProviderKind, ProviderResult,
};
use relay_core::{ProviderRegistry, RelayConfig, RelayError, RequestDispatcher};
use std::sync::Arc;
use std::time::Duration;

enum Behaviour {
    Hang,
    Answer { delay: Duration },
}

struct SimulatedProvider {
    config: ProviderConfig,
    behaviour: Behaviour,
}

impl SimulatedProvider {
    fn new(name: &str, pricing: Pricing, behaviour: Behaviour) -> Arc<Self> {
        let config = ProviderConfig::new(name, ProviderKind::Vllm)
            .with_model(format!("{}-sim", name))
            .with_pricing(pricing)
            .with_health(HealthPolicy::default());
        Arc::new(Self { config, behaviour })
    }
}

#[async_trait]
impl ProviderAdapter for SimulatedProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn generate(&self, request: &GenerationRequest) -> ProviderResult<Completion> {
        match self.behaviour {
            Behaviour::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(ProviderError::timeout("never answers"))
            }
            Behaviour::Answer { delay } => {
                tokio::time::sleep(delay).await;
                let text = format!("{} handled: {}", self.config.name, request.prompt);
                Ok(Completion {
                    usage: Some(TokenUsage::estimate(&request.prompt, &text)),
                    text,
                    model: self.config.model.clone(),
                })
            }
        }
    }

    async fn health_check(&self) -> bool {
        matches!(self.behaviour, Behaviour::Answer { .. })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init(LogFormat::Compact);

    let registry = ProviderRegistry::builder()
        .register(SimulatedProvider::new(
            "primary",
            Pricing::per_1k(0.003, 0.015),
            Behaviour::Hang,
        ))
        .register(SimulatedProvider::new(
            "secondary",
            Pricing::per_1k(0.001, 0.002),
            Behaviour::Answer {
                delay: Duration::from_millis(300),
            },
        ))
        .register(SimulatedProvider::new(
            "local",
            Pricing::free(),
            Behaviour::Answer {
                delay: Duration::from_millis(20),
            },
        ))
        .with_default_provider("primary")
        .build()?;

    let mut config = RelayConfig::builtin_catalogue();
    config.failover.attempt_timeout_ms = 1_000;
    config.failover.request_timeout_ms = 5_000;

    let dispatcher = RequestDispatcher::new(Arc::new(registry), &config);
    let probes = dispatcher.start_health_probes();

    println!("Recommended provider: {}", dispatcher.recommend_provider("general")?);

    for round in 1..=4 {
        let prompt = format!("Summarise control A.5.{}", round);
        match dispatcher.generate(prompt, "general", None).await {
            Ok(result) => {
                println!(
                    "#{} {} in {} ms, ${:.6}, {} failure(s) recovered",
                    round,
                    result.provider,
                    result.latency_ms,
                    result.cost,
                    result.recovered_failures.len()
                );
                if let Some(summary) = &result.error {
                    println!("   {}", summary);
                }
            }
            Err(RelayError::AllProvidersFailed(failed)) => {
                println!("#{} every provider failed: {:?}", round, failed.kinds());
            }
            Err(e) => return Err(e.into()),
        }
    }

    println!("\nProvider status:");
    for (name, report) in dispatcher.list_provider_status() {
        println!(
            "  {:<10} {:<9} success {:>5.1}%  avg {:>6.0} ms  requests {}",
            name,
            report.status.as_str(),
            report.success_rate,
            report.avg_response_time_ms,
            report.requests_count
        );
    }

    let test = dispatcher.test_provider("local", "").await?;
    println!("\nDirect test of local: success={} ({} ms)", test.success, test.latency_ms);

    println!("\nUsage:\n{}", serde_json::to_string_pretty(&dispatcher.usage_summary())?);

    probes.shutdown().await;
    Ok(())
}
