//! Shared fakes for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use relay_core::config::{HealthPolicy, RelayConfig};
use relay_core::health::HealthMonitor;
use relay_core::protocol::{Completion, GenerationRequest, TokenUsage};
use relay_core::providers::{
    Capabilities, ErrorKind, Pricing, ProviderAdapter, ProviderConfig, ProviderError,
    ProviderKind, ProviderResult, RetryPolicy,
};
use relay_core::{ProviderRegistry, RequestDispatcher};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a scripted adapter does on one call
#[derive(Debug, Clone)]
pub enum Step {
    Reply(String),
    Fail(ErrorKind),
    /// Sleep, then reply
    Slow(Duration, String),
}

/// Adapter that follows a script; the last step repeats once the script runs out
pub struct ScriptedAdapter {
    config: ProviderConfig,
    script: Mutex<VecDeque<Step>>,
    repeat: Step,
    calls: AtomicUsize,
    probes: AtomicUsize,
    probe_ok: AtomicBool,
    probe_delay: Mutex<Duration>,
}

impl ScriptedAdapter {
    pub fn new(name: &str, steps: Vec<Step>) -> Arc<Self> {
        Self::with_config(config(name), steps)
    }

    pub fn with_config(config: ProviderConfig, steps: Vec<Step>) -> Arc<Self> {
        let repeat = steps
            .last()
            .cloned()
            .unwrap_or_else(|| Step::Reply("ok".to_string()));
        Arc::new(Self {
            config,
            script: Mutex::new(steps.into()),
            repeat,
            calls: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            probe_ok: AtomicBool::new(true),
            probe_delay: Mutex::new(Duration::ZERO),
        })
    }

    pub fn replying(name: &str) -> Arc<Self> {
        Self::new(name, vec![Step::Reply(format!("answer from {}", name))])
    }

    pub fn failing(name: &str, kind: ErrorKind) -> Arc<Self> {
        Self::new(name, vec![Step::Fail(kind)])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn set_probe_ok(&self, ok: bool) {
        self.probe_ok.store(ok, Ordering::SeqCst);
    }

    pub fn set_probe_delay(&self, delay: Duration) {
        *self.probe_delay.lock().unwrap() = delay;
    }

    fn next_step(&self) -> Step {
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.repeat.clone())
    }

    fn reply(&self, text: String) -> Completion {
        Completion {
            text,
            model: self.config.model.clone(),
            usage: Some(TokenUsage::new(100, 50)),
        }
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedAdapter {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn generate(&self, _request: &GenerationRequest) -> ProviderResult<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Step::Reply(text) => Ok(self.reply(text)),
            Step::Fail(kind) => Err(ProviderError::new(
                kind,
                format!("{} failed ({})", self.config.name, kind),
            )),
            Step::Slow(delay, text) => {
                tokio::time::sleep(delay).await;
                Ok(self.reply(text))
            }
        }
    }

    async fn health_check(&self) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let delay = *self.probe_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.probe_ok.load(Ordering::SeqCst)
    }
}

/// Local, paid provider config used by the fakes
pub fn config(name: &str) -> ProviderConfig {
    ProviderConfig::new(name, ProviderKind::Vllm)
        .with_model(format!("{}-model", name))
        .with_pricing(Pricing::per_1k(0.01, 0.02))
        .with_capabilities(Capabilities {
            streaming: true,
            function_calling: false,
            vision: false,
            json_mode: true,
        })
        .with_health(HealthPolicy::default())
}

pub fn registry(adapters: &[Arc<ScriptedAdapter>]) -> Arc<ProviderRegistry> {
    let mut builder = ProviderRegistry::builder();
    for adapter in adapters {
        builder = builder.register(adapter.clone());
    }
    Arc::new(builder.build().unwrap())
}

/// Configuration with instant retries so tests never wait on backoff
pub fn relay_config() -> RelayConfig {
    let mut config = RelayConfig::builtin_catalogue();
    config.failover.retry = RetryPolicy::immediate();
    config
}

pub fn dispatcher(adapters: &[Arc<ScriptedAdapter>]) -> RequestDispatcher {
    RequestDispatcher::new(registry(adapters), &relay_config())
}

/// Drive a provider to `unhealthy` through the monitor
pub fn make_unhealthy(health: &HealthMonitor, provider: &str) {
    for _ in 0..HealthPolicy::default().failure_threshold {
        health.record_outcome(provider, false, Duration::from_millis(10));
    }
}
