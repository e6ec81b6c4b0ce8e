//! Health monitor: owns every provider's [`HealthState`] and runs probes

use super::state::{HealthState, HealthStatus, ProviderStatus};
use crate::registry::ProviderRegistry;
use chrono::Utc;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Outcome of probing one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub provider: String,
    pub healthy: bool,
    pub latency_ms: u64,
    pub status: HealthStatus,
}

/// Tracks the health of every registered provider.
///
/// Each provider's state sits behind its own mutex, so writes for one
/// provider are serialized while different providers never contend. Locks
/// are never held across an `.await`.
#[derive(Debug)]
pub struct HealthMonitor {
    registry: Arc<ProviderRegistry>,
    states: HashMap<String, Mutex<HealthState>>,
}

impl HealthMonitor {
    /// One state per registered provider, all starting healthy
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        let states = registry
            .iter()
            .map(|config| {
                (
                    config.name.clone(),
                    Mutex::new(HealthState::new(config.health.clone())),
                )
            })
            .collect();

        Self { registry, states }
    }

    fn lock(&self, provider: &str) -> Option<MutexGuard<'_, HealthState>> {
        self.states
            .get(provider)
            .map(|m| m.lock().unwrap_or_else(|poisoned| poisoned.into_inner()))
    }

    /// Record the outcome of a real request or probe.
    ///
    /// Returns the provider's status afterwards, or `None` for unknown names.
    pub fn record_outcome(
        &self,
        provider: &str,
        success: bool,
        latency: Duration,
    ) -> Option<HealthStatus> {
        let Some(mut state) = self.lock(provider) else {
            warn!(provider = %provider, "Outcome recorded for unknown provider");
            return None;
        };

        let transition = state.record(success, latency, Instant::now(), Utc::now());
        let status = state.status();
        let success_rate = state.success_rate();
        let consecutive_failures = state.consecutive_failures();
        drop(state);

        if let Some((from, to)) = transition {
            if to == HealthStatus::Unhealthy {
                warn!(
                    provider = %provider,
                    from = %from,
                    to = %to,
                    success_rate,
                    consecutive_failures,
                    "Provider health changed"
                );
            } else {
                info!(
                    provider = %provider,
                    from = %from,
                    to = %to,
                    success_rate,
                    "Provider health changed"
                );
            }
        }

        Some(status)
    }

    pub fn health_status(&self, provider: &str) -> Option<HealthStatus> {
        self.lock(provider).map(|s| s.status())
    }

    pub fn status(&self, provider: &str) -> Option<ProviderStatus> {
        let now = Instant::now();
        self.lock(provider).map(|s| s.snapshot(provider, now))
    }

    pub fn is_cooling_down(&self, provider: &str) -> bool {
        let now = Instant::now();
        self.lock(provider).is_some_and(|s| s.in_cooldown(now))
    }

    /// Status of every registered provider
    pub fn snapshot(&self) -> BTreeMap<String, ProviderStatus> {
        let now = Instant::now();
        self.states
            .iter()
            .map(|(name, state)| {
                let state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                (name.clone(), state.snapshot(name, now))
            })
            .collect()
    }

    /// Probe every enabled provider that is due and not cooling down.
    ///
    /// Probes run concurrently, each bounded by the provider's probe timeout,
    /// and count as outcomes in the rolling window.
    pub async fn run_periodic_probe(&self) -> Vec<ProbeResult> {
        let now = Instant::now();
        let due: Vec<_> = self
            .registry
            .enabled_providers()
            .into_iter()
            .filter_map(|config| {
                let mut state = self.lock(&config.name)?;
                if state.in_cooldown(now) || !state.probe_due(now) {
                    return None;
                }
                state.mark_probed(now);
                self.registry.adapter(&config.name)
            })
            .collect();

        if due.is_empty() {
            return Vec::new();
        }
        debug!(providers = due.len(), "Running health probes");

        let probes = due.into_iter().map(|adapter| async move {
            let timeout = adapter.config().health.probe_timeout();
            let started = Instant::now();
            let healthy = tokio::time::timeout(timeout, adapter.health_check())
                .await
                .unwrap_or(false);
            let latency = started.elapsed();
            let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);

            let status = self
                .record_outcome(adapter.name(), healthy, latency)
                .unwrap_or(HealthStatus::Unhealthy);
            debug!(
                provider = %adapter.name(),
                healthy,
                latency_ms,
                "Health probe finished"
            );

            ProbeResult {
                provider: adapter.name().to_string(),
                healthy,
                latency_ms,
                status,
            }
        });

        join_all(probes).await
    }

    /// Run [`HealthMonitor::run_periodic_probe`] in the background.
    ///
    /// The loop ticks at the shortest probe interval among enabled providers;
    /// each provider is still only probed when its own interval has elapsed.
    pub fn spawn_probe_loop(self: &Arc<Self>) -> ProbeHandle {
        let period = self
            .registry
            .enabled_providers()
            .iter()
            .map(|c| c.health.probe_interval())
            .min()
            .unwrap_or(Duration::from_secs(30))
            .max(Duration::from_millis(1));

        let (shutdown, mut stop) = watch::channel(false);
        let monitor = Arc::clone(self);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX);
            info!(interval_ms, "Health probe loop started");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        monitor.run_periodic_probe().await;
                    }
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
            }

            info!("Health probe loop stopped");
        });

        ProbeHandle { shutdown, task }
    }
}

/// Handle to a background probe loop. Dropping it also stops the loop.
#[derive(Debug)]
pub struct ProbeHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ProbeHandle {
    /// Signal the loop to stop and wait for it to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Health probe loop ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
