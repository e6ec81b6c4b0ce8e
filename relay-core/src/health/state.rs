//! Per-provider health state machine

use crate::config::HealthPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Derived health of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Ordering key for candidate selection, lower is better
    pub fn rank(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Degraded => 1,
            HealthStatus::Unhealthy => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of one provider's health
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub provider: String,
    pub status: HealthStatus,
    /// Success rate over the rolling window, in percent
    pub success_rate: f64,
    pub avg_response_time_ms: f64,
    pub consecutive_failures: u32,
    pub total_requests: u64,
    pub cooling_down: bool,
    pub last_checked: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    success: bool,
    latency_ms: u64,
}

/// Rolling window and counters behind one provider's [`HealthStatus`].
///
/// Only the health monitor owns these; everything else reads snapshots.
#[derive(Debug)]
pub struct HealthState {
    policy: HealthPolicy,
    status: HealthStatus,
    window: VecDeque<Outcome>,
    consecutive_failures: u32,
    total_requests: u64,
    unhealthy_since: Option<Instant>,
    last_probe: Option<Instant>,
    last_checked: Option<DateTime<Utc>>,
}

impl HealthState {
    pub fn new(policy: HealthPolicy) -> Self {
        Self {
            window: VecDeque::with_capacity(policy.window_size),
            policy,
            status: HealthStatus::Healthy,
            consecutive_failures: 0,
            total_requests: 0,
            unhealthy_since: None,
            last_probe: None,
            last_checked: None,
        }
    }

    pub fn status(&self) -> HealthStatus {
        self.status
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Success rate over the window in percent; an empty window counts as 100
    pub fn success_rate(&self) -> f64 {
        if self.window.is_empty() {
            return 100.0;
        }
        let successes = self.window.iter().filter(|o| o.success).count();
        successes as f64 * 100.0 / self.window.len() as f64
    }

    pub fn avg_latency_ms(&self) -> f64 {
        if self.window.is_empty() {
            return 0.0;
        }
        let total: u64 = self.window.iter().map(|o| o.latency_ms).sum();
        total as f64 / self.window.len() as f64
    }

    /// Whether an unhealthy provider is still sitting out its cooldown
    pub fn in_cooldown(&self, now: Instant) -> bool {
        match (self.status, self.unhealthy_since) {
            (HealthStatus::Unhealthy, Some(since)) => now < since + self.policy.cooldown(),
            _ => false,
        }
    }

    /// Time left before a half-open trial is allowed
    pub fn cooldown_remaining(&self, now: Instant) -> Option<Duration> {
        if !self.in_cooldown(now) {
            return None;
        }
        self.unhealthy_since
            .map(|since| (since + self.policy.cooldown()).saturating_duration_since(now))
    }

    pub fn probe_due(&self, now: Instant) -> bool {
        self.last_probe
            .is_none_or(|at| now >= at + self.policy.probe_interval())
    }

    pub fn mark_probed(&mut self, now: Instant) {
        self.last_probe = Some(now);
    }

    /// Record one outcome and apply the state machine.
    ///
    /// Returns `(from, to)` when the status changed.
    pub fn record(
        &mut self,
        success: bool,
        latency: Duration,
        now: Instant,
        wall: DateTime<Utc>,
    ) -> Option<(HealthStatus, HealthStatus)> {
        let latency_ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.window.push_back(Outcome {
            success,
            latency_ms,
        });
        while self.window.len() > self.policy.window_size {
            self.window.pop_front();
        }
        self.total_requests += 1;
        self.last_checked = Some(wall);
        if success {
            self.consecutive_failures = 0;
        } else {
            self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        }

        let from = self.status;
        let to = match from {
            HealthStatus::Unhealthy if self.in_cooldown(now) => from,
            HealthStatus::Unhealthy => {
                // Half-open trial
                if success {
                    self.window.clear();
                    self.consecutive_failures = 0;
                    self.unhealthy_since = None;
                    HealthStatus::Degraded
                } else {
                    self.unhealthy_since = Some(now);
                    from
                }
            }
            _ if !success && self.consecutive_failures >= self.policy.failure_threshold => {
                HealthStatus::Unhealthy
            }
            _ if self.window.len() < self.policy.min_samples => from,
            HealthStatus::Healthy => {
                if self.success_rate() < self.policy.degraded_success_rate
                    || self.avg_latency_ms() > self.policy.max_avg_latency_ms as f64
                {
                    HealthStatus::Degraded
                } else {
                    from
                }
            }
            HealthStatus::Degraded => {
                let rate = self.success_rate();
                if rate < self.policy.unhealthy_success_rate {
                    HealthStatus::Unhealthy
                } else if rate >= self.policy.degraded_success_rate
                    && self.avg_latency_ms() <= self.policy.max_avg_latency_ms as f64
                {
                    HealthStatus::Healthy
                } else {
                    from
                }
            }
        };

        if to == HealthStatus::Unhealthy && from != HealthStatus::Unhealthy {
            self.unhealthy_since = Some(now);
        }
        self.status = to;
        (from != to).then_some((from, to))
    }

    pub fn snapshot(&self, provider: &str, now: Instant) -> ProviderStatus {
        ProviderStatus {
            provider: provider.to_string(),
            status: self.status,
            success_rate: self.success_rate(),
            avg_response_time_ms: self.avg_latency_ms(),
            consecutive_failures: self.consecutive_failures,
            total_requests: self.total_requests,
            cooling_down: self.in_cooldown(now),
            last_checked: self.last_checked,
        }
    }
}
