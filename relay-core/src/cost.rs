//! Per-provider usage and cost accounting
//!
//! Lifetime and daily counters for every registered provider. Daily counters
//! reset on the first record or read after the UTC date changes, so no
//! background timer is needed.

use crate::clock::{Clock, SystemClock};
use crate::protocol::TokenUsage;
use crate::registry::ProviderRegistry;
use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Usage counters for one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub provider: String,
    pub requests: u64,
    pub failed_requests: u64,
    pub total_cost: f64,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub daily_requests: u64,
    pub daily_cost: f64,
    /// Midnight (UTC) of the day the daily counters belong to
    pub day_start: DateTime<Utc>,
}

impl UsageRecord {
    fn new(provider: &str, now: DateTime<Utc>) -> Self {
        Self {
            provider: provider.to_string(),
            requests: 0,
            failed_requests: 0,
            total_cost: 0.0,
            prompt_tokens: 0,
            completion_tokens: 0,
            daily_requests: 0,
            daily_cost: 0.0,
            day_start: day_start(now),
        }
    }

    /// Reset daily counters when `now` falls on a later UTC day
    fn roll_over(&mut self, now: DateTime<Utc>) -> bool {
        let today = day_start(now);
        if today <= self.day_start {
            return false;
        }
        self.daily_requests = 0;
        self.daily_cost = 0.0;
        self.day_start = today;
        true
    }

    pub fn success_rate(&self) -> f64 {
        if self.requests == 0 {
            return 100.0;
        }
        (self.requests - self.failed_requests) as f64 * 100.0 / self.requests as f64
    }
}

fn day_start(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Accumulates request counts and cost per provider
pub struct CostTracker {
    records: HashMap<String, Mutex<UsageRecord>>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CostTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CostTracker")
            .field("providers", &self.records.len())
            .finish()
    }
}

impl CostTracker {
    /// One zeroed record per registered provider
    pub fn new(registry: &ProviderRegistry) -> Self {
        Self::with_clock(registry, Arc::new(SystemClock))
    }

    pub fn with_clock(registry: &ProviderRegistry, clock: Arc<dyn Clock>) -> Self {
        let now = clock.now();
        let records = registry
            .iter()
            .map(|config| {
                (
                    config.name.clone(),
                    Mutex::new(UsageRecord::new(&config.name, now)),
                )
            })
            .collect();

        Self { records, clock }
    }

    /// Count one attempt. Failed attempts are counted as well, with whatever
    /// cost they incurred.
    pub fn record(&self, provider: &str, cost: f64, success: bool) {
        self.record_usage(provider, &TokenUsage::default(), cost, success);
    }

    /// Like [`CostTracker::record`], also accumulating token counts
    pub fn record_usage(&self, provider: &str, usage: &TokenUsage, cost: f64, success: bool) {
        let Some(record) = self.records.get(provider) else {
            warn!(provider = %provider, "Usage recorded for unknown provider");
            return;
        };

        let cost = if cost.is_finite() && cost >= 0.0 {
            cost
        } else {
            warn!(provider = %provider, cost, "Ignoring invalid cost");
            0.0
        };

        self.daily_reset_if_needed();

        let mut record = record.lock().unwrap_or_else(PoisonError::into_inner);
        record.requests += 1;
        if !success {
            record.failed_requests += 1;
        }
        record.total_cost += cost;
        record.prompt_tokens += u64::from(usage.prompt_tokens);
        record.completion_tokens += u64::from(usage.completion_tokens);
        record.daily_requests += 1;
        record.daily_cost += cost;

        debug!(
            provider = %provider,
            success,
            cost,
            daily_cost = record.daily_cost,
            "Usage recorded"
        );
    }

    /// Reset daily counters of every provider whose day has passed.
    ///
    /// Returns how many records were reset; calling it again on the same UTC
    /// day returns 0.
    pub fn daily_reset_if_needed(&self) -> usize {
        let now = self.clock.now();
        let reset = self
            .records
            .values()
            .filter(|record| {
                record
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .roll_over(now)
            })
            .count();

        if reset > 0 {
            info!(providers = reset, day = %now.date_naive(), "Daily usage counters reset");
        }
        reset
    }

    /// Usage of one provider
    pub fn usage(&self, provider: &str) -> Option<UsageRecord> {
        self.daily_reset_if_needed();
        self.records
            .get(provider)
            .map(|r| r.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    /// Usage of every provider, keyed by name
    pub fn summary(&self) -> BTreeMap<String, UsageRecord> {
        self.daily_reset_if_needed();
        self.records
            .iter()
            .map(|(name, r)| {
                (
                    name.clone(),
                    r.lock().unwrap_or_else(PoisonError::into_inner).clone(),
                )
            })
            .collect()
    }

    /// Lifetime cost across all providers
    pub fn total_cost(&self) -> f64 {
        self.records
            .values()
            .map(|r| r.lock().unwrap_or_else(PoisonError::into_inner).total_cost)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_day_start_is_utc_midnight() {
        let at = Utc.with_ymd_and_hms(2024, 5, 17, 13, 45, 12).unwrap();
        assert_eq!(
            day_start(at),
            Utc.with_ymd_and_hms(2024, 5, 17, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_roll_over_only_forward() {
        let at = Utc.with_ymd_and_hms(2024, 5, 17, 13, 0, 0).unwrap();
        let mut record = UsageRecord::new("a", at);
        record.daily_requests = 4;

        assert!(!record.roll_over(at + chrono::Duration::hours(10)));
        assert_eq!(record.daily_requests, 4);

        assert!(record.roll_over(at + chrono::Duration::hours(11)));
        assert_eq!(record.daily_requests, 0);
        assert!(!record.roll_over(at - chrono::Duration::days(3)));
    }

    #[test]
    fn test_success_rate() {
        let mut record = UsageRecord::new("a", Utc::now());
        assert_eq!(record.success_rate(), 100.0);
        record.requests = 4;
        record.failed_requests = 1;
        assert_eq!(record.success_rate(), 75.0);
    }
}
