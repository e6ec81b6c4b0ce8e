//! Usage accounting and UTC day rollover

mod common;

use chrono::{Duration, TimeZone, Utc};
use common::ScriptedAdapter;
use relay_core::clock::ManualClock;
use relay_core::cost::CostTracker;
use relay_core::protocol::TokenUsage;
use std::sync::Arc;

fn tracker(clock: Arc<ManualClock>) -> CostTracker {
    let registry = common::registry(&[
        ScriptedAdapter::replying("alpha"),
        ScriptedAdapter::replying("beta"),
    ]);
    CostTracker::with_clock(&registry, clock)
}

fn clock_at(hour: u32, minute: u32) -> Arc<ManualClock> {
    Arc::new(ManualClock::new(
        Utc.with_ymd_and_hms(2024, 6, 30, hour, minute, 0).unwrap(),
    ))
}

#[test]
fn test_every_provider_has_a_record_from_the_start() {
    let costs = tracker(clock_at(9, 0));
    let summary = costs.summary();
    assert_eq!(summary.len(), 2);
    assert!(summary.values().all(|r| r.requests == 0 && r.total_cost == 0.0));
}

#[test]
fn test_failures_are_counted_with_their_cost() {
    let costs = tracker(clock_at(9, 0));
    costs.record("alpha", 0.5, true);
    costs.record("alpha", 0.25, false);

    let alpha = costs.usage("alpha").unwrap();
    assert_eq!(alpha.requests, 2);
    assert_eq!(alpha.failed_requests, 1);
    assert_eq!(alpha.total_cost, 0.75);
    assert_eq!(alpha.daily_cost, 0.75);
    assert_eq!(alpha.success_rate(), 50.0);
}

#[test]
fn test_token_usage_accumulates() {
    let costs = tracker(clock_at(9, 0));
    costs.record_usage("beta", &TokenUsage::new(120, 30), 0.01, true);
    costs.record_usage("beta", &TokenUsage::new(80, 20), 0.01, true);

    let beta = costs.usage("beta").unwrap();
    assert_eq!(beta.prompt_tokens, 200);
    assert_eq!(beta.completion_tokens, 50);
    assert!((costs.total_cost() - 0.02).abs() < 1e-12);
}

#[test]
fn test_daily_counters_reset_at_utc_midnight() {
    let clock = clock_at(23, 50);
    let costs = tracker(Arc::clone(&clock));
    costs.record("alpha", 1.0, true);
    costs.record("alpha", 1.0, true);

    clock.advance(Duration::minutes(9));
    costs.record("alpha", 1.0, true);
    assert_eq!(costs.usage("alpha").unwrap().daily_requests, 3);

    clock.advance(Duration::minutes(2));
    costs.record("alpha", 1.0, true);
    let alpha = costs.usage("alpha").unwrap();
    assert_eq!(alpha.daily_requests, 1);
    assert_eq!(alpha.daily_cost, 1.0);
    assert_eq!(alpha.requests, 4);
    assert_eq!(alpha.total_cost, 4.0);
    assert_eq!(
        alpha.day_start,
        Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap()
    );
}

#[test]
fn test_daily_reset_is_idempotent_within_a_day() {
    let clock = clock_at(12, 0);
    let costs = tracker(Arc::clone(&clock));
    costs.record("alpha", 2.0, true);

    assert_eq!(costs.daily_reset_if_needed(), 0);

    clock.advance(Duration::days(1));
    assert_eq!(costs.daily_reset_if_needed(), 2);
    assert_eq!(costs.daily_reset_if_needed(), 0);
    clock.advance(Duration::hours(3));
    assert_eq!(costs.daily_reset_if_needed(), 0);

    assert_eq!(costs.usage("alpha").unwrap().daily_cost, 0.0);
    assert_eq!(costs.usage("alpha").unwrap().total_cost, 2.0);
}

#[test]
fn test_reset_after_a_traffic_gap_of_several_days() {
    let clock = clock_at(8, 0);
    let costs = tracker(Arc::clone(&clock));
    costs.record("beta", 3.0, true);

    clock.advance(Duration::days(5));
    let summary = costs.summary();
    assert_eq!(summary["beta"].daily_requests, 0);
    assert_eq!(summary["beta"].requests, 1);
    assert_eq!(
        summary["beta"].day_start,
        Utc.with_ymd_and_hms(2024, 7, 5, 0, 0, 0).unwrap()
    );
}

#[test]
fn test_unknown_provider_is_ignored() {
    let costs = tracker(clock_at(8, 0));
    costs.record("missing", 1.0, true);
    assert!(costs.usage("missing").is_none());
    assert_eq!(costs.total_cost(), 0.0);
}

#[test]
fn test_negative_cost_is_not_accumulated() {
    let costs = tracker(clock_at(8, 0));
    costs.record("alpha", -4.0, false);
    let alpha = costs.usage("alpha").unwrap();
    assert_eq!(alpha.requests, 1);
    assert_eq!(alpha.total_cost, 0.0);
}
