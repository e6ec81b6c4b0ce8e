//! Health state transitions, cooldown and probing

mod common;

use common::{config, make_unhealthy, ScriptedAdapter, Step};
use relay_core::config::HealthPolicy;
use relay_core::health::{HealthMonitor, HealthStatus};
use std::sync::Arc;
use std::time::Duration;

fn monitor(adapters: &[Arc<ScriptedAdapter>]) -> Arc<HealthMonitor> {
    Arc::new(HealthMonitor::new(common::registry(adapters)))
}

#[tokio::test(start_paused = true)]
async fn test_recovered_provider_comes_back_degraded() {
    let gamma = ScriptedAdapter::replying("gamma");
    let health = monitor(&[gamma.clone()]);

    make_unhealthy(&health, "gamma");
    assert_eq!(health.health_status("gamma"), Some(HealthStatus::Unhealthy));

    // Still cooling down: not probed
    assert!(health.run_periodic_probe().await.is_empty());
    assert_eq!(gamma.probes(), 0);

    tokio::time::advance(Duration::from_secs(60)).await;
    assert!(!health.is_cooling_down("gamma"));

    let results = health.run_periodic_probe().await;
    assert_eq!(results.len(), 1);
    assert!(results[0].healthy);
    assert_eq!(results[0].status, HealthStatus::Degraded);
    assert_eq!(health.health_status("gamma"), Some(HealthStatus::Degraded));
}

#[tokio::test(start_paused = true)]
async fn test_failed_half_open_probe_restarts_cooldown() {
    let gamma = ScriptedAdapter::replying("gamma");
    gamma.set_probe_ok(false);
    let health = monitor(&[gamma.clone()]);

    make_unhealthy(&health, "gamma");
    tokio::time::advance(Duration::from_secs(61)).await;

    let results = health.run_periodic_probe().await;
    assert!(!results[0].healthy);
    assert_eq!(health.health_status("gamma"), Some(HealthStatus::Unhealthy));
    assert!(health.is_cooling_down("gamma"));

    tokio::time::advance(Duration::from_secs(30)).await;
    assert!(health.run_periodic_probe().await.is_empty());
    assert_eq!(gamma.probes(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_live_success_after_cooldown_is_the_half_open_trial() {
    let health = monitor(&[ScriptedAdapter::replying("gamma")]);
    make_unhealthy(&health, "gamma");

    tokio::time::advance(Duration::from_secs(60)).await;
    let status = health.record_outcome("gamma", true, Duration::from_millis(20));
    assert_eq!(status, Some(HealthStatus::Degraded));
}

#[tokio::test(start_paused = true)]
async fn test_probe_timeout_counts_as_failure() {
    let slow = ScriptedAdapter::replying("slow");
    slow.set_probe_delay(Duration::from_secs(30));
    let health = monitor(&[slow]);

    let results = health.run_periodic_probe().await;
    assert_eq!(results.len(), 1);
    assert!(!results[0].healthy);
    let probe_timeout = u64::try_from(HealthPolicy::default().probe_timeout().as_millis()).unwrap();
    assert!(results[0].latency_ms >= probe_timeout);
    assert_eq!(health.status("slow").unwrap().consecutive_failures, 1);
}

#[tokio::test(start_paused = true)]
async fn test_probes_respect_interval() {
    let alpha = ScriptedAdapter::replying("alpha");
    let health = monitor(&[alpha.clone()]);

    assert_eq!(health.run_periodic_probe().await.len(), 1);
    assert!(health.run_periodic_probe().await.is_empty());

    tokio::time::advance(Duration::from_secs(30)).await;
    assert_eq!(health.run_periodic_probe().await.len(), 1);
    assert_eq!(alpha.probes(), 2);
}

#[tokio::test]
async fn test_disabled_providers_are_not_probed() {
    let off = ScriptedAdapter::with_config(config("off").disabled(), vec![Step::Reply("x".into())]);
    let on = ScriptedAdapter::replying("on");
    let health = monitor(&[off.clone(), on]);

    let results = health.run_periodic_probe().await;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].provider, "on");
    assert_eq!(off.probes(), 0);

    // Disabled providers still have a status entry
    assert_eq!(health.snapshot().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_probe_loop_runs_until_shutdown() {
    let alpha = ScriptedAdapter::replying("alpha");
    let health = monitor(&[alpha.clone()]);

    let handle = health.spawn_probe_loop();
    tokio::time::sleep(Duration::from_secs(65)).await;
    assert!(alpha.probes() >= 2);

    handle.shutdown().await;
    let probes = alpha.probes();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert_eq!(alpha.probes(), probes);
}

#[test]
fn test_unknown_provider_outcome_is_ignored() {
    let health = HealthMonitor::new(common::registry(&[ScriptedAdapter::replying("alpha")]));
    assert_eq!(
        health.record_outcome("missing", false, Duration::from_millis(1)),
        None
    );
    assert!(health.status("missing").is_none());
    assert!(!health.is_cooling_down("missing"));
}

#[test]
fn test_snapshot_reports_rolling_stats() {
    let health = HealthMonitor::new(common::registry(&[ScriptedAdapter::replying("alpha")]));
    health.record_outcome("alpha", true, Duration::from_millis(100));
    health.record_outcome("alpha", false, Duration::from_millis(300));

    let snapshot = health.snapshot();
    let alpha = &snapshot["alpha"];
    assert_eq!(alpha.success_rate, 50.0);
    assert_eq!(alpha.avg_response_time_ms, 200.0);
    assert_eq!(alpha.total_requests, 2);
    assert!(alpha.last_checked.is_some());
    // Two samples are too few to leave healthy
    assert_eq!(alpha.status, HealthStatus::Healthy);
}
