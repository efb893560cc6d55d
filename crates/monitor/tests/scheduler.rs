//! Monitor lifecycle tests.
//!
//! Ticks are driven by a `ManualClock` (or tokio's paused clock), so every
//! test controls exactly when a probe runs.

mod common;

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use common::{eventually, harness, harness_with, next_event, target};
use netwatch_db::repositories::TargetRepository;
use netwatch_events::{Event, EventKind};
use netwatch_monitor::{HealthState, ManualClock, MonitorError, TokioClock};

// ---------------------------------------------------------------------------
// Test: starting an already monitored target changes nothing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_is_idempotent() {
    let h = harness();
    h.targets.insert(target("t1")).await;

    assert_matches!(h.service.start_monitoring("t1", None).await, Ok(true));
    assert_matches!(h.service.start_monitoring("t1", None).await, Ok(false));

    assert_eq!(h.service.get_active_targets(), vec!["t1".to_string()]);
    assert_eq!(h.clock.streams(), 1);
}

// ---------------------------------------------------------------------------
// Test: starting an unknown target fails and publishes MONITORING_START_FAILED
// ---------------------------------------------------------------------------

#[tokio::test]
async fn start_unknown_target_fails() {
    let h = harness();
    let mut rx = h.bus.subscribe();

    let err = h.service.start_monitoring("ghost", None).await.unwrap_err();
    assert_matches!(err, MonitorError::TargetNotFound(ref id) if id == "ghost");

    let event = next_event(&mut rx, EventKind::MonitoringStartFailed).await;
    assert_matches!(event, Event::MonitoringStartFailed(f) if f.id.as_deref() == Some("ghost"));
    assert!(h.service.get_active_targets().is_empty());
}

// ---------------------------------------------------------------------------
// Test: a zero interval is rejected
// ---------------------------------------------------------------------------

#[tokio::test]
async fn zero_interval_is_rejected() {
    let h = harness();
    h.targets.insert(target("t1")).await;

    let result = h.service.start_monitoring("t1", Some(Duration::ZERO)).await;
    assert_matches!(result, Err(MonitorError::Validation(_)));
}

// ---------------------------------------------------------------------------
// Test: stopping a target that is not monitored is a no-op
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stop_unknown_target_returns_false() {
    let h = harness();

    assert!(!h.service.stop_monitoring("nope"));
    assert!(h.service.get_active_targets().is_empty());
}

// ---------------------------------------------------------------------------
// Test: each tick probes, persists and publishes SPEED_TEST_COMPLETED
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tick_persists_and_publishes_result() {
    let h = harness();
    h.targets.insert(target("t1")).await;
    let mut rx = h.bus.subscribe();

    h.service
        .start_monitoring("t1", Some(Duration::from_secs(60)))
        .await
        .unwrap();
    let started = next_event(&mut rx, EventKind::MonitoringStarted).await;
    assert_matches!(started, Event::MonitoringStarted(m) if m.interval_ms == Some(60_000));

    assert_eq!(h.clock.advance(), 1);
    let event = next_event(&mut rx, EventKind::SpeedTestCompleted).await;

    let Event::SpeedTestCompleted(completed) = event else {
        unreachable!()
    };
    assert_eq!(completed.target_id, "t1");
    assert!(completed.result.is_success());
    assert_eq!(h.results.count().await, 1);
}

// ---------------------------------------------------------------------------
// Test: a monitor whose target was deleted stops itself
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_target_stops_its_monitor() {
    let h = harness();
    h.targets.insert(target("t1")).await;
    h.service.start_monitoring("t1", None).await.unwrap();

    // Delete behind the service's back so the monitor stays registered.
    h.targets.delete("t1").await.unwrap();
    h.clock.advance();

    let service = h.service.clone();
    eventually(move || service.get_active_targets().is_empty()).await;
    assert_eq!(h.results.count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: no tick runs after stop
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stopped_monitor_no_longer_ticks() {
    let h = harness();
    h.targets.insert(target("t1")).await;
    h.service.start_monitoring("t1", None).await.unwrap();

    assert!(h.service.stop_monitoring("t1"));
    let clock = h.clock.clone();
    eventually(move || clock.streams() == 0).await;

    assert_eq!(h.clock.advance(), 0);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.results.count().await, 0);
}

// ---------------------------------------------------------------------------
// Test: deleting a monitored target stops monitoring first
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_target_stops_monitoring() {
    let h = harness();
    h.targets.insert(target("t1")).await;
    h.service.start_monitoring("t1", None).await.unwrap();
    let mut rx = h.bus.subscribe();

    h.service.delete_target("t1").await.unwrap();

    assert_matches!(
        next_event(&mut rx, EventKind::MonitoringStopped).await,
        Event::MonitoringStopped(m) if m.target_id == "t1"
    );
    assert_matches!(
        next_event(&mut rx, EventKind::TargetDeleted).await,
        Event::TargetDeleted(d) if d.id == "t1"
    );
    assert!(h.service.get_active_targets().is_empty());
}

// ---------------------------------------------------------------------------
// Test: the tokio clock ticks once per interval
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn tokio_clock_drives_monitor() {
    let targets = Arc::new(netwatch_db::memory::MemoryTargetRepository::new());
    targets.insert(target("t1")).await;
    let h = harness_with(targets, Arc::new(TokioClock));
    let mut rx = h.bus.subscribe();

    h.service
        .start_monitoring("t1", Some(Duration::from_secs(2)))
        .await
        .unwrap();

    let started = tokio::time::Instant::now();
    next_event(&mut rx, EventKind::SpeedTestCompleted).await;
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(h.results.count().await, 1);
}

// ---------------------------------------------------------------------------
// Test: shutdown stops every monitor
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_stops_all_monitors() {
    let h = harness();
    for id in ["t1", "t2", "t3"] {
        h.targets.insert(target(id)).await;
    }
    assert_eq!(h.service.start_all().await.unwrap(), 3);
    assert_eq!(h.service.get_active_targets().len(), 3);

    assert_eq!(h.service.shutdown().await, 3);
    assert!(h.service.get_active_targets().is_empty());
    assert_eq!(h.clock.streams(), 0);
}

// ---------------------------------------------------------------------------
// Test: runs are counted and the target's run times advance
// ---------------------------------------------------------------------------

#[tokio::test]
async fn successful_runs_are_counted() {
    let h = harness();
    h.targets.insert(target("t1")).await;
    h.service
        .start_monitoring("t1", Some(Duration::from_secs(60)))
        .await
        .unwrap();

    let scheduled = h.service.scheduler().run_state("t1").unwrap();
    assert!(scheduled.last_run.is_none());
    assert!(scheduled.next_run.is_some());

    for runs in 1..=2 {
        h.clock.advance();
        let service = h.service.clone();
        eventually(move || service.stats().total_runs == runs).await;
    }

    let stats = h.service.stats();
    assert_eq!(stats.total_targets, 1);
    assert_eq!(stats.successful_runs, 2);
    assert_eq!(stats.failed_runs, 0);
    assert_eq!(stats.failed_targets, 0);
    assert!(!stats.stopped);

    let state = h.service.scheduler().run_state("t1").unwrap();
    assert_eq!(state.failure_count, 0);
    assert!(state.last_run.is_some());
    assert!(state.next_run > state.last_run);
    assert!(h.service.health().is_healthy());
}

// ---------------------------------------------------------------------------
// Test: repeated failures mark a target failing but keep it monitored
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_target_stays_monitored_and_degrades_health() {
    let h = harness();
    h.targets.insert(target("t1")).await;
    h.service.start_monitoring("t1", None).await.unwrap();
    h.transport.set_failing(true);

    for runs in 1..=3 {
        h.clock.advance();
        let service = h.service.clone();
        eventually(move || service.stats().total_runs == runs).await;
    }

    assert_eq!(h.service.failed_targets(), vec!["t1".to_string()]);
    assert_eq!(h.service.scheduler().run_state("t1").unwrap().failure_count, 3);
    assert!(h.service.scheduler().is_active("t1"));

    let stats = h.service.stats();
    assert_eq!(stats.failed_runs, 3);
    assert_eq!(stats.failed_targets, 1);
    assert_eq!(h.results.count().await, 3);

    let health = h.service.health();
    assert_eq!(health.status, HealthState::Degraded);
    assert!(health.issues.iter().any(|i| i.starts_with("High failure rate")));
    assert!(health.issues.iter().any(|i| i.starts_with("Many targets failing")));

    // One success clears the streak.
    h.transport.set_failing(false);
    h.clock.advance();
    let service = h.service.clone();
    eventually(move || service.stats().total_runs == 4).await;
    assert!(h.service.failed_targets().is_empty());
    assert_eq!(h.service.scheduler().run_state("t1").unwrap().failure_count, 0);
}

// ---------------------------------------------------------------------------
// Test: a storage outage counts as a failed run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn target_lookup_error_counts_as_failure() {
    let clock = Arc::new(ManualClock::new());
    let h = harness_with(Arc::new(common::OfflineTargets), clock.clone());

    // The offline store refuses the existence check, so drive the scheduler
    // directly.
    assert!(h
        .service
        .scheduler()
        .start_monitoring("t1", Duration::from_secs(60)));
    clock.advance();

    let service = h.service.clone();
    eventually(move || service.stats().failed_runs == 1).await;
    assert_eq!(h.service.scheduler().run_state("t1").unwrap().failure_count, 1);
    assert!(h.service.scheduler().is_active("t1"));
}

// ---------------------------------------------------------------------------
// Test: a stopped scheduler reports itself in the health issues
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stopped_scheduler_is_reported() {
    let h = harness();
    h.targets.insert(target("t1")).await;
    h.service.start_monitoring("t1", None).await.unwrap();
    assert!(h.service.health().is_healthy());

    h.service.shutdown().await;

    let stats = h.service.stats();
    assert!(stats.stopped);
    assert_eq!(stats.total_targets, 0);
    let health = h.service.health();
    assert_eq!(health.status, HealthState::Degraded);
    assert_eq!(health.issues, vec!["Scheduler is stopped".to_string()]);

    h.service.start_monitoring("t1", None).await.unwrap();
    assert!(!h.service.stats().stopped);
}
