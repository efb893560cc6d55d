//! Periodic monitoring: one background task per monitored target.
//!
//! Each task waits on its [`Clock`] and, per tick, re-reads the target and
//! runs a speed test. A target that disappeared stops its own monitor.
//! Stopping a monitor cancels its token; a tick body already running
//! finishes, but no new one starts.
//!
//! Every run is counted. A FAILURE probe, a storage error or a failed
//! target lookup is a failed run; failing targets keep being monitored.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use futures::stream::BoxStream;
use futures::StreamExt;
use netwatch_db::repositories::TargetRepository;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::clock::{millis, Clock};
use crate::speed_test::SpeedTester;
use crate::stats::{
    HealthStatus, RunTotals, SchedulerStats, TargetRunState, DEFAULT_FAILURE_THRESHOLD,
};

struct MonitorHandle {
    cancel: CancellationToken,
    generation: u64,
    interval: Duration,
    runs: TargetRunState,
    task: JoinHandle<()>,
}

type MonitorMap = Arc<Mutex<HashMap<String, MonitorHandle>>>;

pub struct MonitorScheduler {
    targets: Arc<dyn TargetRepository>,
    tester: Arc<SpeedTester>,
    clock: Arc<dyn Clock>,
    monitors: MonitorMap,
    totals: Arc<Mutex<RunTotals>>,
    next_generation: AtomicU64,
    created: Instant,
    stopped: AtomicBool,
    failure_threshold: u32,
}

impl MonitorScheduler {
    pub fn new(
        targets: Arc<dyn TargetRepository>,
        tester: Arc<SpeedTester>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            targets,
            tester,
            clock,
            monitors: Arc::new(Mutex::new(HashMap::new())),
            totals: Arc::new(Mutex::new(RunTotals::default())),
            next_generation: AtomicU64::new(1),
            created: Instant::now(),
            stopped: AtomicBool::new(false),
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
        }
    }

    /// Consecutive failed runs after which a target is reported as failing.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold.max(1);
        self
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    /// Begin monitoring `target_id` every `interval`. Returns `false` (and
    /// changes nothing) if the target is already monitored.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start_monitoring(&self, target_id: &str, interval: Duration) -> bool {
        let mut monitors = lock(&self.monitors);
        if monitors.contains_key(target_id) {
            tracing::warn!(target_id, "Target is already being monitored");
            return false;
        }

        let cancel = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        // Subscribe before spawning so a tick sent right after this call
        // is not missed.
        let ticks = self.clock.ticks(interval);

        let task = tokio::spawn(run_monitor(
            MonitorTask {
                target_id: target_id.to_string(),
                generation,
                interval,
                targets: self.targets.clone(),
                tester: self.tester.clone(),
                monitors: Arc::downgrade(&self.monitors),
                totals: self.totals.clone(),
            },
            ticks,
            cancel.clone(),
        ));

        monitors.insert(
            target_id.to_string(),
            MonitorHandle {
                cancel,
                generation,
                interval,
                runs: TargetRunState::scheduled(interval),
                task,
            },
        );
        self.stopped.store(false, Ordering::Relaxed);
        tracing::info!(target_id, interval_ms = millis(interval), "Monitoring started");
        true
    }

    /// Stop monitoring `target_id`. Returns `false` if it was not monitored.
    pub fn stop_monitoring(&self, target_id: &str) -> bool {
        let Some(handle) = lock(&self.monitors).remove(target_id) else {
            tracing::warn!(target_id, "Target is not being monitored");
            return false;
        };
        handle.cancel.cancel();
        tracing::info!(target_id, "Monitoring stopped");
        true
    }

    pub fn is_active(&self, target_id: &str) -> bool {
        lock(&self.monitors).contains_key(target_id)
    }

    /// The tick interval of an active monitor.
    pub fn interval_of(&self, target_id: &str) -> Option<Duration> {
        lock(&self.monitors).get(target_id).map(|h| h.interval)
    }

    /// Last and next run of an active monitor, with its failure streak.
    pub fn run_state(&self, target_id: &str) -> Option<TargetRunState> {
        lock(&self.monitors).get(target_id).map(|h| h.runs.clone())
    }

    /// Ids of all monitored targets, sorted.
    pub fn active_targets(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.monitors).keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Monitored targets whose failure streak reached the threshold, sorted.
    pub fn failed_targets(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.monitors)
            .iter()
            .filter(|(_, h)| h.runs.failure_count >= self.failure_threshold)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn stats(&self) -> SchedulerStats {
        let (total_targets, failed_targets) = {
            let monitors = lock(&self.monitors);
            let failed = monitors
                .values()
                .filter(|h| h.runs.failure_count >= self.failure_threshold)
                .count();
            (monitors.len(), failed)
        };
        SchedulerStats::new(
            total_targets,
            failed_targets,
            *lock(&self.totals),
            self.created.elapsed(),
            self.stopped.load(Ordering::Relaxed),
        )
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus::from_stats(&self.stats())
    }

    /// Cancel every monitor and wait for their tasks to finish.
    pub async fn stop_all(&self) -> usize {
        self.stopped.store(true, Ordering::Relaxed);
        let handles: Vec<MonitorHandle> = lock(&self.monitors).drain().map(|(_, h)| h).collect();
        let count = handles.len();

        for handle in &handles {
            handle.cancel.cancel();
        }
        for handle in handles {
            if let Err(e) = handle.task.await {
                tracing::error!(error = %e, "Monitor task ended abnormally");
            }
        }

        if count > 0 {
            tracing::info!(count, "All monitors stopped");
        }
        count
    }
}

impl Drop for MonitorScheduler {
    fn drop(&mut self) {
        for handle in lock(&self.monitors).values() {
            handle.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for MonitorScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MonitorScheduler")
            .field("active", &self.active_targets())
            .field("failure_threshold", &self.failure_threshold)
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Monitor task
// ---------------------------------------------------------------------------

enum Tick {
    Ran { success: bool, elapsed: Duration },
    TargetGone,
}

/// Everything one monitor task owns.
struct MonitorTask {
    target_id: String,
    generation: u64,
    interval: Duration,
    targets: Arc<dyn TargetRepository>,
    tester: Arc<SpeedTester>,
    monitors: Weak<Mutex<HashMap<String, MonitorHandle>>>,
    totals: Arc<Mutex<RunTotals>>,
}

impl MonitorTask {
    /// Apply `update` to this monitor's entry, unless the target has been
    /// restarted under a newer generation. Returns whether the entry was ours.
    fn with_own_entry(&self, update: impl FnOnce(&mut HashMap<String, MonitorHandle>)) -> bool {
        let Some(monitors) = self.monitors.upgrade() else {
            return false;
        };
        let mut monitors = lock(&monitors);
        if monitors.get(&self.target_id).map(|h| h.generation) != Some(self.generation) {
            return false;
        }
        update(&mut *monitors);
        true
    }

    fn record(&self, success: bool, elapsed: Duration) {
        lock(&self.totals).record(success, elapsed);
        self.with_own_entry(|monitors| {
            if let Some(handle) = monitors.get_mut(&self.target_id) {
                handle.runs.record(success, self.interval);
            }
        });
    }
}

async fn run_monitor(task: MonitorTask, mut ticks: BoxStream<'static, ()>, cancel: CancellationToken) {
    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => break,
            tick = ticks.next() => {
                if tick.is_none() {
                    tracing::debug!(target_id = %task.target_id, "Tick source closed");
                    break;
                }
            }
        }

        match run_tick(&task.target_id, task.targets.as_ref(), &task.tester).await {
            Tick::Ran { success, elapsed } => task.record(success, elapsed),
            Tick::TargetGone => {
                task.with_own_entry(|monitors| {
                    monitors.remove(&task.target_id);
                });
                break;
            }
        }
    }
}

async fn run_tick(target_id: &str, targets: &dyn TargetRepository, tester: &SpeedTester) -> Tick {
    let start = Instant::now();
    let success = match targets.find_by_id(target_id).await {
        Ok(Some(target)) => match tester.run(&target, None).await {
            Ok(completed) => completed.result.is_success(),
            Err(e) => {
                tracing::error!(target_id, error = %e, "Failed to record scheduled speed test");
                false
            }
        },
        Ok(None) => {
            tracing::error!(target_id, "Monitored target no longer exists, stopping monitor");
            return Tick::TargetGone;
        }
        Err(e) => {
            tracing::error!(target_id, error = %e, "Failed to load monitored target");
            false
        }
    };
    Tick::Ran {
        success,
        elapsed: start.elapsed(),
    }
}
