//! Run bookkeeping for the monitor scheduler: per-target run state,
//! scheduler-wide counters and the derived health report.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Consecutive failed runs after which a target counts as failing.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 3;

/// Failure rate above which the scheduler reports an issue.
const MAX_FAILURE_RATE: f64 = 0.5;

/// Share of failing targets above which the scheduler reports an issue.
const MAX_FAILING_TARGET_SHARE: f64 = 0.3;

/// Schedule and outcome history of one monitored target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetRunState {
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    /// Failed runs since the last successful one.
    pub failure_count: u32,
}

impl TargetRunState {
    pub(crate) fn scheduled(interval: Duration) -> Self {
        Self {
            next_run: after(Utc::now(), interval),
            ..Self::default()
        }
    }

    pub(crate) fn record(&mut self, success: bool, interval: Duration) {
        let now = Utc::now();
        self.last_run = Some(now);
        self.next_run = after(now, interval);
        if success {
            self.failure_count = 0;
        } else {
            self.failure_count = self.failure_count.saturating_add(1);
        }
    }
}

fn after(now: DateTime<Utc>, interval: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(interval)
        .ok()
        .and_then(|step| now.checked_add_signed(step))
}

/// Counters over every run since the scheduler was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct RunTotals {
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    pub total_run_time: Duration,
}

impl RunTotals {
    pub fn record(&mut self, success: bool, elapsed: Duration) {
        self.total_runs += 1;
        if success {
            self.successful_runs += 1;
        } else {
            self.failed_runs += 1;
        }
        self.total_run_time = self.total_run_time.saturating_add(elapsed);
    }
}

/// Snapshot of the scheduler's activity.
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerStats {
    /// Targets currently monitored.
    pub total_targets: usize,
    /// Monitored targets at or above the failure threshold.
    pub failed_targets: usize,
    pub total_runs: u64,
    pub successful_runs: u64,
    pub failed_runs: u64,
    /// Mean wall-clock time of a run; zero before the first run.
    pub average_run_time: Duration,
    /// Time since the scheduler was created.
    pub uptime: Duration,
    /// Whether [`stop_all`](crate::MonitorScheduler::stop_all) ran and no
    /// monitor was started since.
    pub stopped: bool,
}

impl SchedulerStats {
    pub(crate) fn new(
        total_targets: usize,
        failed_targets: usize,
        totals: RunTotals,
        uptime: Duration,
        stopped: bool,
    ) -> Self {
        let average_run_time = match u32::try_from(totals.total_runs) {
            Ok(0) => Duration::ZERO,
            Ok(runs) => totals.total_run_time / runs,
            Err(_) => Duration::from_secs_f64(
                totals.total_run_time.as_secs_f64() / totals.total_runs as f64,
            ),
        };
        Self {
            total_targets,
            failed_targets,
            total_runs: totals.total_runs,
            successful_runs: totals.successful_runs,
            failed_runs: totals.failed_runs,
            average_run_time,
            uptime,
            stopped,
        }
    }

    /// Failed runs over all runs; zero before the first run.
    pub fn failure_rate(&self) -> f64 {
        if self.total_runs == 0 {
            return 0.0;
        }
        self.failed_runs as f64 / self.total_runs as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Degraded => "degraded",
            Self::Unhealthy => "unhealthy",
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HealthStatus {
    pub status: HealthState,
    pub issues: Vec<String>,
    pub last_check: DateTime<Utc>,
}

impl HealthStatus {
    /// No issues is healthy, one or two is degraded, more is unhealthy.
    pub fn from_stats(stats: &SchedulerStats) -> Self {
        let mut issues = Vec::new();

        let failure_rate = stats.failure_rate();
        if failure_rate > MAX_FAILURE_RATE {
            issues.push(format!("High failure rate: {:.1}%", failure_rate * 100.0));
        }
        if stats.failed_targets as f64 > stats.total_targets as f64 * MAX_FAILING_TARGET_SHARE {
            issues.push(format!(
                "Many targets failing: {}/{}",
                stats.failed_targets, stats.total_targets
            ));
        }
        if stats.stopped {
            issues.push("Scheduler is stopped".to_string());
        }

        let status = match issues.len() {
            0 => HealthState::Healthy,
            1 | 2 => HealthState::Degraded,
            _ => HealthState::Unhealthy,
        };
        Self {
            status,
            issues,
            last_check: Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == HealthState::Healthy
    }
}
