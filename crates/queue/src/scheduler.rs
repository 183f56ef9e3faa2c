//! Periodic poll maintenance tasks.
//!
//! Two tasks run on independent intervals: the lifecycle task (retire then
//! publish) and the statistics task. Each task owns a [`TaskState`] whose
//! in-flight flag keeps at most one run of that task alive; a tick that
//! arrives while the previous run is still going is skipped.

#![allow(missing_docs)]

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_common::config::SchedulerSettings;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

/// Error type returned by scheduled jobs.
pub type JobError = Box<dyn std::error::Error + Send + Sync>;

/// Result of one scheduled job run: the number of changes applied.
pub type JobResult = Result<u64, JobError>;

/// Scheduled job types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ScheduledJob {
    /// Retire expired polls, then publish the next due poll.
    PollLifecycle,
    /// Recompute vote statistics snapshots.
    AggregateStatistics,
}

impl ScheduledJob {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::PollLifecycle => "poll_lifecycle",
            Self::AggregateStatistics => "aggregate_statistics",
        }
    }
}

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Whether any task is started at all.
    pub enabled: bool,
    /// Interval for the lifecycle task (default: 30 seconds).
    pub lifecycle_interval: Duration,
    /// Interval for statistics aggregation (default: 1 minute).
    pub aggregation_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from(&SchedulerSettings::default())
    }
}

impl From<&SchedulerSettings> for SchedulerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            enabled: settings.enabled,
            lifecycle_interval: Duration::from_secs(settings.lifecycle_interval_secs.max(1)),
            aggregation_interval: Duration::from_secs(settings.aggregation_interval_secs.max(1)),
        }
    }
}

/// Run bookkeeping for one scheduled task.
///
/// Starts idle with zeroed counters and no timestamps.
#[derive(Debug)]
pub struct TaskState {
    job: ScheduledJob,
    in_flight: AtomicBool,
    runs: AtomicU64,
    skipped: AtomicU64,
    failures: AtomicU64,
    /// Milliseconds since the epoch, `0` when unset.
    last_started: AtomicI64,
    last_finished: AtomicI64,
}

/// Point-in-time view of a [`TaskState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub job: ScheduledJob,
    pub in_flight: bool,
    pub runs: u64,
    pub skipped: u64,
    pub failures: u64,
    pub last_started: Option<DateTime<Utc>>,
    pub last_finished: Option<DateTime<Utc>>,
}

impl TaskState {
    #[must_use]
    pub const fn new(job: ScheduledJob) -> Self {
        Self {
            job,
            in_flight: AtomicBool::new(false),
            runs: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            last_started: AtomicI64::new(0),
            last_finished: AtomicI64::new(0),
        }
    }

    #[must_use]
    pub const fn job(&self) -> ScheduledJob {
        self.job
    }

    /// Claim the task for a run. `None` (and a skip recorded) if a run is
    /// already in flight.
    pub fn try_begin(self: &Arc<Self>, now: DateTime<Utc>) -> Option<RunGuard> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        self.runs.fetch_add(1, Ordering::Relaxed);
        self.last_started
            .store(now.timestamp_millis(), Ordering::Relaxed);
        Some(RunGuard {
            state: self.clone(),
            failed: false,
        })
    }

    #[must_use]
    pub fn status(&self) -> TaskStatus {
        TaskStatus {
            job: self.job,
            in_flight: self.in_flight.load(Ordering::Acquire),
            runs: self.runs.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            last_started: millis_to_time(self.last_started.load(Ordering::Relaxed)),
            last_finished: millis_to_time(self.last_finished.load(Ordering::Relaxed)),
        }
    }
}

fn millis_to_time(millis: i64) -> Option<DateTime<Utc>> {
    if millis == 0 {
        None
    } else {
        DateTime::from_timestamp_millis(millis)
    }
}

/// Held for the duration of one run. Dropping it releases the task.
#[derive(Debug)]
pub struct RunGuard {
    state: Arc<TaskState>,
    failed: bool,
}

impl RunGuard {
    /// Count this run as failed.
    pub fn mark_failed(&mut self) {
        self.failed = true;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.failed {
            self.state.failures.fetch_add(1, Ordering::Relaxed);
        }
        self.state
            .last_finished
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
        self.state.in_flight.store(false, Ordering::Release);
    }
}

/// Scheduler state for tracking job runs.
#[derive(Debug)]
pub struct SchedulerState {
    pub lifecycle: Arc<TaskState>,
    pub aggregation: Arc<TaskState>,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            lifecycle: Arc::new(TaskState::new(ScheduledJob::PollLifecycle)),
            aggregation: Arc::new(TaskState::new(ScheduledJob::AggregateStatistics)),
        }
    }
}

impl SchedulerState {
    #[must_use]
    pub fn statuses(&self) -> Vec<TaskStatus> {
        vec![self.lifecycle.status(), self.aggregation.status()]
    }
}

/// Job executor trait for scheduled jobs.
#[async_trait::async_trait]
pub trait JobExecutor: Send + Sync {
    /// Run the retire and publish passes as of `now`.
    async fn run_lifecycle(&self, now: DateTime<Utc>) -> JobResult;

    /// Run one statistics aggregation pass as of `now`.
    async fn aggregate_statistics(&self, now: DateTime<Utc>) -> JobResult;
}

/// Handle to the running scheduler tasks.
#[derive(Debug)]
pub struct SchedulerHandle {
    state: Arc<SchedulerState>,
    tasks: Vec<JoinHandle<()>>,
}

impl SchedulerHandle {
    #[must_use]
    pub fn state(&self) -> Arc<SchedulerState> {
        self.state.clone()
    }

    /// Whether any tick loop is still running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.tasks.iter().any(|task| !task.is_finished())
    }

    /// Stop the tick loops. Runs already in flight are left to finish.
    pub fn shutdown(self) {
        for task in &self.tasks {
            task.abort();
        }
        tracing::info!("Scheduler stopped");
    }
}

/// Start the scheduler with the given configuration and executor.
///
/// Must be called from within a Tokio runtime.
pub fn run_scheduler<E: JobExecutor + 'static>(
    config: SchedulerConfig,
    executor: Arc<E>,
) -> SchedulerHandle {
    let state = Arc::new(SchedulerState::default());

    if !config.enabled {
        tracing::info!("Scheduler disabled by configuration");
        return SchedulerHandle {
            state,
            tasks: Vec::new(),
        };
    }

    let executor_lifecycle = executor.clone();
    let executor_stats = executor;

    let lifecycle = spawn_task(
        config.lifecycle_interval,
        state.lifecycle.clone(),
        move |now| {
            let executor = executor_lifecycle.clone();
            async move { executor.run_lifecycle(now).await }
        },
    );

    let aggregation = spawn_task(
        config.aggregation_interval,
        state.aggregation.clone(),
        move |now| {
            let executor = executor_stats.clone();
            async move { executor.aggregate_statistics(now).await }
        },
    );

    tracing::info!(
        lifecycle_interval_secs = config.lifecycle_interval.as_secs(),
        aggregation_interval_secs = config.aggregation_interval.as_secs(),
        "Scheduler started"
    );

    SchedulerHandle {
        state,
        tasks: vec![lifecycle, aggregation],
    }
}

fn spawn_task<F, Fut>(period: Duration, state: Arc<TaskState>, job: F) -> JoinHandle<()>
where
    F: Fn(DateTime<Utc>) -> Fut + Send + 'static,
    Fut: Future<Output = JobResult> + Send + 'static,
{
    tokio::spawn(async move {
        let mut interval = interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let name = state.job().name();

        loop {
            interval.tick().await;
            let now = Utc::now();

            let Some(mut guard) = state.try_begin(now) else {
                tracing::debug!(task = name, "Previous run still in flight, skipping tick");
                continue;
            };

            let run = job(now);
            tokio::spawn(async move {
                match run.await {
                    Ok(count) => {
                        if count > 0 {
                            tracing::info!(task = name, count, "Scheduled task applied changes");
                        }
                    }
                    Err(e) => {
                        guard.mark_failed();
                        tracing::error!(task = name, error = %e, "Scheduled task failed");
                    }
                }
                drop(guard);
            });
        }
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_config_default() {
        let config = SchedulerConfig::default();
        assert!(config.enabled);
        assert_eq!(config.lifecycle_interval, Duration::from_secs(30));
        assert_eq!(config.aggregation_interval, Duration::from_secs(60));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let settings = SchedulerSettings {
            lifecycle_interval_secs: 0,
            ..SchedulerSettings::default()
        };
        let config = SchedulerConfig::from(&settings);
        assert_eq!(config.lifecycle_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_task_state_starts_idle() {
        let state = SchedulerState::default();
        let status = state.lifecycle.status();
        assert!(!status.in_flight);
        assert_eq!(status.runs, 0);
        assert!(status.last_started.is_none());
        assert!(status.last_finished.is_none());
    }

    #[test]
    fn test_single_flight_guard() {
        let state = Arc::new(TaskState::new(ScheduledJob::PollLifecycle));
        let now = Utc::now();

        let guard = state.try_begin(now).unwrap();
        assert!(state.try_begin(now).is_none());
        assert!(state.status().in_flight);

        drop(guard);
        let status = state.status();
        assert!(!status.in_flight);
        assert_eq!(status.runs, 1);
        assert_eq!(status.skipped, 1);
        assert_eq!(status.failures, 0);
        assert!(status.last_finished.is_some());
        assert!(state.try_begin(now).is_some());
    }

    #[test]
    fn test_failed_run_is_counted() {
        let state = Arc::new(TaskState::new(ScheduledJob::AggregateStatistics));
        let mut guard = state.try_begin(Utc::now()).unwrap();
        guard.mark_failed();
        drop(guard);
        assert_eq!(state.status().failures, 1);
    }
}
