//! Background wake-ups for the queue drainer
//!
//! Two triggers feed the same single-flight [`WorkerLoop`]:
//!
//! - a periodic wake every [`SchedulerConfig::effective_wake_interval`], the
//!   first one right at [`BackgroundScheduler::start`], which runs
//!   [`WorkerLoop::recover_and_drain`] so items interrupted by a killed
//!   process are picked up again
//! - a foreground transition (`background`/`inactive` → `active`) reported
//!   through [`BackgroundScheduler::notify_app_state`], which runs a plain drain
//!
//! # Example
//!
//! ```no_run
//! use chapter_dl::scheduler::BackgroundScheduler;
//! use chapter_dl::types::AppState;
//! # use chapter_dl::worker::WorkerLoop;
//! # use std::sync::Arc;
//! # fn example(worker: Arc<WorkerLoop>) {
//! let scheduler = BackgroundScheduler::new(worker, &Default::default());
//! scheduler.start();
//! scheduler.notify_app_state(AppState::Background);
//! scheduler.notify_app_state(AppState::Active); // triggers a drain
//! # }
//! ```

use crate::config::SchedulerConfig;
use crate::types::AppState;
use crate::worker::{DrainOutcome, WorkerLoop};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Periodic and foreground-transition trigger for a [`WorkerLoop`]
pub struct BackgroundScheduler {
    worker: Arc<WorkerLoop>,
    interval: Duration,
    app_state: Mutex<AppState>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl BackgroundScheduler {
    /// Create a scheduler; nothing runs until [`start`](Self::start)
    ///
    /// The wake interval is clamped to [`crate::config::MIN_WAKE_INTERVAL`].
    pub fn new(worker: Arc<WorkerLoop>, config: &SchedulerConfig) -> Self {
        Self::with_interval(worker, config.effective_wake_interval())
    }

    /// Create a scheduler with an exact, unclamped wake interval
    pub(crate) fn with_interval(worker: Arc<WorkerLoop>, interval: Duration) -> Self {
        Self {
            worker,
            interval,
            app_state: Mutex::new(AppState::Active),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        }
    }

    /// Effective interval between periodic wake-ups
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the periodic wake task
    ///
    /// Returns `false` if the task is already running or the scheduler was
    /// stopped.
    pub fn start(&self) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }

        let mut task = lock(&self.task);
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return false;
        }

        *task = Some(tokio::spawn(run(
            Arc::clone(&self.worker),
            self.interval,
            self.cancel.clone(),
        )));
        true
    }

    /// Whether the periodic wake task is running
    pub fn is_running(&self) -> bool {
        lock(&self.task)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Record a host lifecycle change
    ///
    /// Returns the spawned drain when the change is a transition to
    /// [`AppState::Active`] from another state.
    pub fn notify_app_state(&self, state: AppState) -> Option<JoinHandle<()>> {
        let previous = std::mem::replace(&mut *lock(&self.app_state), state);
        debug!(?previous, ?state, "App state changed");

        if state != AppState::Active || previous == AppState::Active {
            return None;
        }
        if self.cancel.is_cancelled() {
            return None;
        }

        info!("App returned to foreground, draining queue");
        let worker = Arc::clone(&self.worker);
        Some(tokio::spawn(async move {
            log_outcome("foreground", worker.drain().await);
        }))
    }

    /// Last reported host lifecycle state
    pub fn app_state(&self) -> AppState {
        *lock(&self.app_state)
    }

    /// Stop the periodic wake task and wait for it to exit
    ///
    /// A drain started by the periodic task is abandoned at its next await
    /// point; its item stays `active` until the next recovery.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = lock(&self.task).take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
            && !e.is_cancelled()
        {
            warn!(error = %e, "Background scheduler task panicked");
        }
    }
}

impl Drop for BackgroundScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(worker: Arc<WorkerLoop>, interval: Duration, cancel: CancellationToken) {
    info!(interval_secs = interval.as_secs(), "Background scheduler started");

    // First tick completes immediately
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                debug!("Periodic wake-up, checking queue");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    outcome = worker.recover_and_drain() => log_outcome("periodic", outcome),
                }
            }
        }
    }

    info!("Background scheduler stopped");
}

fn log_outcome(trigger: &str, outcome: crate::Result<DrainOutcome>) {
    match outcome {
        Ok(DrainOutcome::Completed(report)) => debug!(
            trigger,
            completed = report.completed.len(),
            failed = report.failed.len(),
            recovered = report.recovered,
            "Drain finished"
        ),
        Ok(DrainOutcome::AlreadyRunning) => debug!(trigger, "Drain already running"),
        Err(e) => warn!(trigger, error = %e, "Drain aborted"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
