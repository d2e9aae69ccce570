//! Fixed-interval task scheduler.
//!
//! A [`Scheduler`] is created by the process orchestrator and passed to
//! whatever registers periodic work. Each scheduled [`Job`] gets its own
//! task that fires every `interval`, one run at a time: a run that overruns
//! the interval delays the next one instead of overlapping it.
//!
//! Shutdown is cooperative. [`Scheduler::stop`] cancels the token handed to
//! every run, and [`Scheduler::wait`] waits for in-flight runs to return.

use std::{sync::Arc, time::Duration};

use futures_util::future::BoxFuture;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::{sync::CancellationToken, task::TaskTracker};
use tracing::Instrument;

use crate::{error::Error, utils::trace_id};

/// A unit of periodic work.
pub trait Job: Send + Sync + 'static {
    /// Runs once. `cancel` fires when the scheduler is stopping; the job
    /// should wind down and return promptly.
    fn run<'a>(&'a self, cancel: &'a CancellationToken) -> BoxFuture<'a, Result<(), Error>>;
}

pub struct Scheduler {
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Starts running `job` every `interval`, first firing one interval from now.
    ///
    /// Each run executes in a `task` span carrying the task name and a fresh
    /// trace id. Failed runs are logged and do not stop the schedule.
    ///
    /// # Panics
    /// If `interval` is zero.
    pub fn schedule(&self, name: &'static str, interval: Duration, job: Arc<dyn Job>) {
        let cancel = self.cancel.clone();

        self.tracker.spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            tracing::info!(task = name, ?interval, "scheduled task");

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let span = tracing::info_span!("task", task = name, trace_id = %trace_id());
                match job.run(&cancel).instrument(span.clone()).await {
                    Ok(()) => {}
                    Err(e) if e.is_interrupted() => {
                        span.in_scope(|| tracing::warn!(error = %e, "task run interrupted"));
                    }
                    Err(e) => {
                        span.in_scope(|| tracing::error!(error = %e, "task run failed"));
                    }
                }
            }

            tracing::info!(task = name, "task stopped");
        });
    }

    /// Signals every task to stop after its current run.
    pub fn stop(&self) {
        self.cancel.cancel();
        self.tracker.close();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Waits for all tasks to finish, up to `grace`.
    ///
    /// Returns `false` if some run was still going when the grace period ran
    /// out. Only meaningful after [`Scheduler::stop`].
    pub async fn wait(&self, grace: Duration) -> bool {
        tokio::time::timeout(grace, self.tracker.wait()).await.is_ok()
    }
}
