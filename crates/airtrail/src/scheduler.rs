//! Periodic poll scheduling.
//!
//! A [`Scheduler`] drives one [`TilePoller`] on a fixed interval from a
//! spawned tokio task. It is an owned object, not process-global state, so
//! several can coexist (tests do this).

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::poller::{PollOutcome, TilePoller};

/// Default time between poll cycles.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Runs poll cycles on an interval until stopped.
#[derive(Debug)]
pub struct Scheduler {
    poller: Arc<TilePoller>,
    interval: Duration,
    running: Arc<AtomicBool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Scheduler {
    /// Create a stopped scheduler.
    #[must_use]
    pub fn new(poller: Arc<TilePoller>, interval: Duration) -> Self {
        Self {
            poller,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            task: Mutex::new(None),
        }
    }

    /// The poll interval.
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Whether the polling loop is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Start polling. The first cycle runs immediately.
    ///
    /// Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SchedulerAlreadyRunning`] if already started, a
    /// validation error for a zero interval, or an internal error outside a
    /// tokio runtime.
    pub fn start(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::config_validation(
                "poll interval must be greater than 0",
            ));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::internal(format!("no tokio runtime: {e}")))?;

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::SchedulerAlreadyRunning);
        }

        let poller = Arc::clone(&self.poller);
        let running = Arc::clone(&self.running);
        let interval = self.interval;

        let handle = runtime.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                if !running.load(Ordering::SeqCst) {
                    break;
                }

                match poller.poll_once().await {
                    Ok(PollOutcome::Completed(report)) => {
                        debug!(ingested = report.ingested, "Scheduled poll finished");
                    }
                    Ok(PollOutcome::Skipped) => {
                        debug!("Scheduled poll skipped, previous cycle still running");
                    }
                    Err(e) => {
                        error!(error = %e, "Poll cycle failed");
                    }
                }
            }
        });

        let mut task = self
            .task
            .lock()
            .map_err(|_| Error::internal("scheduler task lock poisoned"))?;
        *task = Some(handle);

        info!(
            interval_secs = interval.as_secs(),
            tiles = self.poller.tiles().len(),
            "Scheduler started"
        );
        Ok(())
    }

    /// Stop polling. Does nothing if already stopped.
    ///
    /// A cycle in progress is aborted at its next await point; a batch
    /// already handed to the store still commits.
    pub fn stop(&self) {
        let was_running = self.running.swap(false, Ordering::SeqCst);

        let handle = match self.task.lock() {
            Ok(mut task) => task.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle.abort();
        }

        if was_running {
            info!("Scheduler stopped");
        }
    }

    /// Run until `shutdown` resolves, then stop.
    ///
    /// # Errors
    ///
    /// Returns an error if the scheduler cannot be started.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.start()?;
        shutdown.await;
        self.stop();
        Ok(())
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}
