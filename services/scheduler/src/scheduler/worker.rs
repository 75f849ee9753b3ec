//! Harmonization background worker.
//!
//! Runs one pass on startup, then one per interval. Passes are skipped while
//! this node is not the controlling leader.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use super::{HarmonizeStats, Scheduler};

/// Worker that drives [`Scheduler::harmonize`] on a timer.
pub struct HarmonizationWorker {
    scheduler: Arc<Scheduler>,
    interval: Duration,
}

impl HarmonizationWorker {
    /// Create a worker using the scheduler's configured interval.
    pub fn new(scheduler: Arc<Scheduler>) -> Self {
        let interval = scheduler.config().harmonization_interval;
        Self {
            scheduler,
            interval,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Run until shutdown is signaled.
    #[instrument(skip(self, shutdown), name = "harmonization_worker")]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Starting harmonization worker"
        );

        // The first tick completes immediately, giving the startup pass.
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.run_once().await;
                }
                changed = shutdown.changed() => {
                    // A dropped sender also stops the worker.
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Harmonization worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Run a single pass if this node is the controlling leader.
    pub async fn run_once(&self) -> Option<HarmonizeStats> {
        if !self.scheduler.membership().is_controlling_leader() {
            debug!("Not the controlling leader, skipping harmonization");
            return None;
        }

        match self.scheduler.harmonize().await {
            Ok(stats) => Some(stats),
            Err(e) => {
                error!(error = %e, "Harmonization failed");
                None
            }
        }
    }
}
