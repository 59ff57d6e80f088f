//! Periodic task runner for heartbeat ticks.
//!
//! Scheduling is fixed-delay: after each tick completes the runner waits a
//! full interval before starting the next one, so ticks never overlap and a
//! slow tick pushes later ticks back instead of bunching them up. The first
//! tick runs one interval after `start`.

use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, Instrument, Span};

struct Worker {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

/// Runs a job on its own tokio task until stopped.
#[derive(Default)]
pub struct PeriodicScheduler {
    worker: Option<Worker>,
}

impl PeriodicScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    /// Starts ticking. Returns `false` (and changes nothing) if already running.
    pub fn start<F, Fut>(&mut self, interval: Duration, mut job: F) -> bool
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        if self.is_running() {
            debug!("Scheduler already running");
            return false;
        }

        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(
            async move {
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(interval) => {}
                        // Stop requested, or the scheduler was dropped.
                        _ = &mut stop_rx => break,
                    }

                    if AssertUnwindSafe(job()).catch_unwind().await.is_err() {
                        error!("Scheduled job panicked; continuing with next tick");
                    }
                }
                debug!("Scheduler stopped");
            }
            .instrument(Span::current()),
        );

        self.worker = Some(Worker { stop_tx, handle });
        true
    }

    /// Stops ticking and waits for an in-flight tick to finish.
    ///
    /// Returns `false` if the scheduler was not running.
    pub async fn stop(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return false;
        };
        let _ = worker.stop_tx.send(());
        if let Err(e) = worker.handle.await {
            error!("Scheduler task ended abnormally: {}", e);
        }
        true
    }
}

impl Drop for PeriodicScheduler {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.handle.abort();
        }
    }
}

#[cfg(test)]
#[path = "tests/scheduler_tests.rs"]
mod tests;
