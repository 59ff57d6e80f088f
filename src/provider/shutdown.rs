//! Cooperative shutdown requests for a provider parked in blocking mode.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Requests a graceful shutdown of a blocking [`ServiceProvider`](super::ServiceProvider).
///
/// Cloneable; requesting twice is harmless. A request applies to the current
/// run only; the next `start()` begins unrequested.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<RunState>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RunState {
    run: u64,
    requested: bool,
}

impl ShutdownHandle {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(RunState::default());
        Self { tx }
    }

    /// Requests shutdown of the current run.
    pub fn request(&self) {
        self.tx.send_modify(|state| state.requested = true);
    }

    pub fn is_requested(&self) -> bool {
        self.tx.borrow().requested
    }

    /// Opens `run` with no request pending.
    pub(crate) fn begin(&self, run: u64) {
        self.tx.send_replace(RunState { run, requested: false });
    }

    /// Requests shutdown only if `run` is still the current run.
    pub(crate) fn request_run(&self, run: u64) {
        self.tx.send_if_modified(|state| {
            if state.run == run && !state.requested {
                state.requested = true;
                true
            } else {
                false
            }
        });
    }

    /// Resolves once shutdown of `run` is requested or a later run begins.
    pub(crate) async fn requested(&self, run: u64) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting.
        let _ = rx.wait_for(|state| state.run != run || state.requested).await;
    }

    /// Turns SIGINT/SIGTERM into a shutdown request until the returned task
    /// is aborted.
    pub(crate) fn listen_for_signals(&self) -> JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            let signal = wait_for_signal().await;
            info!("Received {}, shutting down", signal);
            handle.request();
        })
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!("Failed to install SIGTERM handler: {}", e);
            return wait_for_ctrl_c().await;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        name = wait_for_ctrl_c() => name,
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> &'static str {
    wait_for_ctrl_c().await
}

async fn wait_for_ctrl_c() -> &'static str {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for interrupt signal: {}", e);
        // Without a signal source only an explicit request can stop the provider.
        std::future::pending::<()>().await;
    }
    "SIGINT"
}
