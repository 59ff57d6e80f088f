//! Session lifecycle: connect with infinite retry, supervise, upsert, close.
//!
//! Once connected, a supervisor task watches the live handle. When the
//! service ends the session it clears the handle, so `upsert` fails fast with
//! [`SessionError::NotConnected`], and reconnects with the same backoff
//! policy as the initial connect. The supervisor never runs on the caller's
//! or the scheduler's task.

use super::{BackoffPolicy, Coordinator, NodeKind, SessionHandle};
use crate::error::SessionError;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Log connect failures at warn on the first attempt and then every Nth.
const WARN_EVERY_N_FAILURES: u32 = 10;

/// The live handle, tagged with the close epoch it was installed under.
type Installed<H> = Option<(u64, Arc<H>)>;
type CurrentHandle<H> = Arc<watch::Sender<Installed<H>>>;

/// Owns the connection to the coordination service.
pub struct CoordinationSession<C: Coordinator> {
    coordinator: Arc<C>,
    backoff: BackoffPolicy,
    request_timeout: Duration,
    /// Live handle, `None` while disconnected.
    current: CurrentHandle<C::Handle>,
    /// Bumped by every `close()`. Connects and supervisors that started
    /// under an older epoch give up.
    close_epoch: watch::Sender<u64>,
    /// Serializes concurrent `connect()` calls.
    connect_lock: tokio::sync::Mutex<()>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl<C: Coordinator> CoordinationSession<C> {
    pub fn new(coordinator: C, backoff: BackoffPolicy, request_timeout: Duration) -> Self {
        let (current, _) = watch::channel(None);
        let (close_epoch, _) = watch::channel(0);
        Self {
            coordinator: Arc::new(coordinator),
            backoff,
            request_timeout,
            current: Arc::new(current),
            close_epoch,
            connect_lock: tokio::sync::Mutex::new(()),
            supervisor: Mutex::new(None),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.current.borrow().is_some()
    }

    /// Establishes a session, retrying forever with capped backoff.
    ///
    /// May wait indefinitely. Returns [`SessionError::Closed`] only when
    /// [`close`](Self::close) is called before a session is established.
    pub async fn connect(&self) -> Result<(), SessionError> {
        let _guard = self.connect_lock.lock().await;
        let epoch = *self.close_epoch.borrow();

        if self.supervisor_alive() {
            // Already connected, or the supervisor is reconnecting.
            return self.wait_connected(epoch).await;
        }

        let mut closing = self.close_epoch.subscribe();
        let handle = establish(self.coordinator.as_ref(), self.backoff, &mut closing, epoch).await?;

        let (installed, stale) = {
            let mut supervisor = lock(&self.supervisor);
            if *self.close_epoch.borrow() != epoch {
                (false, None)
            } else {
                // A close still tearing down an older session may not have
                // taken its handle yet.
                let stale = self.current.send_replace(Some((epoch, handle.clone())));
                *supervisor = Some(tokio::spawn(supervise(
                    self.coordinator.clone(),
                    self.backoff,
                    self.current.clone(),
                    handle.clone(),
                    closing,
                    epoch,
                )));
                (true, stale)
            }
        };
        if let Some((_, stale)) = stale {
            stale.close().await;
        }
        if !installed {
            handle.close().await;
            return Err(SessionError::Closed);
        }

        info!(target_ensemble = %self.coordinator.describe(), "Coordination session established");
        Ok(())
    }

    /// Writes `payload` at `node_path`, creating it as an ephemeral node
    /// (and the containers of `root_path`) when missing.
    ///
    /// Fails fast when disconnected; never retries.
    pub async fn upsert(
        &self,
        root_path: &str,
        node_path: &str,
        payload: &[u8],
    ) -> Result<(), SessionError> {
        let handle = self
            .current
            .borrow()
            .as_ref()
            .map(|(_, handle)| handle.clone())
            .ok_or(SessionError::NotConnected)?;

        tokio::time::timeout(
            self.request_timeout,
            upsert_with(handle.as_ref(), root_path, node_path, payload),
        )
        .await
        .map_err(|_| SessionError::Timeout(self.request_timeout))?
    }

    /// Releases the session. Ephemeral nodes owned by it disappear.
    ///
    /// Idempotent; also cancels a `connect()` that is still retrying. A
    /// session established by a `connect()` that began after this call is
    /// left alone.
    pub async fn close(&self) {
        let (epoch, supervisor) = {
            let mut supervisor = lock(&self.supervisor);
            let mut epoch = 0;
            self.close_epoch.send_modify(|current| {
                *current += 1;
                epoch = *current;
            });
            (epoch, supervisor.take())
        };
        if let Some(task) = supervisor {
            // The supervisor observes the epoch at every await point.
            let _ = task.await;
        }

        let mut taken = None;
        self.current.send_if_modified(|slot| {
            if slot.as_ref().is_some_and(|(owner, _)| *owner < epoch) {
                taken = slot.take();
                true
            } else {
                false
            }
        });
        match taken {
            Some((_, handle)) => {
                handle.close().await;
                info!("Coordination session closed");
            }
            None => debug!("Coordination session already closed"),
        }
    }

    fn supervisor_alive(&self) -> bool {
        lock(&self.supervisor)
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    async fn wait_connected(&self, epoch: u64) -> Result<(), SessionError> {
        let mut current = self.current.subscribe();
        let mut closing = self.close_epoch.subscribe();
        tokio::select! {
            biased;
            _ = closing.wait_for(|current| *current != epoch) => Err(SessionError::Closed),
            res = current.wait_for(Option::is_some) => res.map(|_| ()).map_err(|_| SessionError::Closed),
        }
    }
}

impl<C: Coordinator> Drop for CoordinationSession<C> {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.supervisor).take() {
            task.abort();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Connect loop shared by the initial connect and every reconnect. Gives up
/// with [`SessionError::Closed`] once the close epoch moves past `epoch`.
async fn establish<C: Coordinator>(
    coordinator: &C,
    policy: BackoffPolicy,
    closing: &mut watch::Receiver<u64>,
    epoch: u64,
) -> Result<Arc<C::Handle>, SessionError> {
    let mut backoff = policy.start();
    loop {
        if *closing.borrow() != epoch {
            return Err(SessionError::Closed);
        }

        let attempt = tokio::select! {
            biased;
            _ = closing.wait_for(|current| *current != epoch) => return Err(SessionError::Closed),
            res = coordinator.connect() => res,
        };

        match attempt {
            Ok(handle) => {
                if backoff.attempts() > 0 {
                    info!(failed_attempts = backoff.attempts(), "Connected after retrying");
                }
                return Ok(Arc::new(handle));
            }
            Err(e) => {
                let delay = backoff.next_delay();
                let failures = backoff.attempts();
                if failures == 1 || failures.is_multiple_of(WARN_EVERY_N_FAILURES) {
                    warn!(
                        target_ensemble = %coordinator.describe(),
                        attempt = failures,
                        retry_in = ?delay,
                        "Connection attempt failed: {}", e
                    );
                } else {
                    debug!(attempt = failures, retry_in = ?delay, "Connection attempt failed: {}", e);
                }
                tokio::select! {
                    biased;
                    _ = closing.wait_for(|current| *current != epoch) => return Err(SessionError::Closed),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }
}

/// Watches the live handle and replaces it whenever the session ends.
async fn supervise<C: Coordinator>(
    coordinator: Arc<C>,
    policy: BackoffPolicy,
    current: CurrentHandle<C::Handle>,
    mut handle: Arc<C::Handle>,
    mut closing: watch::Receiver<u64>,
    epoch: u64,
) {
    loop {
        let reason = tokio::select! {
            biased;
            _ = closing.wait_for(|current| *current != epoch) => return,
            reason = handle.terminated() => reason,
        };

        // Only clear the slot if it still holds this supervisor's handle.
        current.send_if_modified(|slot| {
            if slot.as_ref().is_some_and(|(_, live)| Arc::ptr_eq(live, &handle)) {
                *slot = None;
                true
            } else {
                false
            }
        });
        warn!("Coordination session lost ({}), reconnecting", reason);
        handle.close().await;

        handle = match establish(coordinator.as_ref(), policy, &mut closing, epoch).await {
            Ok(handle) => handle,
            Err(_) => return,
        };
        let installed = current.send_if_modified(|slot| {
            if *closing.borrow() == epoch && slot.is_none() {
                *slot = Some((epoch, handle.clone()));
                true
            } else {
                false
            }
        });
        if !installed {
            handle.close().await;
            return;
        }
        info!("Coordination session re-established");
    }
}

async fn upsert_with<H: SessionHandle>(
    handle: &H,
    root_path: &str,
    node_path: &str,
    payload: &[u8],
) -> Result<(), SessionError> {
    if handle.exists(node_path).await? {
        match handle.set_data(node_path, payload).await {
            // Removed between the check and the write; fall through to create.
            Err(SessionError::NoNode(_)) => {}
            other => return other,
        }
    }

    ensure_path(handle, root_path).await?;
    match handle.create(node_path, payload, NodeKind::Ephemeral).await {
        Err(SessionError::NodeExists(_)) => handle.set_data(node_path, payload).await,
        other => other,
    }
}

/// Creates every missing container node along `path`.
async fn ensure_path<H: SessionHandle>(handle: &H, path: &str) -> Result<(), SessionError> {
    let mut prefix = String::with_capacity(path.len());
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        prefix.push('/');
        prefix.push_str(segment);
        if handle.exists(&prefix).await? {
            continue;
        }
        match handle.create(&prefix, &[], NodeKind::Persistent).await {
            Ok(()) | Err(SessionError::NodeExists(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
