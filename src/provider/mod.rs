//! The Ranger service provider: keeps one node registered and fresh.
//!
//! Owns one [`CoordinationSession`], one [`PeriodicScheduler`] and one
//! [`HealthProbe`]. Each tick probes health, builds a fresh [`ServiceNode`]
//! and upserts it; failures are logged and the next tick is the retry.
//!
//! Run it in the background with `start(false)` and call `stop()` when done,
//! or park the caller with `start(true)` until SIGINT/SIGTERM (or a request
//! through [`ShutdownHandle`]) triggers a graceful stop.

mod shutdown;

pub use shutdown::ShutdownHandle;

use crate::coordination::{Coordinator, CoordinationSession, ZookeeperCoordinator};
use crate::error::TickError;
use crate::health::HealthProbe;
use crate::registry::{ClusterDetails, HealthcheckStatus, ServiceDetails, ServiceNode};
use crate::scheduler::PeriodicScheduler;
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, error, info, info_span, Instrument, Span};

/// Registers a service instance and refreshes it until stopped.
pub struct ServiceProvider<C: Coordinator = ZookeeperCoordinator> {
    cluster: ClusterDetails,
    heartbeat: Arc<Heartbeat<C>>,
    lifecycle: Mutex<Lifecycle>,
    /// Held across scheduler start, stop and session close.
    scheduler: tokio::sync::Mutex<PeriodicScheduler>,
    shutdown: ShutdownHandle,
    span: Span,
}

impl ServiceProvider<ZookeeperCoordinator> {
    /// Creates a provider publishing to the ZooKeeper ensemble in `cluster`.
    pub fn new(cluster: ClusterDetails, service: ServiceDetails, probe: HealthProbe) -> Self {
        let coordinator = ZookeeperCoordinator::new(cluster.connection_string());
        Self::with_coordinator(cluster, service, probe, coordinator)
    }
}

impl<C: Coordinator> ServiceProvider<C> {
    pub fn with_coordinator(
        cluster: ClusterDetails,
        service: ServiceDetails,
        probe: HealthProbe,
        coordinator: C,
    ) -> Self {
        let span = info_span!(
            "ranger_provider",
            service = %service.root_path(),
            node = %service.node_path()
        );
        let session =
            CoordinationSession::new(coordinator, cluster.backoff(), cluster.request_timeout());
        Self {
            heartbeat: Arc::new(Heartbeat::new(service, session, probe)),
            cluster,
            lifecycle: Mutex::new(Lifecycle::default()),
            scheduler: tokio::sync::Mutex::new(PeriodicScheduler::new()),
            shutdown: ShutdownHandle::new(),
            span,
        }
    }

    /// Replaces the span all provider logs are recorded under.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle().running
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    pub fn service_details(&self) -> &ServiceDetails {
        &self.heartbeat.service
    }

    pub fn cluster_details(&self) -> &ClusterDetails {
        &self.cluster
    }

    /// Connects (retrying forever) and starts the heartbeat.
    ///
    /// With `blocking`, waits for SIGINT/SIGTERM or a [`ShutdownHandle`]
    /// request and stops before returning. A no-op if already running.
    pub async fn start(&self, blocking: bool) {
        self.run(blocking).instrument(self.span.clone()).await
    }

    /// Stops the heartbeat and closes the session, removing the node.
    ///
    /// A no-op if already stopped.
    pub async fn stop(&self) {
        self.halt(None).instrument(self.span.clone()).await
    }

    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn is_current(&self, run: u64) -> bool {
        let state = self.lifecycle();
        state.running && state.run == run
    }

    async fn run(&self, blocking: bool) {
        let run = {
            let mut state = self.lifecycle();
            if state.running {
                None
            } else {
                state.running = true;
                state.run += 1;
                Some(state.run)
            }
        };
        let Some(run) = run else {
            info!("Already started");
            return;
        };
        self.shutdown.begin(run);
        info!(
            run,
            connection = self.cluster.connection_string(),
            interval = ?self.cluster.update_interval(),
            environment = %self.heartbeat.service.environment(),
            "Starting ranger updates"
        );

        if !self.launch(run).await {
            return;
        }

        if blocking {
            let listener = self.shutdown.listen_for_signals();
            self.shutdown.requested(run).await;
            listener.abort();
            self.halt(Some(run)).await;
        }
    }

    /// Connects and starts the scheduler. Returns `false` once `run` has
    /// been stopped.
    async fn launch(&self, run: u64) -> bool {
        let session = &self.heartbeat.session;
        loop {
            if let Err(e) = session.connect().await {
                if self.is_current(run) {
                    // The previous run closed the session under us.
                    debug!("Connect interrupted by an earlier stop, retrying: {}", e);
                    continue;
                }
                info!("Start interrupted: {}", e);
                return false;
            }

            let mut scheduler = self.scheduler.lock().await;
            if !self.is_current(run) {
                // A newer run shares the session; only an idle provider closes it.
                if !self.is_running() {
                    session.close().await;
                }
                drop(scheduler);
                info!("Stopped while connecting");
                return false;
            }
            // A stop/start pair may have closed the session we connected.
            if session.is_connected() {
                let heartbeat = self.heartbeat.clone();
                scheduler.start(self.cluster.update_interval(), move || {
                    let heartbeat = heartbeat.clone();
                    async move { heartbeat.tick().await }
                });
                return true;
            }
        }
    }

    /// Stops the current run, or only `expected` when given.
    async fn halt(&self, expected: Option<u64>) {
        let run = {
            let mut state = self.lifecycle();
            if !state.running || expected.is_some_and(|run| run != state.run) {
                None
            } else {
                state.running = false;
                Some(state.run)
            }
        };
        let Some(run) = run else {
            info!("Already stopped");
            return;
        };
        info!(run, "Stopping all updates and cleaning up");
        {
            let mut scheduler = self.scheduler.lock().await;
            scheduler.stop().await;
            self.heartbeat.session.close().await;
        }
        // Release a caller parked in `start(true)` for this run.
        self.shutdown.request_run(run);
    }
}

#[derive(Debug, Default)]
struct Lifecycle {
    running: bool,
    /// Incremented by every successful `start()`.
    run: u64,
}

/// State touched by every tick.
struct Heartbeat<C: Coordinator> {
    service: ServiceDetails,
    root_path: String,
    node_path: String,
    session: CoordinationSession<C>,
    probe: HealthProbe,
    clock: MonotonicClock,
}

impl<C: Coordinator> Heartbeat<C> {
    fn new(service: ServiceDetails, session: CoordinationSession<C>, probe: HealthProbe) -> Self {
        Self {
            root_path: service.root_path(),
            node_path: service.node_path(),
            service,
            session,
            probe,
            clock: MonotonicClock::default(),
        }
    }

    async fn tick(&self) {
        match self.beat().await {
            Ok(node) => debug!(
                status = ?node.healthcheck_status,
                timestamp = node.last_updated_time_stamp,
                "Node updated"
            ),
            Err(e) => error!("Error while updating node: {}", e),
        }
    }

    async fn beat(&self) -> Result<ServiceNode, TickError> {
        let status = HealthcheckStatus::from(self.probe.is_healthy().await);
        let node = self.service.to_node(status, self.clock.now_millis());
        let payload = node.to_bytes()?;
        debug!("Updating with: {}", String::from_utf8_lossy(&payload));
        self.session
            .upsert(&self.root_path, &self.node_path, &payload)
            .await?;
        Ok(node)
    }
}

/// Wall-clock epoch milliseconds that never go backwards.
#[derive(Debug, Default)]
struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    fn now_millis(&self) -> i64 {
        let now = Utc::now().timestamp_millis();
        let previous = self.last.fetch_max(now, Ordering::SeqCst);
        previous.max(now)
    }
}

#[cfg(test)]
#[path = "tests/provider_tests.rs"]
mod tests;
