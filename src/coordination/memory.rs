//! In-process coordination service used by the tests.
//!
//! Models the parts of ZooKeeper the provider relies on: a node tree,
//! ephemeral nodes owned by sessions, server-side session expiry and
//! refused connections.

use super::{Coordinator, NodeKind, SessionHandle};
use crate::error::SessionError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub(crate) struct MemoryNode {
    pub data: Vec<u8>,
    pub owner: Option<u64>,
}

#[derive(Default)]
struct EnsembleState {
    nodes: BTreeMap<String, MemoryNode>,
    sessions: HashMap<u64, watch::Sender<bool>>,
    next_session: u64,
    refuse_connects: u32,
    unavailable: bool,
    connect_attempts: Vec<Instant>,
    writes: Vec<(String, Vec<u8>)>,
    latency: Duration,
}

#[derive(Default)]
pub(crate) struct MemoryEnsemble {
    state: Mutex<EnsembleState>,
}

impl MemoryEnsemble {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, EnsembleState> {
        self.state.lock().unwrap()
    }

    pub fn coordinator(self: &Arc<Self>) -> MemoryCoordinator {
        MemoryCoordinator {
            ensemble: self.clone(),
        }
    }

    /// Refuses the next `n` connection attempts.
    pub fn refuse_next_connects(&self, n: u32) {
        self.state().refuse_connects = n;
    }

    /// Refuses every connection attempt while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state().unavailable = unavailable;
    }

    /// Delays every request on a session by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    pub fn node(&self, path: &str) -> Option<MemoryNode> {
        self.state().nodes.get(path).cloned()
    }

    /// Full paths of the direct children of `path`.
    pub fn children(&self, path: &str) -> Vec<String> {
        let prefix = format!("{}/", path);
        self.state()
            .nodes
            .keys()
            .filter(|p| {
                p.strip_prefix(&prefix)
                    .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
            })
            .cloned()
            .collect()
    }

    pub fn connect_attempts(&self) -> Vec<Instant> {
        self.state().connect_attempts.clone()
    }

    pub fn live_sessions(&self) -> usize {
        self.state().sessions.len()
    }

    /// Payloads written to `path`, oldest first.
    pub fn writes_to(&self, path: &str) -> Vec<Vec<u8>> {
        self.state()
            .writes
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, data)| data.clone())
            .collect()
    }

    /// Expires every live session, as the server does after a partition.
    pub fn expire_sessions(&self) {
        let ids: Vec<u64> = self.state().sessions.keys().copied().collect();
        for id in ids {
            self.end_session(id);
        }
    }

    fn end_session(&self, id: u64) {
        let mut state = self.state();
        if let Some(terminated) = state.sessions.remove(&id) {
            terminated.send_replace(true);
        }
        state.nodes.retain(|_, node| node.owner != Some(id));
    }

    fn check_session(&self, id: u64) -> Result<MutexGuard<'_, EnsembleState>, SessionError> {
        let state = self.state();
        if state.sessions.contains_key(&id) {
            Ok(state)
        } else {
            Err(SessionError::Terminated("session expired".to_string()))
        }
    }

    fn latency(&self) -> Duration {
        self.state().latency
    }
}

pub(crate) struct MemoryCoordinator {
    ensemble: Arc<MemoryEnsemble>,
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    type Handle = MemoryHandle;

    async fn connect(&self) -> Result<MemoryHandle, SessionError> {
        let mut state = self.ensemble.state();
        state.connect_attempts.push(Instant::now());
        if state.unavailable {
            return Err(SessionError::Backend("connection refused".to_string()));
        }
        if state.refuse_connects > 0 {
            state.refuse_connects -= 1;
            return Err(SessionError::Backend("connection refused".to_string()));
        }
        state.next_session += 1;
        let id = state.next_session;
        let (terminated_tx, terminated) = watch::channel(false);
        state.sessions.insert(id, terminated_tx);
        Ok(MemoryHandle {
            id,
            ensemble: self.ensemble.clone(),
            terminated,
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

pub(crate) struct MemoryHandle {
    id: u64,
    ensemble: Arc<MemoryEnsemble>,
    terminated: watch::Receiver<bool>,
}

impl MemoryHandle {
    async fn delay(&self) {
        let latency = self.ensemble.latency();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl SessionHandle for MemoryHandle {
    async fn exists(&self, path: &str) -> Result<bool, SessionError> {
        self.delay().await;
        let state = self.ensemble.check_session(self.id)?;
        Ok(state.nodes.contains_key(path))
    }

    async fn set_data(&self, path: &str, data: &[u8]) -> Result<(), SessionError> {
        self.delay().await;
        let mut state = self.ensemble.check_session(self.id)?;
        match state.nodes.get_mut(path) {
            Some(node) => node.data = data.to_vec(),
            None => return Err(SessionError::NoNode(path.to_string())),
        }
        state.writes.push((path.to_string(), data.to_vec()));
        Ok(())
    }

    async fn create(&self, path: &str, data: &[u8], kind: NodeKind) -> Result<(), SessionError> {
        self.delay().await;
        let mut state = self.ensemble.check_session(self.id)?;
        if state.nodes.contains_key(path) {
            return Err(SessionError::NodeExists(path.to_string()));
        }
        let parent = path.rsplit_once('/').map(|(parent, _)| parent).unwrap_or("");
        if !parent.is_empty() && !state.nodes.contains_key(parent) {
            return Err(SessionError::NoNode(parent.to_string()));
        }
        let owner = match kind {
            NodeKind::Persistent => None,
            NodeKind::Ephemeral => Some(self.id),
        };
        state.nodes.insert(
            path.to_string(),
            MemoryNode {
                data: data.to_vec(),
                owner,
            },
        );
        state.writes.push((path.to_string(), data.to_vec()));
        Ok(())
    }

    async fn terminated(&self) -> SessionError {
        let mut terminated = self.terminated.clone();
        let _ = terminated.wait_for(|ended| *ended).await;
        SessionError::Terminated("session expired".to_string())
    }

    async fn close(&self) {
        self.ensemble.end_session(self.id);
    }
}

impl Drop for MemoryHandle {
    fn drop(&mut self) {
        self.ensemble.end_session(self.id);
    }
}
