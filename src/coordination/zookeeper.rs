//! ZooKeeper backend built on `zookeeper-client`.

use super::{Coordinator, NodeKind, SessionHandle};
use crate::error::SessionError;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;
use zookeeper_client as zk;

/// Upper bound for a single connection attempt.
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects to a ZooKeeper ensemble given a `host:port[,host:port][/chroot]` string.
#[derive(Debug, Clone)]
pub struct ZookeeperCoordinator {
    connect_string: String,
    connect_timeout: Duration,
}

impl ZookeeperCoordinator {
    pub fn new(connect_string: impl Into<String>) -> Self {
        Self {
            connect_string: connect_string.into(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

#[async_trait]
impl Coordinator for ZookeeperCoordinator {
    type Handle = ZookeeperHandle;

    async fn connect(&self) -> Result<ZookeeperHandle, SessionError> {
        let client = tokio::time::timeout(
            self.connect_timeout,
            zk::Client::connect(&self.connect_string),
        )
        .await
        .map_err(|_| SessionError::Timeout(self.connect_timeout))?
        .map_err(|e| map_error(e, &self.connect_string))?;

        Ok(ZookeeperHandle {
            client: Mutex::new(Some(client)),
        })
    }

    fn describe(&self) -> String {
        self.connect_string.clone()
    }
}

/// A live ZooKeeper session. The session ends when the last client clone
/// is dropped.
pub struct ZookeeperHandle {
    client: Mutex<Option<zk::Client>>,
}

impl ZookeeperHandle {
    fn client(&self) -> Result<zk::Client, SessionError> {
        self.client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
            .ok_or(SessionError::Closed)
    }

    /// The client, if it can serve a request right now. The client library
    /// queues requests while disconnected; ticks must not wait on that.
    fn connected_client(&self) -> Result<zk::Client, SessionError> {
        let client = self.client()?;
        ensure_usable(client.state())?;
        Ok(client)
    }
}

#[async_trait]
impl SessionHandle for ZookeeperHandle {
    async fn exists(&self, path: &str) -> Result<bool, SessionError> {
        let client = self.connected_client()?;
        client
            .check_stat(path)
            .await
            .map(|stat| stat.is_some())
            .map_err(|e| map_error(e, path))
    }

    async fn set_data(&self, path: &str, data: &[u8]) -> Result<(), SessionError> {
        let client = self.connected_client()?;
        client
            .set_data(path, data, None)
            .await
            .map(|_| ())
            .map_err(|e| map_error(e, path))
    }

    async fn create(&self, path: &str, data: &[u8], kind: NodeKind) -> Result<(), SessionError> {
        let client = self.connected_client()?;
        let mode = match kind {
            NodeKind::Persistent => zk::CreateMode::Persistent,
            NodeKind::Ephemeral => zk::CreateMode::Ephemeral,
        };
        let options = mode.with_acls(zk::Acls::anyone_all());
        client
            .create(path, data, &options)
            .await
            .map(|_| ())
            .map_err(|e| map_error(e, path))
    }

    async fn terminated(&self) -> SessionError {
        let client = match self.client() {
            Ok(client) => client,
            Err(e) => return e,
        };
        let mut watcher = client.state_watcher();
        let mut state = watcher.state();
        while !is_terminal(state) {
            state = watcher.changed().await;
        }
        SessionError::Terminated(format!("{:?}", state))
    }

    async fn close(&self) {
        let client = self
            .client
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        drop(client);
    }
}

fn ensure_usable(state: zk::SessionState) -> Result<(), SessionError> {
    match state {
        zk::SessionState::SyncConnected | zk::SessionState::ConnectedReadOnly => Ok(()),
        state if is_terminal(state) => Err(SessionError::Terminated(format!("{:?}", state))),
        _ => Err(SessionError::NotConnected),
    }
}

fn is_terminal(state: zk::SessionState) -> bool {
    matches!(
        state,
        zk::SessionState::Expired | zk::SessionState::Closed | zk::SessionState::AuthFailed
    )
}

fn map_error(err: zk::Error, path: &str) -> SessionError {
    match err {
        zk::Error::NodeExists => SessionError::NodeExists(path.to_string()),
        zk::Error::NoNode => SessionError::NoNode(path.to_string()),
        zk::Error::ConnectionLoss => SessionError::NotConnected,
        zk::Error::SessionExpired | zk::Error::ClientClosed => {
            SessionError::Terminated(err.to_string())
        }
        other => SessionError::Backend(other.to_string()),
    }
}

#[cfg(test)]
#[path = "tests/zookeeper_tests.rs"]
mod tests;
