//! Coordination-service plumbing.
//!
//! [`CoordinationSession`] owns the connection lifecycle. The wire client
//! sits behind the [`Coordinator`] / [`SessionHandle`] seam so the session
//! logic can be exercised without a ZooKeeper ensemble.

pub mod backoff;
pub mod session;
pub mod zookeeper;

#[cfg(test)]
pub(crate) mod memory;

pub use backoff::{Backoff, BackoffPolicy};
pub use session::CoordinationSession;
pub use zookeeper::ZookeeperCoordinator;

use crate::error::SessionError;
use async_trait::async_trait;

/// Lifetime of a created node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Survives the session; used for path containers.
    Persistent,
    /// Removed by the service when the owning session ends.
    Ephemeral,
}

/// Establishes sessions against a coordination service.
#[async_trait]
pub trait Coordinator: Send + Sync + 'static {
    type Handle: SessionHandle;

    /// Makes a single connection attempt.
    async fn connect(&self) -> Result<Self::Handle, SessionError>;

    /// Human-readable target, for logs.
    fn describe(&self) -> String;
}

/// One established session.
///
/// Dropping the handle or calling [`SessionHandle::close`] ends the session.
#[async_trait]
pub trait SessionHandle: Send + Sync + 'static {
    async fn exists(&self, path: &str) -> Result<bool, SessionError>;

    /// Overwrites the payload of an existing node. `NoNode` if it is missing.
    async fn set_data(&self, path: &str, data: &[u8]) -> Result<(), SessionError>;

    /// Creates a node. `NodeExists` if it is already there, `NoNode` if the
    /// parent is missing.
    async fn create(&self, path: &str, data: &[u8], kind: NodeKind) -> Result<(), SessionError>;

    /// Resolves once the session can no longer be used (expired, closed by
    /// the server, authentication failed). Transient disconnects inside a
    /// valid session do not resolve it.
    async fn terminated(&self) -> SessionError;

    async fn close(&self);
}
