//! Error types shared by the coordination session and the heartbeat tick.

use std::time::Duration;

/// Errors raised by coordination-session operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    /// No live session is installed (never connected, reconnecting, or closed).
    #[error("coordination session is not connected")]
    NotConnected,
    /// `close()` was requested while the operation was in progress.
    #[error("coordination session was closed")]
    Closed,
    /// A single request did not complete within the request timeout.
    #[error("coordination request timed out after {0:?}")]
    Timeout(Duration),
    #[error("node already exists: {0}")]
    NodeExists(String),
    #[error("node does not exist: {0}")]
    NoNode(String),
    /// The server ended the session (expiry, auth failure, explicit close).
    #[error("coordination session terminated: {0}")]
    Terminated(String),
    /// Any other backend failure.
    #[error("coordination backend error: {0}")]
    Backend(String),
}

/// Errors that abort a single heartbeat tick.
///
/// These never escape the scheduler; they are logged and the next tick
/// acts as the retry.
#[derive(Debug, thiserror::Error)]
pub enum TickError {
    #[error("failed to serialize service node: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Session(#[from] SessionError),
}
