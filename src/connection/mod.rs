//! Connection handles owned by hosts.
//!
//! A [`Connection`] is the session an [`Executor`](crate::executor::Executor)
//! establishes to a single host. Once established it is stored on the
//! [`Host`](crate::inventory::Host) and reused by later runs in the same
//! session, until [`Runner::end`](crate::executor::Runner::end) closes it.
//!
//! The transport itself (SSH, local exec, ...) lives behind the executor; this
//! layer only needs to know how to identify and tear down a session.

/// Local session used by the local reference executor.
pub mod local;

use async_trait::async_trait;
use thiserror::Error;

pub use local::LocalSession;

/// Errors that can occur while using or closing a connection.
#[derive(Error, Debug)]
pub enum ConnectionError {
    /// The session was already closed.
    #[error("Connection closed")]
    Closed,

    /// I/O error during connection operations.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for connection operations.
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// An open session to one host.
#[async_trait]
pub trait Connection: Send + Sync + std::fmt::Debug {
    /// Get the connection identifier (usually the host name)
    fn identifier(&self) -> &str;

    /// Check if the connection is still alive
    async fn is_alive(&self) -> bool;

    /// Close the connection
    async fn close(&self) -> ConnectionResult<()>;
}
