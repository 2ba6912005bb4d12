//! Driver connection boundary.
//!
//! The policy never talks to the wire itself. It drives a driver-supplied
//! connection handle through this trait: open, close, state query, and
//! command execution with a per-call timeout.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a driver connection handle.
#[derive(Debug, Error)]
pub enum DriverError {
    /// Transport-level failure: broken socket, reset, refused.
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    /// A command did not complete within its timeout.
    #[error("command timed out after {0:?}")]
    Timeout(Duration),

    /// The server processed the command and rejected it.
    #[error("server error {number}: {message}")]
    Server {
        /// Server-assigned error number.
        number: i32,
        /// Server-supplied message text.
        message: String,
    },

    /// The handle was used after being closed.
    #[error("connection is closed")]
    Closed,
}

impl DriverError {
    /// Whether this failure means the transport itself is gone, as opposed
    /// to the server rejecting one command.
    ///
    /// A [`DriverError::Timeout`] is deliberately excluded: a slow probe may
    /// be load rather than outage, so timeouts must fail a fresh probe
    /// before they qualify as pool-wide.
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Closed)
    }
}

/// A driver connection handle as seen by the pool policy.
///
/// Implementations are exclusively owned while checked out, so every method
/// takes `&mut self`. `close` is infallible and idempotent; the policy
/// relies on being able to close a handle it has decided is dead without a
/// second error path.
#[async_trait]
pub trait DriverConnection: Send + 'static {
    /// Whether the underlying transport is currently open.
    fn is_open(&self) -> bool;

    /// Establish the underlying transport and authenticate.
    async fn open(&mut self) -> Result<(), DriverError>;

    /// Tear down the transport. Closing a closed handle is a no-op.
    fn close(&mut self);

    /// Execute a command, failing with [`DriverError::Timeout`] if it does
    /// not complete within `timeout`.
    async fn execute(&mut self, sql: &str, timeout: Duration) -> Result<(), DriverError>;
}
