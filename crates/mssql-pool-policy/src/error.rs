//! Policy-level error types.

use std::time::Duration;

use thiserror::Error;

use crate::connection::DriverError;

/// Errors produced by the pool policy.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Configuration failed validation.
    #[error("invalid pool configuration: {0}")]
    Config(String),

    /// The pool transitioned to unavailable while handling this request.
    ///
    /// Raised exactly when the caller's own failure report caused the
    /// transition, so the caller learns the pool just went down instead of
    /// seeing a bare connect error.
    #[error("pool '{pool}' is unavailable: {source}")]
    Unavailable {
        /// Name of the affected pool.
        pool: String,
        /// Underlying driver failure that triggered the transition.
        #[source]
        source: DriverError,
    },

    /// No connection became available within the acquire timeout.
    #[error("timed out acquiring a connection after {0:?}")]
    AcquireTimeout(Duration),

    /// The asynchronous acquire queue is at capacity.
    #[error("acquire queue is full (capacity {0})")]
    QueueFull(usize),

    /// A driver failure passed through unchanged.
    #[error(transparent)]
    Driver(#[from] DriverError),
}
