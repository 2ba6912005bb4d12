//! Blocking facade over the async hook set.
//!
//! The hook logic exists once, as async code; these adapters drive the same
//! code to completion on a runtime handle so that the blocking and
//! suspending execution modes cannot drift apart. Callers must invoke them
//! from outside the runtime's worker threads (a dedicated thread, or
//! `tokio::task::spawn_blocking`).

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;

use crate::connection::DriverConnection;
use crate::error::PoolError;
use crate::lifecycle::{ConnectionLifecycle, PooledConnection};
use crate::probe;

/// Blocking variant of [`probe::probe`], with identical semantics.
pub fn probe_blocking<C>(handle: &Handle, conn: &mut C, timeout: Duration) -> bool
where
    C: DriverConnection + ?Sized,
{
    handle.block_on(probe::probe(conn, timeout))
}

/// Blocking mirror of a [`ConnectionLifecycle`].
///
/// Wraps any lifecycle and exposes its async hooks as blocking calls on a
/// captured runtime handle.
pub struct BlockingLifecycle<L> {
    inner: Arc<L>,
    handle: Handle,
}

impl<L: ConnectionLifecycle> BlockingLifecycle<L> {
    /// Wrap `inner`, driving its async hooks on `handle`.
    #[must_use]
    pub fn new(inner: Arc<L>, handle: Handle) -> Self {
        Self { inner, handle }
    }

    /// The wrapped lifecycle.
    #[must_use]
    pub fn inner(&self) -> &L {
        &self.inner
    }

    /// Blocking variant of [`ConnectionLifecycle::on_acquire`].
    pub fn on_acquire(&self, conn: &mut PooledConnection<L::Conn>) -> Result<(), PoolError> {
        self.handle.block_on(self.inner.on_acquire(conn))
    }

    /// Blocking variant of [`ConnectionLifecycle::on_check_available`].
    pub fn on_check_available(&self, conn: &mut PooledConnection<L::Conn>) -> bool {
        self.handle.block_on(self.inner.on_check_available(conn))
    }

    /// See [`ConnectionLifecycle::create`].
    #[must_use]
    pub fn create(&self) -> PooledConnection<L::Conn> {
        self.inner.create()
    }

    /// See [`ConnectionLifecycle::destroy`].
    pub fn destroy(&self, conn: PooledConnection<L::Conn>) {
        self.inner.destroy(conn);
    }

    /// See [`ConnectionLifecycle::on_release`].
    pub fn on_release(&self, conn: &mut PooledConnection<L::Conn>) {
        self.inner.on_release(conn);
    }

    /// See [`ConnectionLifecycle::on_acquire_timeout`].
    pub fn on_acquire_timeout(&self) {
        self.inner.on_acquire_timeout();
    }
}
