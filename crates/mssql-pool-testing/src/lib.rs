//! # mssql-pool-testing
//!
//! Test infrastructure for the pool policy: a scriptable fake driver
//! connection and a minimal in-memory pool primitive that wires the
//! lifecycle hooks the way a real primitive would.
//!
//! Nothing here talks to a server. [`FakeScript`] decides whether opens and
//! commands succeed, which makes outage and recovery scenarios a matter of
//! flipping a switch mid-test.

#![warn(missing_docs)]
#![deny(unsafe_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use mssql_pool_policy::{
    AcquireSource, ConnectionFactory, ConnectionLifecycle, DriverConnection, DriverError,
    PoolError, PooledConnection, ResilientLifecycle,
};

/// How a scripted operation fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailureMode {
    /// Operation succeeds.
    #[default]
    Succeed,
    /// Fail with a transport-level i/o error.
    Io,
    /// Fail with a server error (command rejected, transport fine).
    Server,
    /// Fail with a timeout.
    Timeout,
}

impl FailureMode {
    fn into_error(self) -> Option<DriverError> {
        match self {
            Self::Succeed => None,
            Self::Io => Some(DriverError::Io(std::io::Error::other(
                "connection reset by peer",
            ))),
            Self::Server => Some(DriverError::Server {
                number: 2627,
                message: "Violation of PRIMARY KEY constraint".into(),
            }),
            Self::Timeout => Some(DriverError::Timeout(Duration::from_secs(1))),
        }
    }
}

#[derive(Debug, Default)]
struct ScriptInner {
    open_mode: FailureMode,
    execute_mode: FailureMode,
}

/// Shared script controlling every connection built from one factory.
#[derive(Debug, Default)]
pub struct FakeScript {
    inner: Mutex<ScriptInner>,
    opens: AtomicU64,
    executes: AtomicU64,
    closes: AtomicU64,
}

impl FakeScript {
    /// Create a script where everything succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the outcome of `open` calls.
    pub fn fail_open(&self, mode: FailureMode) {
        self.inner.lock().open_mode = mode;
    }

    /// Script the outcome of `execute` calls (probes included).
    pub fn fail_execute(&self, mode: FailureMode) {
        self.inner.lock().execute_mode = mode;
    }

    /// Put the scripted database back into a healthy state.
    pub fn heal(&self) {
        let mut inner = self.inner.lock();
        inner.open_mode = FailureMode::Succeed;
        inner.execute_mode = FailureMode::Succeed;
    }

    /// Number of `open` calls observed.
    #[must_use]
    pub fn opens(&self) -> u64 {
        self.opens.load(Ordering::Relaxed)
    }

    /// Number of `execute` calls observed.
    #[must_use]
    pub fn executes(&self) -> u64 {
        self.executes.load(Ordering::Relaxed)
    }

    /// Number of `close` calls observed.
    #[must_use]
    pub fn closes(&self) -> u64 {
        self.closes.load(Ordering::Relaxed)
    }
}

/// A scriptable in-memory driver connection.
#[derive(Debug)]
pub struct FakeConnection {
    open: bool,
    script: Arc<FakeScript>,
}

impl FakeConnection {
    /// Create a closed connection driven by `script`.
    #[must_use]
    pub fn new(script: Arc<FakeScript>) -> Self {
        Self {
            open: false,
            script,
        }
    }

    /// Create a connection that is already open.
    #[must_use]
    pub fn opened(script: Arc<FakeScript>) -> Self {
        Self { open: true, script }
    }
}

#[async_trait]
impl DriverConnection for FakeConnection {
    fn is_open(&self) -> bool {
        self.open
    }

    async fn open(&mut self) -> Result<(), DriverError> {
        self.script.opens.fetch_add(1, Ordering::Relaxed);
        let mode = self.script.inner.lock().open_mode;
        match mode.into_error() {
            None => {
                self.open = true;
                Ok(())
            }
            Some(error) => Err(error),
        }
    }

    fn close(&mut self) {
        if self.open {
            self.script.closes.fetch_add(1, Ordering::Relaxed);
        }
        self.open = false;
    }

    async fn execute(&mut self, sql: &str, _timeout: Duration) -> Result<(), DriverError> {
        self.script.executes.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(sql = sql, "fake execute");
        if !self.open {
            return Err(DriverError::Closed);
        }
        let mode = self.script.inner.lock().execute_mode;
        match mode.into_error() {
            None => Ok(()),
            Some(error) => Err(error),
        }
    }
}

/// Factory producing [`FakeConnection`]s bound to one script.
#[derive(Debug)]
pub struct FakeFactory {
    script: Arc<FakeScript>,
    created: AtomicU64,
}

impl FakeFactory {
    /// Create a factory driven by `script`.
    #[must_use]
    pub fn new(script: Arc<FakeScript>) -> Self {
        Self {
            script,
            created: AtomicU64::new(0),
        }
    }

    /// Number of connections created so far.
    #[must_use]
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }
}

impl ConnectionFactory for FakeFactory {
    type Conn = FakeConnection;

    fn create(&self) -> FakeConnection {
        self.created.fetch_add(1, Ordering::Relaxed);
        FakeConnection::new(Arc::clone(&self.script))
    }
}

/// A minimal bounded pool primitive for exercising the policy end-to-end.
///
/// Not a real pool: no queueing, no blocking waits. Acquire pops an idle
/// connection or creates one below capacity, then runs `on_acquire`; an
/// exhausted pool fails immediately with the acquire-timeout signal.
pub struct TinyPool<F: ConnectionFactory> {
    lifecycle: Arc<ResilientLifecycle<F>>,
    idle: Mutex<Vec<PooledConnection<F::Conn>>>,
    capacity: u32,
    live: AtomicU32,
}

impl<F: ConnectionFactory> TinyPool<F> {
    /// Create a pool of at most `capacity` connections.
    #[must_use]
    pub fn new(lifecycle: Arc<ResilientLifecycle<F>>, capacity: u32) -> Self {
        Self {
            lifecycle,
            idle: Mutex::new(Vec::new()),
            capacity,
            live: AtomicU32::new(0),
        }
    }

    /// The lifecycle policy driving this pool.
    #[must_use]
    pub fn lifecycle(&self) -> &ResilientLifecycle<F> {
        &self.lifecycle
    }

    /// Number of idle connections currently held.
    #[must_use]
    pub fn idle_count(&self) -> usize {
        self.idle.lock().len()
    }
}

#[async_trait]
impl<F: ConnectionFactory> AcquireSource for TinyPool<F> {
    type Conn = F::Conn;

    async fn acquire(&self) -> Result<PooledConnection<F::Conn>, PoolError> {
        let popped = self.idle.lock().pop();
        let mut conn = match popped {
            Some(conn) => conn,
            None => {
                if self.live.fetch_add(1, Ordering::SeqCst) >= self.capacity {
                    self.live.fetch_sub(1, Ordering::SeqCst);
                    return Err(PoolError::AcquireTimeout(
                        self.lifecycle.config().acquire_timeout,
                    ));
                }
                self.lifecycle.create()
            }
        };
        match self.lifecycle.on_acquire(&mut conn).await {
            Ok(()) => Ok(conn),
            Err(error) => {
                self.lifecycle.destroy(conn);
                self.live.fetch_sub(1, Ordering::SeqCst);
                Err(error)
            }
        }
    }

    fn release(&self, mut conn: PooledConnection<F::Conn>) {
        self.lifecycle.on_release(&mut conn);
        self.idle.lock().push(conn);
    }
}
