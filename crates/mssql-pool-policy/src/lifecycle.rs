//! Connection lifecycle policy.
//!
//! [`ConnectionLifecycle`] is the hook contract a generic pool primitive
//! consumes; [`ResilientLifecycle`] is the concrete policy: it validates
//! connections on acquisition, feeds driver failures into the availability
//! machine, pre-warms the pool at configuration time and owns the background
//! recovery task.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::availability::{AvailabilityEvent, AvailabilityMonitor, PoolAvailability, ReportOutcome};
use crate::config::PolicyConfig;
use crate::connection::{DriverConnection, DriverError};
use crate::error::PoolError;
use crate::probe::{probe, probe_strict};

/// A pooled wrapper around one driver connection.
///
/// Exclusively owned while checked out; ownership returns to the pool
/// primitive on release.
pub struct PooledConnection<C> {
    conn: C,
    id: u64,
    last_returned: Instant,
}

impl<C: DriverConnection> PooledConnection<C> {
    /// Wrap a raw driver connection. The id is assigned by the lifecycle
    /// that created it and only has to be unique within that lifecycle.
    #[must_use]
    pub fn new(id: u64, conn: C) -> Self {
        Self {
            conn,
            id,
            last_returned: Instant::now(),
        }
    }

    /// Identifier assigned by the lifecycle, for logging.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether the underlying transport is open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.conn.is_open()
    }

    /// Time since this connection was last returned to the pool.
    #[must_use]
    pub fn idle_for(&self) -> Duration {
        self.last_returned.elapsed()
    }

    /// Stamp the connection as just returned.
    pub fn mark_returned(&mut self) {
        self.last_returned = Instant::now();
    }

    /// Borrow the underlying driver connection.
    #[must_use]
    pub fn conn(&self) -> &C {
        &self.conn
    }

    /// Mutably borrow the underlying driver connection.
    pub fn conn_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    /// Unwrap the driver connection, detaching it from pool bookkeeping.
    #[must_use]
    pub fn into_inner(self) -> C {
        self.conn
    }
}

/// Factory for raw driver connections bound to a resolved connection string.
///
/// `create` performs no I/O; the handle opens lazily on first acquisition.
pub trait ConnectionFactory: Send + Sync + 'static {
    /// Connection type produced by this factory.
    type Conn: DriverConnection;

    /// Instantiate a new, unopened connection.
    fn create(&self) -> Self::Conn;
}

/// Narrow view of the pool primitive used at configuration time.
///
/// Pre-warming acquires and returns connections through this seam without
/// the policy knowing anything about slots or queues.
#[async_trait]
pub trait AcquireSource: Send + Sync {
    /// Connection type managed by the primitive.
    type Conn: DriverConnection;

    /// Acquire a connection, honoring the primitive's timeout rules.
    async fn acquire(&self) -> Result<PooledConnection<Self::Conn>, PoolError>;

    /// Return a previously acquired connection.
    fn release(&self, conn: PooledConnection<Self::Conn>);
}

/// The policy contract supplied to a generic pool primitive.
///
/// The async methods suspend only the logical caller; a blocking mirror of
/// the hook set lives in [`crate::blocking`].
#[async_trait]
pub trait ConnectionLifecycle: Send + Sync {
    /// Connection type this lifecycle manages.
    type Conn: DriverConnection;

    /// Instantiate a new, unopened pooled connection. No I/O.
    fn create(&self) -> PooledConnection<Self::Conn>;

    /// Close and dispose a connection being evicted. Never fails.
    fn destroy(&self, conn: PooledConnection<Self::Conn>);

    /// Validate a connection as it is handed to a caller.
    async fn on_acquire(&self, conn: &mut PooledConnection<Self::Conn>) -> Result<(), PoolError>;

    /// Bookkeeping as a connection returns to the pool.
    fn on_release(&self, conn: &mut PooledConnection<Self::Conn>);

    /// Invoked by the primitive when an acquire times out.
    fn on_acquire_timeout(&self) {}

    /// Open the connection if closed, then probe it. Used by recovery.
    async fn on_check_available(&self, conn: &mut PooledConnection<Self::Conn>) -> bool;

    /// Invoked by the primitive when the pool becomes available.
    fn on_available(&self) {}

    /// Invoked by the primitive when the pool becomes unavailable.
    fn on_unavailable(&self) {}
}

#[derive(Debug, Default)]
struct MetricsInner {
    validations_performed: u64,
    validation_failures: u64,
    opens_performed: u64,
    opens_failed: u64,
    connections_prewarmed: u64,
}

/// Point-in-time snapshot of policy counters.
#[derive(Debug, Clone)]
pub struct PolicyMetrics {
    /// Acquisition validations performed while the pool was available.
    pub validations_performed: u64,
    /// Validations that ended in a driver failure.
    pub validation_failures: u64,
    /// Connection opens attempted by the policy.
    pub opens_performed: u64,
    /// Opens that failed.
    pub opens_failed: u64,
    /// Connections successfully pre-warmed at configuration time.
    pub connections_prewarmed: u64,
    /// Unavailable transitions declared.
    pub outages_declared: u64,
    /// Available transitions after recovery.
    pub recoveries: u64,
    /// Time since the lifecycle was created.
    pub uptime: Duration,
}

/// The resilient connection lifecycle policy.
///
/// Construction spawns the recovery task; [`ResilientLifecycle::shutdown`]
/// (or dropping the value) cancels it.
pub struct ResilientLifecycle<F: ConnectionFactory> {
    config: PolicyConfig,
    factory: Arc<F>,
    monitor: Arc<AvailabilityMonitor>,
    next_connection_id: AtomicU64,
    metrics: Mutex<MetricsInner>,
    created_at: Instant,
    shutdown: CancellationToken,
    recovery: Mutex<Option<JoinHandle<()>>>,
}

impl<F: ConnectionFactory> ResilientLifecycle<F> {
    /// Create the policy and start its recovery task.
    ///
    /// Must be called within a Tokio runtime.
    pub async fn new(config: PolicyConfig, factory: F) -> Result<Self, PoolError> {
        config.validate()?;

        let factory = Arc::new(factory);
        let monitor = Arc::new(AvailabilityMonitor::new(config.probe_timeout));
        let shutdown = CancellationToken::new();
        let recovery = spawn_recovery(
            Arc::clone(&monitor),
            Arc::clone(&factory),
            config.recovery_interval,
            config.probe_timeout,
            shutdown.clone(),
            config.pool_name.clone(),
        );

        tracing::info!(pool = %config.pool_name, "pool lifecycle policy created");

        Ok(Self {
            config,
            factory,
            monitor,
            next_connection_id: AtomicU64::new(1),
            metrics: Mutex::new(MetricsInner::default()),
            created_at: Instant::now(),
            shutdown,
            recovery: Mutex::new(Some(recovery)),
        })
    }

    /// The availability state machine for this pool.
    #[must_use]
    pub fn monitor(&self) -> &AvailabilityMonitor {
        &self.monitor
    }

    /// Subscribe to availability transition events.
    #[must_use]
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<AvailabilityEvent> {
        self.monitor.subscribe()
    }

    /// The policy configuration.
    #[must_use]
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Report a driver failure a caller observed while using a checked-out
    /// connection.
    ///
    /// This is the return-path coupling: liveness is re-checked (transport
    /// errors qualify directly, otherwise a fresh probe decides) and a
    /// confirmed outage flips the pool to unavailable. Non-driver failures
    /// must not be reported here; callers keep those to themselves.
    pub async fn report_use_error(
        &self,
        conn: &mut PooledConnection<F::Conn>,
        error: &DriverError,
    ) -> ReportOutcome {
        let outcome = self.monitor.report_failure(conn.conn_mut(), error).await;
        if outcome == ReportOutcome::Transitioned {
            tracing::warn!(
                pool = %self.config.pool_name,
                connection_id = conn.id(),
                error = %error,
                "use failure confirmed a pool-wide outage"
            );
        }
        outcome
    }

    /// Pre-warm the pool: acquire, open and probe `capacity` connections,
    /// then return them all.
    ///
    /// Stops at the first failure; a partial warm-up is a degraded start,
    /// not an error. Returns the number of connections warmed.
    pub async fn prewarm<S>(&self, source: &S, capacity: u32) -> u32
    where
        S: AcquireSource<Conn = F::Conn>,
    {
        let mut warmed = Vec::new();
        for _ in 0..capacity {
            let mut conn = match source.acquire().await {
                Ok(conn) => conn,
                Err(error) => {
                    tracing::warn!(
                        pool = %self.config.pool_name,
                        warmed = warmed.len(),
                        error = %error,
                        "pre-warm acquisition failed, accepting partial warm-up"
                    );
                    break;
                }
            };
            if !conn.is_open() {
                if let Err(error) = self.open_counted(&mut conn).await {
                    tracing::warn!(
                        pool = %self.config.pool_name,
                        warmed = warmed.len(),
                        error = %error,
                        "pre-warm open failed, accepting partial warm-up"
                    );
                    self.destroy(conn);
                    break;
                }
            }
            if let Err(error) = probe_strict(conn.conn_mut(), self.config.probe_timeout).await {
                tracing::warn!(
                    pool = %self.config.pool_name,
                    warmed = warmed.len(),
                    error = %error,
                    "pre-warm probe failed, accepting partial warm-up"
                );
                self.destroy(conn);
                break;
            }
            warmed.push(conn);
        }

        let count = warmed.len() as u32;
        self.metrics.lock().connections_prewarmed += u64::from(count);
        for conn in warmed {
            source.release(conn);
        }
        tracing::info!(
            pool = %self.config.pool_name,
            warmed = count,
            requested = capacity,
            "pool pre-warm finished"
        );
        count
    }

    /// Snapshot the policy counters.
    #[must_use]
    pub fn metrics(&self) -> PolicyMetrics {
        let inner = self.metrics.lock();
        PolicyMetrics {
            validations_performed: inner.validations_performed,
            validation_failures: inner.validation_failures,
            opens_performed: inner.opens_performed,
            opens_failed: inner.opens_failed,
            connections_prewarmed: inner.connections_prewarmed,
            outages_declared: self.monitor.outages_declared(),
            recoveries: self.monitor.recoveries(),
            uptime: self.created_at.elapsed(),
        }
    }

    /// Stop the recovery task. Safe to call more than once.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        // Detach the handle; the task exits at its next cancellation check.
        let _ = self.recovery.lock().take();
        tracing::info!(pool = %self.config.pool_name, "pool lifecycle policy shut down");
    }

    async fn open_counted(&self, conn: &mut PooledConnection<F::Conn>) -> Result<(), DriverError> {
        self.metrics.lock().opens_performed += 1;
        let result = conn.conn_mut().open().await;
        if result.is_err() {
            self.metrics.lock().opens_failed += 1;
        }
        result
    }
}

#[async_trait]
impl<F: ConnectionFactory> ConnectionLifecycle for ResilientLifecycle<F> {
    type Conn = F::Conn;

    fn create(&self) -> PooledConnection<Self::Conn> {
        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(pool = %self.config.pool_name, connection_id = id, "creating connection");
        PooledConnection::new(id, self.factory.create())
    }

    fn destroy(&self, mut conn: PooledConnection<Self::Conn>) {
        tracing::trace!(
            pool = %self.config.pool_name,
            connection_id = conn.id(),
            "destroying connection"
        );
        conn.conn_mut().close();
    }

    async fn on_acquire(&self, conn: &mut PooledConnection<Self::Conn>) -> Result<(), PoolError> {
        if self.monitor.state() == PoolAvailability::Unavailable {
            // Hand the connection through untouched. Callers attempt use and
            // self-report failure; that is what feeds the recovery signal,
            // and refusing up front would starve it.
            tracing::trace!(
                pool = %self.config.pool_name,
                connection_id = conn.id(),
                "pool unavailable, skipping acquisition validation"
            );
            return Ok(());
        }

        self.metrics.lock().validations_performed += 1;

        let needs_open = !conn.is_open()
            || (conn.idle_for() > self.config.idle_revalidation
                && !probe(conn.conn_mut(), self.config.probe_timeout).await);
        if !needs_open {
            return Ok(());
        }

        if let Err(error) = self.open_counted(conn).await {
            self.metrics.lock().validation_failures += 1;
            return match self.monitor.report_failure(conn.conn_mut(), &error).await {
                ReportOutcome::Transitioned => Err(PoolError::Unavailable {
                    pool: self.config.pool_name.clone(),
                    source: error,
                }),
                // Already unavailable or not an outage: the caller sees the
                // original driver failure.
                _ => Err(PoolError::Driver(error)),
            };
        }
        Ok(())
    }

    fn on_release(&self, conn: &mut PooledConnection<Self::Conn>) {
        conn.mark_returned();
        tracing::trace!(
            pool = %self.config.pool_name,
            connection_id = conn.id(),
            "connection returned to pool"
        );
    }

    async fn on_check_available(&self, conn: &mut PooledConnection<Self::Conn>) -> bool {
        revive_and_probe(conn.conn_mut(), self.config.probe_timeout).await
    }

    fn on_available(&self) {
        tracing::info!(pool = %self.config.pool_name, "pool available");
    }

    fn on_unavailable(&self) {
        tracing::warn!(pool = %self.config.pool_name, "pool unavailable");
    }
}

impl<F: ConnectionFactory> Drop for ResilientLifecycle<F> {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Open the connection if closed, then probe it.
///
/// The single availability-check step shared by
/// [`ConnectionLifecycle::on_check_available`] and the recovery task, so the
/// two paths cannot drift apart.
async fn revive_and_probe<C>(conn: &mut C, probe_timeout: Duration) -> bool
where
    C: DriverConnection + ?Sized,
{
    if !conn.is_open() && conn.open().await.is_err() {
        return false;
    }
    probe(conn, probe_timeout).await
}

/// One long-lived recovery task per pool.
///
/// Parked on the watch channel while the pool is available; while
/// unavailable it ticks on the recovery interval, opens and probes a fresh
/// connection, and flips the pool back on success. A single task can never
/// run concurrently with itself, and cancellation stops it promptly.
fn spawn_recovery<F: ConnectionFactory>(
    monitor: Arc<AvailabilityMonitor>,
    factory: Arc<F>,
    interval: Duration,
    probe_timeout: Duration,
    shutdown: CancellationToken,
    pool_name: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut state = monitor.watch();
        loop {
            if *state.borrow_and_update() == PoolAvailability::Available {
                tokio::select! {
                    _ = shutdown.cancelled() => return,
                    changed = state.changed() => {
                        if changed.is_err() {
                            return;
                        }
                        continue;
                    }
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(interval) => {}
            }
            if monitor.is_available() {
                continue;
            }

            let mut conn = factory.create();
            if revive_and_probe(&mut conn, probe_timeout).await {
                if monitor.mark_available() {
                    tracing::info!(pool = %pool_name, "recovery probe succeeded");
                }
            } else {
                tracing::debug!(pool = %pool_name, "recovery probe failed, retrying");
            }
            conn.close();
        }
    })
}
