//! Pool-wide availability state machine.
//!
//! The pool is either `Available` or `Unavailable`. Callers that hit a
//! driver-level failure report it here; a qualifying failure flips the pool
//! to unavailable exactly once, no matter how many callers report it
//! concurrently. Recovery is driven by a background probe owned by the
//! lifecycle, which calls [`AvailabilityMonitor::mark_available`] when a
//! fresh connection opens and probes cleanly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{broadcast, watch};

use crate::connection::{DriverConnection, DriverError};
use crate::probe::probe;

/// Pool-wide usability state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolAvailability {
    /// The pool is usable; acquisitions are validated normally.
    Available,
    /// The backing database is unreachable; connections are handed through
    /// unvalidated so callers and the recovery probe can discover recovery.
    Unavailable,
}

/// Transition event published to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AvailabilityEvent {
    /// The pool just transitioned to [`PoolAvailability::Unavailable`].
    BecameUnavailable,
    /// The pool just transitioned back to [`PoolAvailability::Available`].
    BecameAvailable,
}

/// Outcome of reporting a driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    /// This report flipped the pool to unavailable.
    Transitioned,
    /// The pool was already unavailable; the report was a no-op.
    AlreadyUnavailable,
    /// The failure did not qualify as a pool-wide outage.
    NotAnOutage,
}

const EVENT_CHANNEL_CAPACITY: usize = 16;

/// The availability state machine for one pool.
///
/// State lives in a `watch` channel: `send_if_modified` linearizes the
/// compare-and-transition, and the receiver side is what parks the recovery
/// task while the pool is available.
#[derive(Debug)]
pub struct AvailabilityMonitor {
    state: watch::Sender<PoolAvailability>,
    events: broadcast::Sender<AvailabilityEvent>,
    probe_timeout: Duration,
    outages_declared: AtomicU64,
    recoveries: AtomicU64,
}

impl AvailabilityMonitor {
    /// Create a monitor in the `Available` state.
    #[must_use]
    pub fn new(probe_timeout: Duration) -> Self {
        let (state, _) = watch::channel(PoolAvailability::Available);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            state,
            events,
            probe_timeout,
            outages_declared: AtomicU64::new(0),
            recoveries: AtomicU64::new(0),
        }
    }

    /// Current availability.
    #[must_use]
    pub fn state(&self) -> PoolAvailability {
        *self.state.borrow()
    }

    /// Whether the pool is currently available.
    #[must_use]
    pub fn is_available(&self) -> bool {
        self.state() == PoolAvailability::Available
    }

    /// Subscribe to transition events.
    ///
    /// Exactly one event is published per transition; no-op reports publish
    /// nothing.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AvailabilityEvent> {
        self.events.subscribe()
    }

    /// Watch the availability state. Used by the recovery task.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<PoolAvailability> {
        self.state.subscribe()
    }

    /// Report a driver failure observed on `conn`.
    ///
    /// The failure qualifies as a pool-wide outage when it is transport
    /// level ([`DriverError::is_io`]) or a fresh probe of the affected
    /// connection fails; a closed handle fails the probe, so confirmed-dead
    /// returns are covered by the same predicate. A qualifying failure
    /// leaves the connection closed, never open in the pool's hands.
    /// Reporting against an already-unavailable pool is a no-op.
    pub async fn report_failure<C>(&self, conn: &mut C, error: &DriverError) -> ReportOutcome
    where
        C: DriverConnection + ?Sized,
    {
        if !self.is_available() {
            return ReportOutcome::AlreadyUnavailable;
        }

        // Probe outside any lock; only the transition itself is guarded.
        let outage = if error.is_io() {
            // Transport is gone; close the handle so it cannot re-enter
            // circulation looking open. The probe branch closes on failure
            // already.
            if conn.is_open() {
                conn.close();
            }
            true
        } else {
            !probe(conn, self.probe_timeout).await
        };
        if !outage {
            return ReportOutcome::NotAnOutage;
        }

        if self.transition_to(PoolAvailability::Unavailable) {
            self.outages_declared.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %error, "pool marked unavailable");
            ReportOutcome::Transitioned
        } else {
            ReportOutcome::AlreadyUnavailable
        }
    }

    /// Transition back to available after a successful recovery probe.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn mark_available(&self) -> bool {
        let recovered = self.transition_to(PoolAvailability::Available);
        if recovered {
            self.recoveries.fetch_add(1, Ordering::Relaxed);
            tracing::info!("pool marked available");
        }
        recovered
    }

    /// Number of unavailable transitions since creation.
    #[must_use]
    pub fn outages_declared(&self) -> u64 {
        self.outages_declared.load(Ordering::Relaxed)
    }

    /// Number of available transitions since creation.
    #[must_use]
    pub fn recoveries(&self) -> u64 {
        self.recoveries.load(Ordering::Relaxed)
    }

    /// Compare-and-transition. `send_if_modified` serializes concurrent
    /// callers, so at most one observes the flip and publishes the event.
    fn transition_to(&self, target: PoolAvailability) -> bool {
        let flipped = self.state.send_if_modified(|state| {
            if *state == target {
                false
            } else {
                *state = target;
                true
            }
        });
        if flipped {
            let event = match target {
                PoolAvailability::Available => AvailabilityEvent::BecameAvailable,
                PoolAvailability::Unavailable => AvailabilityEvent::BecameUnavailable,
            };
            // Send fails only when nobody is subscribed.
            let _ = self.events.send(event);
        }
        flipped
    }
}
