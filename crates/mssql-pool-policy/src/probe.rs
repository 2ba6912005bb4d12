//! Connection liveness probe.
//!
//! A probe is a minimal `SELECT 1` round-trip with a short per-call timeout.
//! It distinguishes "this connection is dead" from "a query failed for
//! business reasons", which the availability machine needs to avoid
//! declaring an outage on every constraint violation.

use std::time::Duration;

use crate::connection::{DriverConnection, DriverError};

/// Statement sent by the liveness probe.
pub const PROBE_SQL: &str = "SELECT 1";

/// Probe a connection, swallowing the failure.
///
/// Returns `true` and leaves the connection untouched on success. On any
/// failure the connection is closed (if not already) and `false` is
/// returned. Probing a healthy connection repeatedly never closes it;
/// probing a dead one leaves it closed.
pub async fn probe<C>(conn: &mut C, timeout: Duration) -> bool
where
    C: DriverConnection + ?Sized,
{
    probe_strict(conn, timeout).await.is_ok()
}

/// Probe a connection, re-raising the underlying failure.
///
/// Identical to [`probe`] except that the driver error is returned to the
/// caller instead of being reduced to a boolean. The connection is still
/// closed on failure.
pub async fn probe_strict<C>(conn: &mut C, timeout: Duration) -> Result<(), DriverError>
where
    C: DriverConnection + ?Sized,
{
    match conn.execute(PROBE_SQL, timeout).await {
        Ok(()) => Ok(()),
        Err(error) => {
            tracing::debug!(error = %error, "liveness probe failed");
            if conn.is_open() {
                conn.close();
            }
            Err(error)
        }
    }
}
