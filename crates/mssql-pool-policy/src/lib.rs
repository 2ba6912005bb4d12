//! # mssql-pool-policy
//!
//! Resilient connection-pool policy for SQL Server drivers.
//!
//! This crate does not implement a pool. It implements the *policy* a
//! generic pool primitive plugs in: how to size the pool from the connection
//! string, how to validate a connection before handing it to a caller, and
//! how to detect a database outage and recover from it without failing every
//! in-flight caller.
//!
//! ## Pieces
//!
//! - [`SizingRegistry`]: resolves the `Maximum Pool Size` directive and
//!   keeps pools built from the same string from colliding on identical
//!   literal capacities.
//! - [`probe`](probe::probe): `SELECT 1` liveness check with a short
//!   per-call timeout.
//! - [`ResilientLifecycle`]: the [`ConnectionLifecycle`] hook set: create,
//!   destroy, acquisition validation, release bookkeeping, pre-warming.
//! - [`AvailabilityMonitor`]: the pool-wide `Available`/`Unavailable` state
//!   machine with idempotent failure reports, transition events and a
//!   background recovery probe.
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mssql_pool_policy::{PolicyConfig, ResilientLifecycle, SizingRegistry};
//!
//! let registry = Arc::new(SizingRegistry::new());
//! let sizing = registry.resolve("Host=db;Maximum pool size=20");
//! let factory = MyDriverFactory::new(&sizing.connection_string);
//!
//! let lifecycle = ResilientLifecycle::new(
//!     PolicyConfig::new().pool_name("orders"),
//!     factory,
//! )
//! .await?;
//!
//! // Hand the lifecycle to your pool primitive, then pre-warm:
//! let warmed = lifecycle.prewarm(&pool, sizing.capacity).await;
//!
//! // When a query fails with a driver error, feed the signal back:
//! lifecycle.report_use_error(&mut conn, &driver_error).await;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod availability;
pub mod blocking;
pub mod config;
pub mod connection;
pub mod error;
pub mod lifecycle;
pub mod probe;
pub mod sizing;

// Availability state machine
pub use availability::{AvailabilityEvent, AvailabilityMonitor, PoolAvailability, ReportOutcome};

// Blocking facade
pub use blocking::{BlockingLifecycle, probe_blocking};

// Configuration
pub use config::PolicyConfig;

// Driver boundary
pub use connection::{DriverConnection, DriverError};

// Error types
pub use error::PoolError;

// Lifecycle policy
pub use lifecycle::{
    AcquireSource, ConnectionFactory, ConnectionLifecycle, PolicyMetrics, PooledConnection,
    ResilientLifecycle,
};

// Sizing
pub use sizing::{DEFAULT_POOL_SIZE, SizingDirective, SizingRegistry};
