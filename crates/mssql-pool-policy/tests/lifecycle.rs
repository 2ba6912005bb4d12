//! Lifecycle policy integration tests.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use std::sync::Arc;
use std::time::Duration;

use mssql_pool_policy::{
    AcquireSource, AvailabilityEvent, BlockingLifecycle, ConnectionLifecycle, DriverConnection,
    PolicyConfig, PoolError, PooledConnection, ResilientLifecycle, probe, probe_blocking,
};
use mssql_pool_testing::{FailureMode, FakeConnection, FakeFactory, FakeScript};

async fn lifecycle_with(
    script: &Arc<FakeScript>,
    config: PolicyConfig,
) -> ResilientLifecycle<FakeFactory> {
    ResilientLifecycle::new(config, FakeFactory::new(Arc::clone(script)))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_acquire_opens_closed_connection() {
    let script = Arc::new(FakeScript::new());
    let lifecycle = lifecycle_with(&script, PolicyConfig::new()).await;

    let mut conn = lifecycle.create();
    assert!(!conn.is_open());

    lifecycle.on_acquire(&mut conn).await.unwrap();
    assert!(conn.is_open());
    assert_eq!(script.opens(), 1);

    // A healthy open connection is handed straight through.
    lifecycle.on_acquire(&mut conn).await.unwrap();
    assert_eq!(script.opens(), 1);

    lifecycle.shutdown();
}

#[tokio::test]
async fn test_open_failure_surfaces_pool_unavailable() {
    let script = Arc::new(FakeScript::new());
    script.fail_open(FailureMode::Io);
    let lifecycle = lifecycle_with(&script, PolicyConfig::new().pool_name("orders")).await;
    let mut events = lifecycle.subscribe();

    let mut conn = lifecycle.create();
    let error = lifecycle.on_acquire(&mut conn).await.unwrap_err();
    match error {
        PoolError::Unavailable { pool, .. } => assert_eq!(pool, "orders"),
        other => panic!("expected Unavailable, got {other}"),
    }
    assert!(!lifecycle.monitor().is_available());
    assert_eq!(events.try_recv().ok(), Some(AvailabilityEvent::BecameUnavailable));

    lifecycle.shutdown();
}

#[tokio::test]
async fn test_unavailable_pool_hands_connection_through() {
    let script = Arc::new(FakeScript::new());
    script.fail_open(FailureMode::Io);
    let lifecycle = lifecycle_with(&script, PolicyConfig::new()).await;

    let mut conn = lifecycle.create();
    assert!(lifecycle.on_acquire(&mut conn).await.is_err());
    assert!(!lifecycle.monitor().is_available());

    // Opening would still fail, but an unavailable pool must not raise;
    // callers attempt use and self-report, which feeds the recovery signal.
    let mut conn = lifecycle.create();
    lifecycle.on_acquire(&mut conn).await.unwrap();
    assert!(!conn.is_open());

    lifecycle.shutdown();
}

#[tokio::test]
async fn test_idle_connection_is_reprobed_and_reopened() {
    let script = Arc::new(FakeScript::new());
    let lifecycle = lifecycle_with(
        &script,
        // Zero threshold: every returned connection counts as idle.
        PolicyConfig::new().idle_revalidation(Duration::ZERO),
    )
    .await;

    let mut conn = PooledConnection::new(1, FakeConnection::opened(Arc::clone(&script)));
    lifecycle.on_release(&mut conn);

    // Probe fails, closing the connection; acquisition reopens it.
    script.fail_execute(FailureMode::Io);
    lifecycle.on_acquire(&mut conn).await.unwrap();
    assert!(conn.is_open());
    assert_eq!(script.opens(), 1);

    lifecycle.shutdown();
}

#[tokio::test]
async fn test_check_available_opens_then_probes() {
    let script = Arc::new(FakeScript::new());
    let lifecycle = lifecycle_with(&script, PolicyConfig::new()).await;

    // Closed handle: opened, then probed clean.
    let mut conn = lifecycle.create();
    assert!(lifecycle.on_check_available(&mut conn).await);
    assert!(conn.is_open());
    assert_eq!(script.opens(), 1);

    // Open failure fails the check without a probe attempt.
    script.fail_open(FailureMode::Io);
    let mut conn = lifecycle.create();
    let executes_before = script.executes();
    assert!(!lifecycle.on_check_available(&mut conn).await);
    assert!(!conn.is_open());
    assert_eq!(script.executes(), executes_before);

    // Probe failure fails the check and leaves the handle closed.
    script.heal();
    script.fail_execute(FailureMode::Io);
    let mut conn = lifecycle.create();
    assert!(!lifecycle.on_check_available(&mut conn).await);
    assert!(!conn.is_open());

    lifecycle.shutdown();
}

#[tokio::test]
async fn test_probe_idempotence() {
    let script = Arc::new(FakeScript::new());
    let mut conn = FakeConnection::opened(Arc::clone(&script));

    // Probing a healthy connection repeatedly never closes it.
    for _ in 0..3 {
        assert!(probe::probe(&mut conn, Duration::from_secs(1)).await);
        assert!(conn.is_open());
    }

    // Probing a dead connection always leaves it closed.
    script.fail_execute(FailureMode::Io);
    assert!(!probe::probe(&mut conn, Duration::from_secs(1)).await);
    assert!(!conn.is_open());
    assert!(!probe::probe(&mut conn, Duration::from_secs(1)).await);
    assert!(!conn.is_open());
}

#[tokio::test]
async fn test_destroy_closes_connection() {
    let script = Arc::new(FakeScript::new());
    let lifecycle = lifecycle_with(&script, PolicyConfig::new()).await;

    let mut conn = lifecycle.create();
    lifecycle.on_acquire(&mut conn).await.unwrap();
    assert!(conn.is_open());

    lifecycle.destroy(conn);
    assert_eq!(script.closes(), 1);

    lifecycle.shutdown();
}

#[tokio::test]
async fn test_prewarm_fills_pool_to_capacity() {
    let script = Arc::new(FakeScript::new());
    let lifecycle = Arc::new(lifecycle_with(&script, PolicyConfig::new()).await);
    let pool = mssql_pool_testing::TinyPool::new(Arc::clone(&lifecycle), 5);

    let warmed = lifecycle.prewarm(&pool, 5).await;
    assert_eq!(warmed, 5);
    assert_eq!(pool.idle_count(), 5);
    assert_eq!(lifecycle.metrics().connections_prewarmed, 5);

    lifecycle.shutdown();
}

#[tokio::test]
async fn test_prewarm_accepts_partial_warm_up() {
    let script = Arc::new(FakeScript::new());
    let lifecycle = Arc::new(lifecycle_with(&script, PolicyConfig::new()).await);
    // Capacity below the requested warm count: the fourth acquire fails.
    let pool = mssql_pool_testing::TinyPool::new(Arc::clone(&lifecycle), 3);

    let warmed = lifecycle.prewarm(&pool, 5).await;
    assert_eq!(warmed, 3);
    assert_eq!(pool.idle_count(), 3);

    lifecycle.shutdown();
}

#[tokio::test]
async fn test_metrics_reflect_operations() {
    let script = Arc::new(FakeScript::new());
    let lifecycle = lifecycle_with(&script, PolicyConfig::new()).await;

    let mut conn = lifecycle.create();
    lifecycle.on_acquire(&mut conn).await.unwrap();

    let metrics = lifecycle.metrics();
    assert_eq!(metrics.validations_performed, 1);
    assert_eq!(metrics.opens_performed, 1);
    assert_eq!(metrics.opens_failed, 0);
    assert_eq!(metrics.outages_declared, 0);

    lifecycle.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pool_acquire_release_round_trip() {
    let script = Arc::new(FakeScript::new());
    let lifecycle = Arc::new(lifecycle_with(&script, PolicyConfig::new()).await);
    let pool = mssql_pool_testing::TinyPool::new(Arc::clone(&lifecycle), 2);

    let conn = pool.acquire().await.unwrap();
    assert!(conn.is_open());
    pool.release(conn);
    assert_eq!(pool.idle_count(), 1);

    // The released connection is reused, not recreated.
    let conn = pool.acquire().await.unwrap();
    assert_eq!(pool.idle_count(), 0);
    pool.release(conn);

    lifecycle.shutdown();
}

/// Blocking and async acquisition run the same algorithm; identical failure
/// injections must produce identical errors and state transitions.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_blocking_and_async_acquire_transition_identically() {
    // Async path.
    let async_script = Arc::new(FakeScript::new());
    async_script.fail_open(FailureMode::Io);
    let async_lifecycle = lifecycle_with(&async_script, PolicyConfig::new().pool_name("p")).await;
    let mut async_events = async_lifecycle.subscribe();

    let mut conn = async_lifecycle.create();
    let async_error = async_lifecycle.on_acquire(&mut conn).await.unwrap_err();

    // Blocking path, same injection, driven from a plain thread.
    let blocking_script = Arc::new(FakeScript::new());
    blocking_script.fail_open(FailureMode::Io);
    let blocking_lifecycle =
        Arc::new(lifecycle_with(&blocking_script, PolicyConfig::new().pool_name("p")).await);
    let mut blocking_events = blocking_lifecycle.subscribe();

    // The probe pair gets the same treatment: one dead connection per path,
    // identical injection.
    let probe_script = Arc::new(FakeScript::new());
    probe_script.fail_execute(FailureMode::Io);
    let mut async_dead = FakeConnection::opened(Arc::clone(&probe_script));
    let async_probe = probe::probe(&mut async_dead, Duration::from_secs(1)).await;

    let handle = tokio::runtime::Handle::current();
    let facade = BlockingLifecycle::new(Arc::clone(&blocking_lifecycle), handle.clone());
    let (blocking_error, blocking_probe, blocking_probe_open) = std::thread::spawn(move || {
        let mut conn = facade.create();
        let error = facade.on_acquire(&mut conn).unwrap_err();
        facade.destroy(conn);

        let mut dead = FakeConnection::opened(probe_script);
        let alive = probe_blocking(&handle, &mut dead, Duration::from_secs(1));
        (error, alive, dead.is_open())
    })
    .join()
    .unwrap();

    assert!(matches!(async_error, PoolError::Unavailable { .. }));
    assert!(matches!(blocking_error, PoolError::Unavailable { .. }));
    assert!(!async_probe && !async_dead.is_open());
    assert!(!blocking_probe && !blocking_probe_open);
    assert!(!async_lifecycle.monitor().is_available());
    assert!(!blocking_lifecycle.monitor().is_available());
    assert_eq!(
        async_events.try_recv().ok(),
        Some(AvailabilityEvent::BecameUnavailable)
    );
    assert_eq!(
        blocking_events.try_recv().ok(),
        Some(AvailabilityEvent::BecameUnavailable)
    );

    async_lifecycle.shutdown();
    blocking_lifecycle.shutdown();
}
