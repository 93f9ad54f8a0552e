//! Ping/pong liveness: grace period, miss accounting, sweep eviction.
//! Uses tokio's paused clock; timers auto-advance while tasks are idle.

mod support;

use chat_server::conn::health::HealthRecord;
use std::time::Duration;
use support::*;

#[tokio::test(start_paused = true)]
async fn never_pinged_connection_is_always_healthy() {
    let record = HealthRecord::new();
    tokio::time::advance(Duration::from_secs(3600)).await;

    assert!(record.check_health(Duration::from_secs(1)));
    assert_eq!(record.snapshot().missed_pongs, 0);
}

#[tokio::test(start_paused = true)]
async fn missed_pongs_accumulate_and_reset_on_pong() {
    let record = HealthRecord::new();
    record.record_ping();
    tokio::time::advance(Duration::from_secs(3)).await;

    assert!(!record.check_health(Duration::from_secs(2)));
    assert_eq!(record.snapshot().missed_pongs, 1);
    assert!(!record.check_health(Duration::from_secs(2)));
    assert_eq!(record.snapshot().missed_pongs, 2);

    // A single late pong forgives everything.
    record.record_pong();
    let snap = record.snapshot();
    assert_eq!(snap.missed_pongs, 0);
    assert!(snap.is_healthy);
    assert_eq!(snap.pongs_received, 1);
    assert!(record.check_health(Duration::from_secs(2)));
}

#[tokio::test(start_paused = true)]
async fn repeated_pings_do_not_mask_a_silent_peer() {
    let record = HealthRecord::new();
    record.record_ping();
    // Keep pinging more often than the timeout; the peer stays silent.
    for _ in 0..5 {
        tokio::time::advance(Duration::from_secs(1)).await;
        record.record_ping();
    }
    assert!(!record.check_health(Duration::from_secs(2)));
}

#[tokio::test(start_paused = true)]
async fn stale_pong_marks_unhealthy() {
    let record = HealthRecord::new();
    record.record_ping();
    record.record_pong();
    tokio::time::advance(Duration::from_secs(3)).await;
    record.record_ping();

    assert!(!record.check_health(Duration::from_secs(2)));
    assert_eq!(record.snapshot().missed_pongs, 1);
}

#[tokio::test(start_paused = true)]
async fn unresponsive_connection_is_evicted_by_sweep() {
    let mut config = test_config();
    config.heartbeat_interval_secs = 1;
    config.pong_timeout_secs = 2;
    config.health_check_interval_secs = 1;
    config.enable_health_check = true;
    let core = spawn_core(config);

    // Never answers pings.
    let (id, client) = connect(&core).await;
    assert_eq!(core.registry.count(), 1);

    wait_until(
        || core.registry.lookup(&id).is_none(),
        "eviction of silent connection",
    )
    .await;
    assert_eq!(core.registry.count(), 0);
    drop(client);
}

#[tokio::test(start_paused = true)]
async fn responsive_connection_survives_sweeps() {
    let mut config = test_config();
    config.heartbeat_interval_secs = 1;
    config.pong_timeout_secs = 2;
    config.health_check_interval_secs = 1;
    config.enable_health_check = true;
    let core = spawn_core(config);

    let (id, client) = connect(&core).await;
    let _responder = auto_pong(client);

    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(core.registry.count(), 1);
    let snap = core.registry.health(&id).expect("health snapshot");
    assert!(snap.is_healthy);
    assert!(snap.pings_sent >= 5);
    assert!(snap.pongs_received >= 5);
    assert_eq!(snap.missed_pongs, 0);
}
