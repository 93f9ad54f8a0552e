//! Fan-out semantics: exclusion, room filtering, slow-consumer eviction,
//! load shedding.

mod support;

use chat_server::broadcast::BroadcastEngine;
use chat_server::ws::transport::Frame;
use support::*;

#[tokio::test]
async fn room_broadcast_excludes_sender_and_reaches_roommates() {
    let core = spawn_core(test_config());

    let (alice_id, mut alice) = connect(&core).await;
    let (_bob_id, mut bob) = connect(&core).await;
    let (_carol_id, mut carol) = connect(&core).await;
    authenticate(&mut alice, "alice").await;
    authenticate(&mut bob, "bob").await;
    authenticate(&mut carol, "carol").await;
    alice.drain().await;
    bob.drain().await;
    carol.drain().await;

    core.broadcast
        .broadcast("hi".to_string(), Some(alice_id), Some("general".to_string()));

    assert_eq!(bob.recv_frame().await, Some(Frame::Text("hi".to_string())));
    assert_eq!(carol.recv_frame().await, Some(Frame::Text("hi".to_string())));
    assert_eq!(alice.recv_frame().await, None);
}

#[tokio::test]
async fn unfiltered_broadcast_reaches_every_connection() {
    let core = spawn_core(test_config());

    let (_alice_id, mut alice) = connect(&core).await;
    authenticate(&mut alice, "alice").await;
    alice.drain().await;

    // Not yet authenticated, so roomless.
    let (_raw_id, mut raw) = connect(&core).await;
    raw.recv_type("auth_request").await.expect("greeting");

    core.broadcast.broadcast("all".to_string(), None, None);

    assert_eq!(alice.recv_frame().await, Some(Frame::Text("all".to_string())));
    assert_eq!(raw.recv_frame().await, Some(Frame::Text("all".to_string())));
}

#[tokio::test]
async fn room_filter_skips_other_rooms_and_unauthenticated_connections() {
    let core = spawn_core(test_config());

    let (_alice_id, mut alice) = connect(&core).await;
    let (_bob_id, mut bob) = connect(&core).await;
    authenticate(&mut alice, "alice").await;
    authenticate(&mut bob, "bob").await;
    bob.drain().await;
    bob.send_text("/join dev");
    bob.recv_type("room_joined").await.expect("bob joins dev");
    alice.drain().await;
    bob.drain().await;

    let (_raw_id, mut raw) = connect(&core).await;
    raw.recv_type("auth_request").await.expect("greeting");

    core.broadcast
        .broadcast("scoped".to_string(), None, Some("general".to_string()));

    assert_eq!(
        alice.recv_frame().await,
        Some(Frame::Text("scoped".to_string()))
    );
    assert_eq!(bob.recv_frame().await, None);
    assert_eq!(raw.recv_frame().await, None);
}

#[tokio::test]
async fn slow_consumer_is_evicted_without_delaying_others() {
    let mut config = test_config();
    config.send_buffer = 1;
    // Long enough that eviction can only come from the full queue, not from
    // a write deadline.
    config.write_timeout_secs = 30;
    let core = spawn_core(config);

    let (_alice_id, mut alice) = connect(&core).await;
    authenticate(&mut alice, "alice").await;
    alice.drain().await;

    // Bob never reads and his transport pipe holds a single frame: the
    // greeting fills the pipe, the write loop stalls on the next send, and
    // the one-slot outbound queue backs up behind it.
    let (bob_id, bob) = connect_with_capacity(&core, 1).await;
    wait_until(|| core.registry.count() == 2, "both connections registered").await;

    core.broadcast.broadcast("m1".to_string(), None, None);
    core.broadcast.broadcast("m2".to_string(), None, None);
    core.broadcast.broadcast("m3".to_string(), None, None);

    wait_until(
        || core.registry.lookup(&bob_id).is_none(),
        "slow consumer eviction",
    )
    .await;
    assert_eq!(core.registry.count(), 1);

    // The healthy recipient got every message of the same broadcast run.
    assert_eq!(alice.recv_frame().await, Some(Frame::Text("m1".to_string())));
    assert_eq!(alice.recv_frame().await, Some(Frame::Text("m2".to_string())));
    assert_eq!(alice.recv_frame().await, Some(Frame::Text("m3".to_string())));

    drop(bob);
}

#[tokio::test]
async fn full_request_channel_sheds_load() {
    // No consumer spawned: the channel fills and extra requests are dropped.
    let (engine, mut rx) = BroadcastEngine::new(1);
    engine.broadcast("first".to_string(), None, None);
    engine.broadcast("second".to_string(), None, None);

    let queued = rx.recv().await.expect("first request queued");
    assert_eq!(queued.payload, "first");
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn empty_room_filter_means_unfiltered() {
    let (engine, mut rx) = BroadcastEngine::new(4);
    engine.broadcast("x".to_string(), None, Some(String::new()));

    let queued = rx.recv().await.expect("request queued");
    assert!(queued.room.is_none());
}
