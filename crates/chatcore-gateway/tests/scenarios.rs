//! End-to-end scenarios against a real, temp-file-backed `Store`, wiring the
//! Room Registry, Realtime Hub, Delivery Coordinator, Ack Processor and
//! Connection Lifecycle together the way `main.rs` does.

use std::sync::Arc;

use chatcore_core::domain::{RoomSpec, RoomType};
use chatcore_gateway::ack::AckProcessor;
use chatcore_gateway::delivery::DeliveryCoordinator;
use chatcore_gateway::hub::Hub;
use chatcore_gateway::lifecycle::ConnectionLifecycle;
use chatcore_gateway::room_registry::RoomRegistry;
use chatcore_gateway::store::Store;

fn temp_store() -> (tempfile::TempDir, Arc<Store>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("chatcore.db");
    let store = Arc::new(Store::open(path.to_str().expect("utf8 path")).expect("open store"));
    (dir, store)
}

#[tokio::test]
async fn scenario_two_party_dm_both_online() {
    let (_dir, store) = temp_store();
    let hub = Arc::new(Hub::new());
    let registry = RoomRegistry::new();
    let delivery = DeliveryCoordinator::new(store.clone(), hub.clone());
    let ack = AckProcessor::new(store.clone());

    let room = store
        .create_room("t1", &RoomSpec { room_type: RoomType::Dm, members: vec!["alice".into(), "bob".into()], name: None, unique_key: None })
        .unwrap();

    let (_h_alice, mut rx_alice) = hub.register("t1", "alice", 16);
    let (_h_bob, mut rx_bob) = hub.register("t1", "bob", 16);

    let msg = registry.publish(&store, "t1", "alice", &room.room_id, "hi", None).await.unwrap();
    assert_eq!(msg.seq, 1);
    delivery.deliver(&msg).await.unwrap();

    assert!(rx_bob.recv().await.is_some(), "bob receives the live message");
    assert!(rx_alice.recv().await.is_some(), "alice receives her own echo");

    let new_ack = ack.ack("t1", "bob", &room.room_id, 1).unwrap();
    assert_eq!(new_ack, 1);

    let lifecycle = ConnectionLifecycle::new(store.clone(), hub.clone());
    let (_h, mut rx) = lifecycle.connect("t1", "bob", 16).unwrap();
    assert!(rx.try_recv().is_err(), "catch-up after full ack is empty");
}

#[tokio::test]
async fn scenario_offline_recipient_reconnects() {
    let (_dir, store) = temp_store();
    let hub = Arc::new(Hub::new());
    let registry = RoomRegistry::new();
    let delivery = DeliveryCoordinator::new(store.clone(), hub.clone());
    let ack = AckProcessor::new(store.clone());
    let lifecycle = ConnectionLifecycle::new(store.clone(), hub.clone());

    let room = store
        .create_room("t1", &RoomSpec { room_type: RoomType::Dm, members: vec!["alice".into(), "bob".into()], name: None, unique_key: None })
        .unwrap();

    for i in 0..3 {
        let msg = registry.publish(&store, "t1", "alice", &room.room_id, &format!("m{i}"), None).await.unwrap();
        delivery.deliver(&msg).await.unwrap();
    }

    assert_eq!(store.fetch_missed_since("t1", &room.room_id, 0, 10).unwrap().len(), 3);
    assert_eq!(store.fetch_undelivered_for_user("t1", "bob", 10).unwrap().len(), 3);

    let (_h, mut rx) = lifecycle.connect("t1", "bob", 16).unwrap();
    let mut seqs = Vec::new();
    while let Ok(axum::extract::ws::Message::Text(t)) = rx.try_recv() {
        if let chatcore_core::protocol::ServerEvent::Message { seq, .. } = serde_json::from_str(&t).unwrap() {
            seqs.push(seq);
        }
    }
    assert_eq!(seqs, vec![1, 2, 3]);

    ack.ack("t1", "bob", &room.room_id, 3).unwrap();
    assert!(store.fetch_undelivered_for_user("t1", "bob", 10).unwrap().is_empty());
    assert_eq!(store.get_last_ack("t1", "bob", &room.room_id).unwrap(), 3);
}

#[tokio::test]
async fn scenario_concurrent_publishers_yield_dense_unique_seqs() {
    let (_dir, store) = temp_store();
    let registry = Arc::new(RoomRegistry::new());

    let members: Vec<String> = (0..50).map(|i| format!("user{i}")).collect();
    let room = store
        .create_room("t1", &RoomSpec { room_type: RoomType::Group, members: members.clone(), name: Some("g".into()), unique_key: None })
        .unwrap();

    let mut handles = Vec::new();
    for user in members {
        for _ in 0..20 {
            let store = store.clone();
            let registry = registry.clone();
            let room_id = room.room_id.clone();
            let user = user.clone();
            handles.push(tokio::spawn(async move {
                registry.publish(&store, "t1", &user, &room_id, "hi", None).await.unwrap().seq
            }));
        }
    }

    let mut seqs = Vec::new();
    for h in handles {
        seqs.push(h.await.unwrap());
    }
    seqs.sort_unstable();
    let expected: Vec<i64> = (1..=1000).collect();
    assert_eq!(seqs, expected);

    let updated = store.get_room("t1", &room.room_id).unwrap();
    assert_eq!(updated.last_seq, 1000);
    assert_eq!(store.fetch_missed_since("t1", &room.room_id, 0, 2000).unwrap().len(), 1000);
}

#[tokio::test]
async fn scenario_retry_exhaustion_marks_dead_without_blocking_new_messages() {
    let (_dir, store) = temp_store();
    let hub = Hub::new();
    let registry = RoomRegistry::new();

    let room = store
        .create_room("t1", &RoomSpec { room_type: RoomType::Dm, members: vec!["alice".into(), "bob".into()], name: None, unique_key: None })
        .unwrap();

    let msg = registry.publish(&store, "t1", "alice", &room.room_id, "hi", None).await.unwrap();
    store.enqueue_undelivered(&[("bob".into(), room.room_id.clone(), msg.message_id, msg.seq)]).unwrap();

    let max_attempts = 5u32;
    let base = std::time::Duration::from_secs(0);
    for _ in 0..max_attempts {
        let due = store.fetch_due_retries(10, base, 6).unwrap();
        assert!(!hub.is_online("t1", "bob"));
        for entry in &due {
            if entry.attempts as u32 + 1 >= max_attempts {
                store.mark_dead(&[entry.id]).unwrap();
            } else {
                store.increment_attempts(&[entry.id]).unwrap();
            }
        }
    }

    assert!(store.fetch_due_retries(10, base, 6).unwrap().is_empty(), "dead entries drop out of due-retry fetches");

    let msg2 = registry.publish(&store, "t1", "alice", &room.room_id, "new message", None).await.unwrap();
    assert_eq!(msg2.seq, 2, "publishing continues independently of dead-lettered entries");
}

#[tokio::test]
async fn scenario_slow_consumer_buffer_saturation_falls_back_to_undelivered() {
    let (_dir, store) = temp_store();
    let hub = Arc::new(Hub::new());
    let registry = RoomRegistry::new();
    let delivery = DeliveryCoordinator::new(store.clone(), hub.clone());

    let room = store
        .create_room("t1", &RoomSpec { room_type: RoomType::Dm, members: vec!["alice".into(), "bob".into()], name: None, unique_key: None })
        .unwrap();

    let (_handle, _rx) = hub.register("t1", "bob", 1);

    let m1 = registry.publish(&store, "t1", "alice", &room.room_id, "m1", None).await.unwrap();
    delivery.deliver(&m1).await.unwrap();
    let m2 = registry.publish(&store, "t1", "alice", &room.room_id, "m2", None).await.unwrap();
    delivery.deliver(&m2).await.unwrap();

    let pending = store.fetch_undelivered_for_user("t1", "bob", 10).unwrap();
    assert!(!pending.is_empty(), "a saturated buffer falls back to the undelivered queue");

    let lifecycle = ConnectionLifecycle::new(store.clone(), hub.clone());
    let ack = AckProcessor::new(store.clone());
    let last_ack = store.get_last_ack("t1", "bob", &room.room_id).unwrap();
    let (_h, mut rx) = lifecycle.connect("t1", "bob", 16).unwrap();
    let mut count = 0;
    while rx.try_recv().is_ok() {
        count += 1;
    }
    assert!(count >= 1, "reconnect catches up from last_ack");
    ack.ack("t1", "bob", &room.room_id, 2).unwrap();
    assert_eq!(store.get_last_ack("t1", "bob", &room.room_id).unwrap(), 2);
    assert!(last_ack <= 2);
}

#[tokio::test]
async fn scenario_graceful_shutdown_preserves_seq_and_ack_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chatcore.db");
    let dsn = path.to_str().unwrap().to_string();

    {
        let store = Arc::new(Store::open(&dsn).unwrap());
        let hub = Arc::new(Hub::new());
        let registry = RoomRegistry::new();
        let ack = AckProcessor::new(store.clone());

        let room = store
            .create_room("t1", &RoomSpec { room_type: RoomType::Dm, members: vec!["alice".into(), "bob".into()], name: None, unique_key: None })
            .unwrap();
        registry.publish(&store, "t1", "alice", &room.room_id, "m1", None).await.unwrap();
        registry.publish(&store, "t1", "alice", &room.room_id, "m2", None).await.unwrap();
        ack.ack("t1", "bob", &room.room_id, 1).unwrap();

        hub.shutdown(std::time::Duration::from_millis(50)).await;
        store.checkpoint();
    }

    let reopened = Store::open(&dsn).unwrap();
    let rooms = reopened.list_rooms_for_user("t1", "alice").unwrap();
    assert_eq!(rooms.len(), 1);
    let room = reopened.get_room("t1", &rooms[0]).unwrap();
    assert_eq!(room.last_seq, 2);
    assert_eq!(reopened.get_last_ack("t1", "bob", &room.room_id).unwrap(), 1);
}
