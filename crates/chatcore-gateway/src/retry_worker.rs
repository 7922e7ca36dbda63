//! Retry Worker: periodic background sweep that re-attempts undelivered
//! entries whose recipients are now online, with bounded attempts and
//! exponential-ish backoff, escalating to `dead` on exhaustion.
//!
//! Spawn shape grounded in `local-agent-chat::retention::spawn_retention_task`
//! (a `tokio::spawn` loop sleeping between sweeps); backoff math grounded in
//! `InMemoryDeliveryTracker::calculate_next_attempt` from the cauce-ai
//! delivery tracker example.

use std::sync::Arc;
use std::time::Duration;

use chatcore_core::protocol::ServerEvent;

use crate::hub::{Hub, SendResult};
use crate::store::Store;

/// Exponent cap so backoff does not grow unbounded; mirrors spec §4.6's
/// `base * 2^min(attempts, cap)`.
const BACKOFF_EXPONENT_CAP: u32 = 6;

/// Bounded batch size per sweep fetch.
const SWEEP_BATCH: i64 = 500;

pub struct RetryWorkerConfig {
    pub interval: Duration,
    pub base_backoff: Duration,
    pub max_attempts: u32,
}

pub fn spawn(store: Arc<Store>, hub: Arc<Hub>, cfg: RetryWorkerConfig) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(cfg.interval);
        loop {
            tick.tick().await;
            if let Err(e) = sweep_once(&store, &hub, &cfg) {
                tracing::error!(error = %e.to_string(), "retry worker sweep failed");
            }
        }
    })
}

/// One sweep: fetch due entries, group by `(tenant, user)`, attempt
/// delivery to online recipients, and advance attempt counts for the rest.
/// Entries that are delivered are left in place — they are removed by the
/// eventual ack, the conservative default spec §4.6 describes.
fn sweep_once(store: &Store, hub: &Hub, cfg: &RetryWorkerConfig) -> chatcore_core::Result<()> {
    let due = store.fetch_due_retries(SWEEP_BATCH, cfg.base_backoff, BACKOFF_EXPONENT_CAP)?;
    if due.is_empty() {
        return Ok(());
    }

    let mut bumped = Vec::new();
    let mut dead = Vec::new();

    for entry in &due {
        // Redeliver the real message. A client dedups by `message_id`; a
        // blank stand-in here would satisfy that dedup and suppress the
        // real content catch-up later streams.
        let delivered = if hub.is_online(&entry.tenant_id, &entry.user_id) {
            match store.get_message(&entry.tenant_id, &entry.room_id, entry.seq)? {
                Some(message) => matches!(
                    hub.try_send(
                        &entry.tenant_id,
                        &entry.user_id,
                        &ServerEvent::Message {
                            room_id: message.room_id,
                            message_id: message.message_id,
                            sender_id: message.sender_id,
                            seq: message.seq,
                            content: message.content,
                            meta: message.meta,
                            created_at: message.created_at,
                        },
                    ),
                    SendResult::Delivered
                ),
                None => false,
            }
        } else {
            false
        };

        // Delivered entries are left for the eventual ack (spec §4.6's
        // conservative default). Everything else accrues an attempt.
        if !delivered {
            if entry.attempts as u32 + 1 >= cfg.max_attempts {
                dead.push(entry.id);
            } else {
                bumped.push(entry.id);
            }
        }
    }

    store.increment_attempts(&bumped)?;
    store.mark_dead(&dead)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatcore_core::domain::{RoomSpec, RoomType};

    fn cfg() -> RetryWorkerConfig {
        RetryWorkerConfig {
            interval: Duration::from_secs(30),
            base_backoff: Duration::from_secs(0),
            max_attempts: 3,
        }
    }

    #[test]
    fn offline_recipient_accrues_attempts_until_dead() {
        let store = Store::open(":memory:").unwrap();
        let hub = Hub::new();
        let room = store
            .create_room(
                "t1",
                &RoomSpec {
                    room_type: RoomType::Group,
                    members: vec!["alice".into(), "bob".into()],
                    name: None,
                    unique_key: None,
                },
            )
            .unwrap();
        let msg = store.append_message("t1", &room.room_id, "alice", "hi", None).unwrap();
        store
            .enqueue_undelivered(&[("bob".into(), room.room_id.clone(), msg.message_id, msg.seq)])
            .unwrap();

        let cfg = cfg();
        for _ in 0..cfg.max_attempts {
            sweep_once(&store, &hub, &cfg).unwrap();
        }

        let due = store.fetch_due_retries(10, cfg.base_backoff, BACKOFF_EXPONENT_CAP).unwrap();
        assert!(due.is_empty(), "dead entries must not appear in due-retry fetches");
    }

    #[test]
    fn online_recipient_is_delivered_and_left_for_ack() {
        let store = Store::open(":memory:").unwrap();
        let hub = Hub::new();
        let room = store
            .create_room(
                "t1",
                &RoomSpec {
                    room_type: RoomType::Group,
                    members: vec!["alice".into(), "bob".into()],
                    name: None,
                    unique_key: None,
                },
            )
            .unwrap();
        let msg = store.append_message("t1", &room.room_id, "alice", "hi", None).unwrap();
        store
            .enqueue_undelivered(&[("bob".into(), room.room_id.clone(), msg.message_id, msg.seq)])
            .unwrap();

        let (_h, mut rx) = hub.register("t1", "bob", 8);
        sweep_once(&store, &hub, &cfg()).unwrap();

        assert!(rx.try_recv().is_ok());
        let pending = store.fetch_undelivered_for_user("t1", "bob", 10).unwrap();
        assert_eq!(pending.len(), 1, "row stays until the client acks");
    }

    #[test]
    fn redelivery_carries_the_real_message_content() {
        let store = Store::open(":memory:").unwrap();
        let hub = Hub::new();
        let room = store
            .create_room(
                "t1",
                &RoomSpec {
                    room_type: RoomType::Group,
                    members: vec!["alice".into(), "bob".into()],
                    name: None,
                    unique_key: None,
                },
            )
            .unwrap();
        let msg = store.append_message("t1", &room.room_id, "alice", "the real content", None).unwrap();
        store
            .enqueue_undelivered(&[("bob".into(), room.room_id.clone(), msg.message_id, msg.seq)])
            .unwrap();

        let (_h, mut rx) = hub.register("t1", "bob", 8);
        sweep_once(&store, &hub, &cfg()).unwrap();

        let axum::extract::ws::Message::Text(raw) = rx.try_recv().unwrap() else {
            panic!("expected a text frame");
        };
        let event: ServerEvent = serde_json::from_str(&raw).unwrap();
        match event {
            ServerEvent::Message { content, sender_id, message_id, .. } => {
                assert_eq!(content, "the real content");
                assert_eq!(sender_id, "alice");
                assert_eq!(message_id, msg.message_id);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
