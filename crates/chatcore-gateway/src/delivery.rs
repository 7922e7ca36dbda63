//! Delivery Coordinator: given a freshly persisted `Message`, ensures every
//! member of the room either receives it live or has an undelivered entry
//! recording the pending delivery.

use std::sync::Arc;

use chatcore_core::domain::Message;
use chatcore_core::protocol::ServerEvent;

use crate::hub::{Hub, SendResult};
use crate::store::Store;

pub struct DeliveryCoordinator {
    store: Arc<Store>,
    hub: Arc<Hub>,
}

impl DeliveryCoordinator {
    pub fn new(store: Arc<Store>, hub: Arc<Hub>) -> Self {
        Self { store, hub }
    }

    /// Fan out `message` to every room member, including its sender (spec
    /// §8 scenario 1: the sender's own live WS connection gets the echo
    /// too, separate from the HTTP response to her own `Publish` call).
    /// Live delivery is best-effort; durability comes from the message
    /// table plus the last-ack cursor, not from this step.
    pub async fn deliver(&self, message: &Message) -> chatcore_core::Result<()> {
        let members = self.store.list_members(&message.tenant_id, &message.room_id)?;

        let event = ServerEvent::Message {
            room_id: message.room_id.clone(),
            message_id: message.message_id,
            sender_id: message.sender_id.clone(),
            seq: message.seq,
            content: message.content.clone(),
            meta: message.meta.clone(),
            created_at: message.created_at.clone(),
        };

        let mut to_enqueue = Vec::new();
        for member in members {
            match self.hub.try_send(&message.tenant_id, &member.user_id, &event) {
                SendResult::Delivered => {}
                SendResult::NotConnected | SendResult::SendError => {
                    to_enqueue.push((member.user_id, message.room_id.clone(), message.message_id, message.seq));
                }
            }
        }

        self.store.enqueue_undelivered(&to_enqueue)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatcore_core::domain::RoomSpec;
    use chatcore_core::domain::RoomType;

    #[tokio::test]
    async fn online_recipient_is_delivered_without_undelivered_row() {
        let store = Arc::new(Store::open(":memory:").unwrap());
        let hub = Arc::new(Hub::new());
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
        let (_h, mut rx) = hub.register("t1", "bob", 8);

        let msg = store.append_message("t1", &room.room_id, "alice", "hi", None).unwrap();
        let coordinator = DeliveryCoordinator::new(store.clone(), hub.clone());
        coordinator.deliver(&msg).await.unwrap();

        assert!(rx.recv().await.is_some());
        let pending = store.fetch_undelivered_for_user("t1", "bob", 10).unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn offline_recipient_gets_undelivered_row() {
        let store = Arc::new(Store::open(":memory:").unwrap());
        let hub = Arc::new(Hub::new());
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
        let coordinator = DeliveryCoordinator::new(store.clone(), hub.clone());
        coordinator.deliver(&msg).await.unwrap();

        let pending = store.fetch_undelivered_for_user("t1", "bob", 10).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].seq, 1);
    }

    #[tokio::test]
    async fn sender_receives_live_echo_when_connected() {
        let store = Arc::new(Store::open(":memory:").unwrap());
        let hub = Arc::new(Hub::new());
        let room = store
            .create_room(
                "t1",
                &RoomSpec {
                    room_type: RoomType::Group,
                    members: vec!["alice".into()],
                    name: None,
                    unique_key: None,
                },
            )
            .unwrap();
        let (_h, mut rx) = hub.register("t1", "alice", 8);

        let msg = store.append_message("t1", &room.room_id, "alice", "hi", None).unwrap();
        let coordinator = DeliveryCoordinator::new(store.clone(), hub.clone());
        coordinator.deliver(&msg).await.unwrap();

        assert!(rx.recv().await.is_some());
        let pending = store.fetch_undelivered_for_user("t1", "alice", 10).unwrap();
        assert!(pending.is_empty());
    }
}
