//! Connection Lifecycle: on connect, reconciles "missed messages" by
//! streaming every message with `seq > last_ack` for each of the user's
//! rooms before the connection goes live.

use std::sync::Arc;

use chatcore_core::protocol::ServerEvent;

use crate::hub::{ConnHandle, Hub};
use crate::store::Store;

/// Bounded page size for catch-up scans.
const CATCHUP_PAGE: i64 = 200;

pub struct ConnectionLifecycle {
    store: Arc<Store>,
    hub: Arc<Hub>,
}

impl ConnectionLifecycle {
    pub fn new(store: Arc<Store>, hub: Arc<Hub>) -> Self {
        Self { store, hub }
    }

    /// Register the connection with the Hub, then stream catch-up events
    /// for every room the user belongs to, ascending by `seq`, before
    /// returning the handle the caller uses for the live session.
    pub fn connect(
        &self,
        tenant_id: &str,
        user_id: &str,
        buffer: usize,
    ) -> chatcore_core::Result<(ConnHandle, tokio::sync::mpsc::Receiver<axum::extract::ws::Message>)> {
        let (handle, rx) = self.hub.register(tenant_id, user_id, buffer);

        let rooms = self.store.list_rooms_for_user(tenant_id, user_id)?;
        for room_id in rooms {
            self.catch_up_room(tenant_id, user_id, &room_id)?;
        }

        Ok((handle, rx))
    }

    fn catch_up_room(&self, tenant_id: &str, user_id: &str, room_id: &str) -> chatcore_core::Result<()> {
        let mut after_seq = self.store.get_last_ack(tenant_id, user_id, room_id)?;
        loop {
            let page = self.store.fetch_missed_since(tenant_id, room_id, after_seq, CATCHUP_PAGE)?;
            if page.is_empty() {
                break;
            }
            for msg in &page {
                let event = ServerEvent::Message {
                    room_id: msg.room_id.clone(),
                    message_id: msg.message_id,
                    sender_id: msg.sender_id.clone(),
                    seq: msg.seq,
                    content: msg.content.clone(),
                    meta: msg.meta.clone(),
                    created_at: msg.created_at.clone(),
                };
                self.hub.try_send(tenant_id, user_id, &event);
            }
            after_seq = page.last().map(|m| m.seq).unwrap_or(after_seq);
            if (page.len() as i64) < CATCHUP_PAGE {
                break;
            }
        }
        Ok(())
    }

    pub fn disconnect(&self, tenant_id: &str, user_id: &str, handle: ConnHandle) {
        self.hub.unregister(tenant_id, user_id, handle);
    }
}
