//! Per-room mutual exclusion around `Store::append_message`, so sequence
//! assignment cannot race even under many concurrent senders.
//!
//! Internally a `DashMap` of lazily allocated, reference-counted tokens
//! (grounded in the teacher's `realtime::core::SessionRegistry` — one
//! `DashMap` entry per key, fetched-or-inserted on demand). A token is
//! garbage-collected once nothing else references it; a benign race where
//! a new waiter arrives just as the last holder is collecting it just
//! causes a fresh token to be allocated, which is harmless.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex as AsyncMutex;

use chatcore_core::domain::Message;
use chatcore_core::error::CoreError;

use crate::store::Store;

type RoomKey = (String, String);
type RoomToken = Arc<AsyncMutex<()>>;

#[derive(Default)]
pub struct RoomRegistry {
    tokens: DashMap<RoomKey, RoomToken>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self { tokens: DashMap::new() }
    }

    fn token_for(&self, tenant_id: &str, room_id: &str) -> RoomToken {
        let key = (tenant_id.to_string(), room_id.to_string());
        self.tokens.entry(key).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
    }

    /// Drop the token for `(tenant_id, room_id)` if nothing else holds it.
    /// Callers must drop their own clone before calling this — otherwise
    /// the map's entry plus the caller's clone always keep the count at 2
    /// and the entry can never be collected.
    fn gc(&self, tenant_id: &str, room_id: &str) {
        let key = (tenant_id.to_string(), room_id.to_string());
        self.tokens.remove_if(&key, |_, v| Arc::strong_count(v) <= 1);
    }

    /// Acquire the room token, verify membership, append the message, then
    /// release — returning the persisted `Message` for the caller to hand
    /// to the Delivery Coordinator.
    pub async fn publish(
        &self,
        store: &Store,
        tenant_id: &str,
        sender_id: &str,
        room_id: &str,
        content: &str,
        meta: Option<&serde_json::Value>,
    ) -> chatcore_core::Result<Message> {
        let token = self.token_for(tenant_id, room_id);
        let _guard = token.lock().await;

        if !store.is_member(tenant_id, room_id, sender_id)? {
            return Err(CoreError::Forbidden(format!("{sender_id} is not a member of {room_id}")));
        }

        let result = store.append_message(tenant_id, room_id, sender_id, content, meta);

        drop(_guard);
        drop(token);
        self.gc(tenant_id, room_id);
        result
    }
}
