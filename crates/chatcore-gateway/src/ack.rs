//! Ack Processor: advances `last_ack` and garbage-collects undelivered
//! entries. The heavy lifting (monotonic clamp, transactional delete) lives
//! in `Store::ack`; this module is the component boundary spec §4.5 names,
//! and the place request-handling logging attaches.

use std::sync::Arc;

use crate::store::Store;

pub struct AckProcessor {
    store: Arc<Store>,
}

impl AckProcessor {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Idempotent, monotonic, transactional. `up_to_seq` above the room's
    /// current `last_seq` is accepted and clamped; below the existing
    /// cursor it is a no-op success.
    pub fn ack(&self, tenant_id: &str, user_id: &str, room_id: &str, up_to_seq: i64) -> chatcore_core::Result<i64> {
        let new_ack = self.store.ack(tenant_id, user_id, room_id, up_to_seq)?;
        tracing::debug!(tenant_id, user_id, room_id, up_to_seq, new_ack, "ack applied");
        Ok(new_ack)
    }
}
