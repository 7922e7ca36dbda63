//! Realtime Hub: in-memory registry mapping `(tenant, user)` to the set of
//! live connection handles for that user, and non-blocking fan-out to them.
//!
//! State here is process-local and authoritative only for liveness, never
//! for delivery guarantees (spec: "Hub as hint, store as truth"). Grounded
//! in the teacher's `realtime::core::SessionRegistry` (DashMap-keyed
//! connection table) generalized to multi-device: a user may have several
//! simultaneous connections, all of which receive fan-out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use axum::extract::ws::Message as WsMessage;
use dashmap::{DashMap, DashSet};
use tokio::sync::mpsc;
use uuid::Uuid;

use chatcore_core::protocol::ServerEvent;

/// Opaque handle returned by `Hub::register`, used to unregister later.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnHandle(Uuid);

#[derive(Clone)]
struct Connection {
    tx: mpsc::Sender<WsMessage>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendResult {
    Delivered,
    NotConnected,
    SendError,
}

/// `(tenant, user)` key, matching the tenant-scoped keys used throughout
/// the gateway (`"{tenant}::{user}"` in the teacher's `RealtimeCtx`).
fn user_key(tenant_id: &str, user_id: &str) -> String {
    format!("{tenant_id}::{user_id}")
}

#[derive(Default)]
pub struct Hub {
    /// user_key -> set of connection ids
    by_user: DashMap<String, DashSet<Uuid>>,
    /// connection id -> connection
    conns: DashMap<Uuid, Connection>,
    drops: AtomicU64,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection for `(tenant, user)`. The caller owns the
    /// receiving half of the channel and runs the per-connection writer
    /// task (grounded in the teacher's `transport::ws::run_session`
    /// writer-task split, which keeps the Hub from blocking on I/O).
    pub fn register(
        &self,
        tenant_id: &str,
        user_id: &str,
        buffer: usize,
    ) -> (ConnHandle, mpsc::Receiver<WsMessage>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(buffer);
        self.conns.insert(id, Connection { tx });
        self.by_user.entry(user_key(tenant_id, user_id)).or_insert_with(DashSet::new).insert(id);
        (ConnHandle(id), rx)
    }

    /// Unregister a connection. If its user's connection set becomes
    /// empty, the set entry is dropped.
    pub fn unregister(&self, tenant_id: &str, user_id: &str, handle: ConnHandle) {
        self.conns.remove(&handle.0);
        let key = user_key(tenant_id, user_id);
        if let Some(set) = self.by_user.get(&key) {
            set.remove(&handle.0);
            if set.is_empty() {
                drop(set);
                self.by_user.remove_if(&key, |_, s| s.is_empty());
            }
        }
    }

    pub fn is_online(&self, tenant_id: &str, user_id: &str) -> bool {
        self.by_user
            .get(&user_key(tenant_id, user_id))
            .map(|set| !set.is_empty())
            .unwrap_or(false)
    }

    /// Non-blocking enqueue to every connection of `(tenant, user)`.
    /// `Delivered` iff at least one connection accepted the event;
    /// `SendError` if connections exist but all rejected (buffer full or
    /// closed) — callers treat this the same as `NotConnected` for
    /// queuing purposes, but it is logged distinctly here.
    pub fn try_send(&self, tenant_id: &str, user_id: &str, event: &ServerEvent) -> SendResult {
        let key = user_key(tenant_id, user_id);
        let Some(conn_ids) = self.by_user.get(&key).map(|s| s.iter().map(|id| *id).collect::<Vec<_>>()) else {
            return SendResult::NotConnected;
        };
        if conn_ids.is_empty() {
            return SendResult::NotConnected;
        }

        let text = match serde_json::to_string(event) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "failed to encode server event");
                return SendResult::SendError;
            }
        };

        let mut any_delivered = false;
        let mut any_rejected = false;
        for id in conn_ids {
            if let Some(conn) = self.conns.get(&id) {
                match conn.tx.try_send(WsMessage::Text(text.clone())) {
                    Ok(()) => any_delivered = true,
                    Err(_) => {
                        any_rejected = true;
                        let n = self.drops.fetch_add(1, Ordering::Relaxed);
                        if n % 1024 == 1 {
                            tracing::warn!(user_key = %key, drops = %n, "hub send dropped (buffer full or closed)");
                        }
                    }
                }
            }
        }

        if any_delivered {
            SendResult::Delivered
        } else if any_rejected {
            SendResult::SendError
        } else {
            SendResult::NotConnected
        }
    }

    /// Close every connection, draining within `deadline`. Used during
    /// graceful shutdown (spec §5's drain deadline).
    pub async fn shutdown(&self, deadline: std::time::Duration) {
        let ids: Vec<Uuid> = self.conns.iter().map(|r| *r.key()).collect();
        for id in ids {
            if let Some(conn) = self.conns.get(&id) {
                let _ = tokio::time::timeout(deadline, conn.tx.send(WsMessage::Close(None))).await;
            }
        }
    }
}

pub type SharedHub = Arc<Hub>;
