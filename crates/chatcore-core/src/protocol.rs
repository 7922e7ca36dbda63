//! WebSocket wire protocol: tagged JSON frames exchanged once a connection
//! has authenticated and attached to the Realtime Hub.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Frames a client may send over an established connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Acknowledge delivery of every message in `room_id` up to `up_to_seq`.
    Ack { room_id: String, up_to_seq: i64 },
    /// Keepalive; answered with `ServerEvent::Pong`.
    Ping,
}

/// Frames the server pushes to a connected client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Message {
        room_id: String,
        message_id: Uuid,
        sender_id: String,
        seq: i64,
        content: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        meta: Option<serde_json::Value>,
        created_at: String,
    },
    /// Emitted when the hub has queued messages the connection has not yet
    /// acked; clients are expected to send `Ack` back once rendered.
    AckRequired { room_id: String, up_to_seq: i64 },
    Error {
        code: &'static str,
        message: String,
    },
    Pong,
}
