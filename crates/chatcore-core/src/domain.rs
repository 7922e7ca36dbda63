//! Domain types shared by the Store, Room Registry, Delivery Coordinator and
//! transport layers. Identifiers are opaque strings except `message_id`,
//! which is a UUID.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A room's conversation type. `Dm` rooms carry a deterministic `unique_key`
/// so two `CreateRoom` calls for the same pair of users converge on one row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomType {
    Dm,
    Group,
    Channel,
}

impl RoomType {
    pub fn as_str(self) -> &'static str {
        match self {
            RoomType::Dm => "dm",
            RoomType::Group => "group",
            RoomType::Channel => "channel",
        }
    }
}

impl std::str::FromStr for RoomType {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dm" => Ok(RoomType::Dm),
            "group" => Ok(RoomType::Group),
            "channel" => Ok(RoomType::Channel),
            other => Err(crate::error::CoreError::Invalid(format!(
                "unknown room type: {other}"
            ))),
        }
    }
}

/// Deterministic DM room key: `dm:<min(a,b)>:<max(a,b)>`.
pub fn dm_unique_key(a: &str, b: &str) -> String {
    if a <= b {
        format!("dm:{a}:{b}")
    } else {
        format!("dm:{b}:{a}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub room_id: String,
    pub tenant_id: String,
    #[serde(rename = "type")]
    pub room_type: RoomType,
    pub unique_key: Option<String>,
    pub name: Option<String>,
    pub last_seq: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoomMember {
    pub room_id: String,
    pub tenant_id: String,
    pub user_id: String,
    pub role: String,
    pub joined_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub message_id: Uuid,
    pub tenant_id: String,
    pub room_id: String,
    pub sender_id: String,
    pub seq: i64,
    pub content: String,
    pub meta: Option<serde_json::Value>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryState {
    pub tenant_id: String,
    pub user_id: String,
    pub room_id: String,
    pub last_ack: i64,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UndeliveredEntry {
    pub id: i64,
    pub tenant_id: String,
    pub user_id: String,
    pub room_id: String,
    pub message_id: Uuid,
    pub seq: i64,
    pub attempts: i64,
    pub created_at: String,
    pub last_attempt_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub tenant_id: String,
    pub api_key: String,
    pub name: String,
    pub config: Option<serde_json::Value>,
}

/// Request body for `CreateRoom`.
#[derive(Debug, Clone)]
pub struct RoomSpec {
    pub room_type: RoomType,
    pub members: Vec<String>,
    pub name: Option<String>,
    pub unique_key: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dm_key_is_order_independent() {
        assert_eq!(dm_unique_key("alice", "bob"), dm_unique_key("bob", "alice"));
        assert_eq!(dm_unique_key("alice", "bob"), "dm:alice:bob");
    }

    #[test]
    fn room_type_round_trips_through_str() {
        for t in [RoomType::Dm, RoomType::Group, RoomType::Channel] {
            let s = t.as_str();
            let parsed: RoomType = s.parse().unwrap();
            assert_eq!(parsed, t);
        }
    }
}
