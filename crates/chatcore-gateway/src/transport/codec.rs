//! Decode-once codec for the WebSocket transport: each inbound frame is
//! parsed exactly once before reaching the session loop.

use axum::extract::ws::Message;

use chatcore_core::error::CoreError;
use chatcore_core::protocol::ClientFrame;

#[derive(Debug)]
pub enum Inbound {
    Frame(ClientFrame),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

pub fn decode(msg: Message) -> chatcore_core::Result<Inbound> {
    match msg {
        Message::Text(s) => {
            let frame: ClientFrame = serde_json::from_str(&s)
                .map_err(|e| CoreError::Invalid(format!("invalid frame json: {e}")))?;
            Ok(Inbound::Frame(frame))
        }
        Message::Binary(_) => Err(CoreError::Invalid("binary frames are not supported".into())),
        Message::Ping(v) => Ok(Inbound::Ping(v)),
        Message::Pong(v) => Ok(Inbound::Pong(v)),
        Message::Close(_) => Ok(Inbound::Close),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_ack_frame() {
        let msg = Message::Text(r#"{"type":"ack","room_id":"r1","up_to_seq":5}"#.to_string());
        match decode(msg).unwrap() {
            Inbound::Frame(ClientFrame::Ack { room_id, up_to_seq }) => {
                assert_eq!(room_id, "r1");
                assert_eq!(up_to_seq, 5);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_json() {
        let msg = Message::Text("not json".to_string());
        assert!(decode(msg).is_err());
    }
}
