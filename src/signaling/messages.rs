use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::RoomCode;
use crate::error::SessionError;

/// Gameplay pushes sharing the signaling connection. Routed, never parsed here.
pub const SIDE_CHANNEL_TYPES: &[&str] = &["player-speed-updated", "player-image-updated"];

/// Messages exchanged with the matchmaking server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalingMessage {
    /// Host asks for a room, advertising where peers should connect
    #[serde(rename = "create-room")]
    CreateRoomRequest {
        #[serde(rename = "hostIP")]
        host_address: Ipv4Addr,
        port: u16,
    },

    #[serde(rename = "room-created")]
    RoomCreated {
        success: bool,
        #[serde(rename = "roomCode", default)]
        room_code: RoomCode,
    },

    #[serde(rename = "join-room")]
    JoinRoomRequest {
        #[serde(rename = "roomCode")]
        room_code: RoomCode,
        #[serde(rename = "playerIP")]
        client_address: Ipv4Addr,
    },

    /// Host address and port are only present on success
    #[serde(rename = "join-response")]
    JoinResponse {
        success: bool,
        #[serde(default)]
        message: String,
        #[serde(rename = "hostIP", default, skip_serializing_if = "Option::is_none")]
        host_address: Option<Ipv4Addr>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        port: Option<u16>,
    },
}

impl SignalingMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            SignalingMessage::CreateRoomRequest { .. } => "create-room",
            SignalingMessage::RoomCreated { .. } => "room-created",
            SignalingMessage::JoinRoomRequest { .. } => "join-room",
            SignalingMessage::JoinResponse { .. } => "join-response",
        }
    }

    pub fn encode(&self) -> Result<String, SessionError> {
        serde_json::to_string(self)
            .map_err(|e| SessionError::ProtocolError(format!("encode {}: {}", self.kind(), e)))
    }
}

/// One decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Signaling(SignalingMessage),
    SideChannel { kind: String, payload: Value },
}

impl Inbound {
    pub fn decode(raw: &str) -> Result<Self, SessionError> {
        let value: Value = serde_json::from_str(raw)
            .map_err(|e| SessionError::ProtocolError(format!("malformed json: {}", e)))?;

        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| SessionError::ProtocolError("missing type field".to_string()))?
            .to_string();

        if SIDE_CHANNEL_TYPES.contains(&kind.as_str()) {
            return Ok(Inbound::SideChannel {
                kind,
                payload: value,
            });
        }

        serde_json::from_value::<SignalingMessage>(value)
            .map(Inbound::Signaling)
            .map_err(|e| SessionError::ProtocolError(format!("bad {} message: {}", kind, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn json(s: &str) -> Value {
        serde_json::from_str(s).unwrap()
    }

    #[test]
    fn create_room_wire_format() {
        let msg = SignalingMessage::CreateRoomRequest {
            host_address: Ipv4Addr::new(192, 168, 1, 10),
            port: 7777,
        };
        let encoded = msg.encode().unwrap();
        assert_eq!(
            json(&encoded),
            json(r#"{"type":"create-room","hostIP":"192.168.1.10","port":7777}"#)
        );
    }

    #[test]
    fn join_room_wire_format() {
        let msg = SignalingMessage::JoinRoomRequest {
            room_code: RoomCode::from("XYZ999"),
            client_address: Ipv4Addr::new(10, 0, 0, 7),
        };
        assert_eq!(
            json(&msg.encode().unwrap()),
            json(r#"{"type":"join-room","roomCode":"XYZ999","playerIP":"10.0.0.7"}"#)
        );
    }

    #[test]
    fn parse_room_created() {
        let inbound =
            Inbound::decode(r#"{"type":"room-created","success":true,"roomCode":"ABC123"}"#).unwrap();
        assert_eq!(
            inbound,
            Inbound::Signaling(SignalingMessage::RoomCreated {
                success: true,
                room_code: RoomCode::from("ABC123"),
            })
        );
    }

    #[test]
    fn parse_failed_join_without_host_fields() {
        let inbound =
            Inbound::decode(r#"{"type":"join-response","success":false,"message":"room not found"}"#)
                .unwrap();
        if let Inbound::Signaling(SignalingMessage::JoinResponse {
            success,
            message,
            host_address,
            port,
        }) = inbound
        {
            assert!(!success);
            assert_eq!(message, "room not found");
            assert_eq!(host_address, None);
            assert_eq!(port, None);
        } else {
            panic!("Expected JoinResponse");
        }
    }

    #[test]
    fn parse_successful_join() {
        let inbound = Inbound::decode(
            r#"{"type":"join-response","success":true,"message":"","hostIP":"192.168.0.4","port":7777}"#,
        )
        .unwrap();
        if let Inbound::Signaling(SignalingMessage::JoinResponse {
            host_address, port, ..
        }) = inbound
        {
            assert_eq!(host_address, Some(Ipv4Addr::new(192, 168, 0, 4)));
            assert_eq!(port, Some(7777));
        } else {
            panic!("Expected JoinResponse");
        }
    }

    #[test]
    fn side_channel_is_routed_unparsed() {
        let inbound = Inbound::decode(r#"{"type":"player-speed-updated","speed":7.5}"#).unwrap();
        match inbound {
            Inbound::SideChannel { kind, payload } => {
                assert_eq!(kind, "player-speed-updated");
                assert_eq!(payload["speed"], 7.5);
            }
            other => panic!("Expected side channel, got {:?}", other),
        }
    }

    #[test]
    fn unknown_type_is_protocol_error() {
        let err = Inbound::decode(r#"{"type":"teleport"}"#).unwrap_err();
        assert!(matches!(err, SessionError::ProtocolError(_)));
    }

    #[test]
    fn malformed_json_is_protocol_error() {
        assert!(matches!(
            Inbound::decode("{not json"),
            Err(SessionError::ProtocolError(_))
        ));
        assert!(matches!(
            Inbound::decode(r#"{"success":true}"#),
            Err(SessionError::ProtocolError(_))
        ));
    }
}
