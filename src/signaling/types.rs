use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::Utf8Bytes;

/// Matchmaking server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("room not found")]
    RoomNotFound(RoomCode),

    #[error("internal error: {0}")]
    Internal(String),
}

const ROOM_CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const ROOM_CODE_LEN: usize = 6;

/// Opaque room identifier handed out by the server
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomCode(String);

impl RoomCode {
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let code = (0..ROOM_CODE_LEN)
            .map(|_| ROOM_CODE_CHARS[rng.random_range(0..ROOM_CODE_CHARS.len())] as char)
            .collect();
        Self(code)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RoomCode {
    fn from(s: &str) -> Self {
        Self(s.trim().to_string())
    }
}

impl From<String> for RoomCode {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

/// Lifecycle of one signaling connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Identifies one connection opened by a coordinator; later connections get larger ids
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Close code reported when the stream ended without a close frame
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Lifecycle and payload events raised by the I/O side of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalingEvent {
    Opened,
    Message(String),
    Error(String),
    Closed { code: u16, was_clean: bool },
}

/// Wrapper for outbound WebSocket text using tungstenite's Utf8Bytes.
#[derive(Debug, Clone)]
pub struct OutboundMessage(Utf8Bytes);

impl OutboundMessage {
    pub fn into_inner(self) -> Utf8Bytes {
        self.0
    }
}

impl From<String> for OutboundMessage {
    fn from(s: String) -> Self {
        Self(Utf8Bytes::from(s))
    }
}

/// Where a host's peer transport can be reached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostEndpoint {
    pub address: Ipv4Addr,
    pub port: u16,
}

#[derive(Debug)]
pub(crate) struct Room {
    pub host: HostEndpoint,
    /// Server-side connection that created the room
    pub owner: u64,
    /// Set when the owner's connection closes; the room expires a grace period later
    pub orphaned_at: Option<Instant>,
}

impl Room {
    pub fn new(host: HostEndpoint, owner: u64) -> Self {
        Self {
            host,
            owner,
            orphaned_at: None,
        }
    }

    pub fn is_expired(&self, now: Instant, grace: Duration) -> bool {
        self.orphaned_at
            .is_some_and(|since| now.saturating_duration_since(since) >= grace)
    }
}

pub(crate) type Rooms = HashMap<RoomCode, Room>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_code_generate_has_correct_length() {
        let code = RoomCode::generate();
        assert_eq!(code.as_str().len(), 6);
    }

    #[test]
    fn room_code_generate_uses_valid_chars() {
        let code = RoomCode::generate();
        for c in code.as_str().bytes() {
            assert!(ROOM_CODE_CHARS.contains(&c), "Invalid char: {}", c as char);
        }
    }

    #[test]
    fn room_code_from_str_trims_input() {
        let code = RoomCode::from("  ABC123\n");
        assert_eq!(code.as_str(), "ABC123");
        assert_eq!(format!("{}", code), "ABC123");
    }

    #[test]
    fn room_code_serialization() {
        let code = RoomCode::from("XYZ999");
        assert_eq!(serde_json::to_string(&code).unwrap(), "\"XYZ999\"");
        let back: RoomCode = serde_json::from_str("\"XYZ999\"").unwrap();
        assert_eq!(back, code);
    }

    #[test]
    fn connection_ids_order() {
        assert!(ConnectionId(2) > ConnectionId(1));
        assert_eq!(ConnectionId(3).to_string(), "conn#3");
    }
}
