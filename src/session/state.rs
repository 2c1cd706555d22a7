use std::fmt;
use std::time::Duration;

use serde_json::Value;

use crate::error::SessionError;
use crate::signaling::RoomCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingRoomCreation,
    HostWaitingForPeer,
    AwaitingJoinResponse,
    ClientConnecting,
    Established,
    Failed,
}

impl SessionState {
    /// States in which a lost signaling connection is retried.
    ///
    /// A host reconnecting from `HostWaitingForPeer` sends nothing: its room
    /// code stays valid only while the server still holds the room, which the
    /// reference server does for `ROOM_GRACE_PERIOD` after the drop.
    pub fn retries_on_disconnect(self) -> bool {
        matches!(
            self,
            SessionState::AwaitingRoomCreation
                | SessionState::HostWaitingForPeer
                | SessionState::AwaitingJoinResponse
                | SessionState::ClientConnecting
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Established | SessionState::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Host => f.write_str("host"),
            Role::Client => f.write_str("client"),
        }
    }
}

/// Outcomes reported to collaborators
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    RoomCreated(RoomCode),
    SessionEstablished(Role),
    SessionFailed(SessionError),
    Reconnecting { attempt: u32, delay: Duration },
    /// Gameplay parameter push, forwarded as received
    GameplayPush { kind: String, payload: Value },
}
