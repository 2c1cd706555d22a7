//! Signaling over a WebSocket connection to the matchmaking server

mod actor;
mod client;
mod messages;
mod server;
mod types;

pub use actor::{ROOM_GRACE_PERIOD, RoomManagerHandle};
pub use client::{Connection, Connector, EventSink, SignalingClient, WsConnector};
pub use messages::{Inbound, SIDE_CHANNEL_TYPES, SignalingMessage};
pub use server::{DEFAULT_SIGNALING_PORT, SignalingServer};
pub use types::{
    CLOSE_ABNORMAL, ConnectionId, ConnectionState, HostEndpoint, OutboundMessage, RoomCode,
    ServerError, SignalingEvent,
};

#[cfg(test)]
pub(crate) use client::testing;
