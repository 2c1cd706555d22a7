//! Matchmaking and session establishment for two-player peer sessions.
//!
//! A [`SessionCoordinator`] talks to a matchmaking server over a WebSocket
//! signaling connection, creates or joins a room, and then starts the peer
//! transport as host or client.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod reconnect;
pub mod session;
pub mod signaling;
pub mod transport;

pub use config::Config;
pub use dispatcher::Dispatcher;
pub use error::{ConfigError, SessionError};
pub use session::{Notification, Role, SessionCoordinator, SessionState};
pub use signaling::{RoomCode, WsConnector};
pub use transport::{LoggingPeerTransport, PeerTransport};
