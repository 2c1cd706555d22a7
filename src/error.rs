use thiserror::Error;

/// Errors surfaced by the signaling client and the session coordinator
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("invalid signaling url: {0}")]
    InvalidUrl(String),

    #[error("signaling connection is not open")]
    NotConnected,

    #[error("connection error: {0}")]
    ConnectionError(String),

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("server rejected request: {0}")]
    ServerRejection(String),

    #[error("reconnect attempts exhausted after {0} tries")]
    ReconnectExhausted(u32),

    #[error("room code must not be empty")]
    InvalidRoomCode,

    #[error("a session request is already in progress")]
    AlreadyInProgress,

    #[error("peer transport failed to start as {0}")]
    PeerStartFailure(&'static str),
}

/// Invalid configuration values read from the environment
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}
