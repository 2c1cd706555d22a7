//! Client side of the signaling connection.
//!
//! The I/O task never touches session state: every lifecycle event goes
//! through an [`EventSink`], which only enqueues onto the control loop.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::http::Uri;
use tracing::{debug, info, warn};

use super::messages::SignalingMessage;
use super::types::{CLOSE_ABNORMAL, ConnectionId, ConnectionState, OutboundMessage, SignalingEvent};
use crate::config::{DEFAULT_CLOSE_TIMEOUT, DEFAULT_CONNECT_TIMEOUT};
use crate::error::SessionError;

const CLOSE_NORMAL: u16 = 1000;
const CLOSE_NO_STATUS: u16 = 1005;

type Deliver = dyn Fn(ConnectionId, SignalingEvent) + Send + Sync;

/// Per-connection event channel handed to the I/O side
#[derive(Clone)]
pub struct EventSink {
    id: ConnectionId,
    deliver: Arc<Deliver>,
}

impl fmt::Debug for EventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventSink").field("id", &self.id).finish()
    }
}

impl EventSink {
    pub fn new<F>(id: ConnectionId, deliver: F) -> Self
    where
        F: Fn(ConnectionId, SignalingEvent) + Send + Sync + 'static,
    {
        Self {
            id,
            deliver: Arc::new(deliver),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn emit(&self, event: SignalingEvent) {
        (self.deliver)(self.id, event);
    }

    pub fn opened(&self) {
        self.emit(SignalingEvent::Opened);
    }

    pub fn message(&self, raw: impl Into<String>) {
        self.emit(SignalingEvent::Message(raw.into()));
    }

    pub fn error(&self, reason: impl Into<String>) {
        self.emit(SignalingEvent::Error(reason.into()));
    }

    pub fn closed(&self, code: u16, was_clean: bool) {
        self.emit(SignalingEvent::Closed { code, was_clean });
    }
}

/// An established (or establishing) transport connection
pub trait Connection: Send {
    fn send_text(&mut self, text: String) -> Result<(), SessionError>;

    /// Start a graceful close bounded by `timeout`. Must not block.
    fn close(&mut self, timeout: Duration);
}

/// Opens connections; outcomes are reported through the sink
pub trait Connector: Send {
    fn connect(&mut self, url: &str, sink: EventSink) -> Result<Box<dyn Connection>, SessionError>;
}

/// One logical connection to the matchmaking server
pub struct SignalingClient {
    id: ConnectionId,
    state: ConnectionState,
    connection: Option<Box<dyn Connection>>,
    close_timeout: Duration,
}

impl fmt::Debug for SignalingClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SignalingClient")
            .field("id", &self.id)
            .field("state", &self.state)
            .finish()
    }
}

impl SignalingClient {
    /// Begin connecting. Only URL validation fails here; everything else
    /// arrives later as events on `sink`.
    pub fn connect(
        connector: &mut dyn Connector,
        url: &str,
        sink: EventSink,
        close_timeout: Duration,
    ) -> Result<Self, SessionError> {
        validate_url(url)?;

        let id = sink.id();
        debug!("Signaling {} connecting to {}", id, url);
        let connection = connector.connect(url, sink)?;

        Ok(Self {
            id,
            state: ConnectionState::Connecting,
            connection: Some(connection),
            close_timeout,
        })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Serialize and transmit; refused unless the connection is open
    pub fn send(&mut self, message: &SignalingMessage) -> Result<(), SessionError> {
        if self.state != ConnectionState::Open {
            return Err(SessionError::NotConnected);
        }
        let connection = self.connection.as_mut().ok_or(SessionError::NotConnected)?;
        let text = message.encode()?;
        debug!("Signaling {} sending {}", self.id, message.kind());
        connection.send_text(text)
    }

    /// Track a lifecycle event raised for this connection
    pub fn apply(&mut self, event: &SignalingEvent) {
        match event {
            SignalingEvent::Opened if self.state == ConnectionState::Connecting => {
                self.state = ConnectionState::Open;
            }
            SignalingEvent::Closed { .. } => {
                self.state = ConnectionState::Closed;
                self.connection = None;
            }
            _ => {}
        }
    }

    /// Idempotent; a second call is a no-op.
    pub fn close(&mut self) {
        if matches!(self.state, ConnectionState::Closing | ConnectionState::Closed) {
            return;
        }
        self.state = ConnectionState::Closing;
        if let Some(mut connection) = self.connection.take() {
            debug!("Signaling {} closing", self.id);
            connection.close(self.close_timeout);
        }
    }
}

impl Drop for SignalingClient {
    fn drop(&mut self) {
        self.close();
    }
}

fn validate_url(url: &str) -> Result<(), SessionError> {
    let uri: Uri = url
        .parse()
        .map_err(|e| SessionError::InvalidUrl(format!("{}: {}", url, e)))?;

    if !matches!(uri.scheme_str(), Some("ws") | Some("wss")) {
        return Err(SessionError::InvalidUrl(format!(
            "{}: scheme must be ws or wss",
            url
        )));
    }
    if uri.host().is_none_or(str::is_empty) {
        return Err(SessionError::InvalidUrl(format!("{}: missing host", url)));
    }
    Ok(())
}

enum Command {
    Send(OutboundMessage),
    Close(Duration),
}

/// WebSocket connector running each connection as a tokio task
#[derive(Debug, Clone, Copy)]
pub struct WsConnector {
    connect_timeout: Duration,
}

impl Default for WsConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

impl WsConnector {
    /// `connect_timeout` bounds the TCP connect plus WebSocket upgrade
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

struct WsConnection {
    tx: mpsc::UnboundedSender<Command>,
}

impl Connection for WsConnection {
    fn send_text(&mut self, text: String) -> Result<(), SessionError> {
        self.tx
            .send(Command::Send(OutboundMessage::from(text)))
            .map_err(|_| SessionError::NotConnected)
    }

    fn close(&mut self, timeout: Duration) {
        let _ = self.tx.send(Command::Close(timeout));
    }
}

impl Connector for WsConnector {
    fn connect(&mut self, url: &str, sink: EventSink) -> Result<Box<dyn Connection>, SessionError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| SessionError::ConnectionError(format!("no async runtime: {}", e)))?;

        let (tx, rx) = mpsc::unbounded_channel::<Command>();
        runtime.spawn(connection_task(url.to_string(), self.connect_timeout, rx, sink));

        Ok(Box::new(WsConnection { tx }))
    }
}

async fn connection_task(
    url: String,
    connect_timeout: Duration,
    mut rx: mpsc::UnboundedReceiver<Command>,
    sink: EventSink,
) {
    let handshake = tokio::time::timeout(connect_timeout, connect_async(url.as_str()));
    tokio::pin!(handshake);
    let mut queued = Vec::new();

    // close requests must not wait behind a stalled handshake
    let ws_stream = loop {
        tokio::select! {
            result = &mut handshake => match result {
                Ok(Ok((stream, _))) => break stream,
                Ok(Err(e)) => {
                    warn!("Signaling {} failed to connect to {}: {}", sink.id(), url, e);
                    sink.error(e.to_string());
                    sink.closed(CLOSE_ABNORMAL, false);
                    return;
                }
                Err(_) => {
                    warn!(
                        "Signaling {} handshake with {} timed out after {:?}",
                        sink.id(),
                        url,
                        connect_timeout
                    );
                    sink.error(format!("handshake timed out after {:?}", connect_timeout));
                    sink.closed(CLOSE_ABNORMAL, false);
                    return;
                }
            },

            cmd = rx.recv() => match cmd {
                Some(Command::Send(msg)) => queued.push(msg),
                Some(Command::Close(_)) | None => {
                    debug!("Signaling {} closed before the handshake finished", sink.id());
                    sink.closed(CLOSE_ABNORMAL, false);
                    return;
                }
            },
        }
    };

    info!("Signaling {} connected to {}", sink.id(), url);
    sink.opened();

    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    for msg in queued {
        if let Err(e) = ws_tx.send(Message::Text(msg.into_inner())).await {
            warn!("Signaling {} send failed: {}", sink.id(), e);
            sink.error(e.to_string());
            sink.closed(CLOSE_ABNORMAL, false);
            return;
        }
    }

    let close_timeout = loop {
        tokio::select! {
            cmd = rx.recv() => match cmd {
                Some(Command::Send(msg)) => {
                    if let Err(e) = ws_tx.send(Message::Text(msg.into_inner())).await {
                        warn!("Signaling {} send failed: {}", sink.id(), e);
                        sink.error(e.to_string());
                        sink.closed(CLOSE_ABNORMAL, false);
                        return;
                    }
                }
                Some(Command::Close(timeout)) => break timeout,
                // client handle dropped
                None => break DEFAULT_CLOSE_TIMEOUT,
            },

            msg = ws_rx.next() => match msg {
                Some(Ok(Message::Text(text))) => sink.message(text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    let code = frame.map_or(CLOSE_NO_STATUS, |f| u16::from(f.code));
                    info!("Signaling {} closed by server ({})", sink.id(), code);
                    sink.closed(code, true);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Signaling {} read error: {}", sink.id(), e);
                    sink.error(e.to_string());
                    sink.closed(CLOSE_ABNORMAL, false);
                    return;
                }
                None => {
                    sink.closed(CLOSE_ABNORMAL, false);
                    return;
                }
            },
        }
    };

    // deliberate close: wait for the server's close frame, bounded
    if let Err(e) = ws_tx.send(Message::Close(None)).await {
        debug!("Signaling {} close frame not sent: {}", sink.id(), e);
        sink.closed(CLOSE_ABNORMAL, false);
        return;
    }

    let acknowledged = tokio::time::timeout(close_timeout, async {
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(Message::Close(_)) => return true,
                Ok(_) => {}
                Err(_) => return false,
            }
        }
        false
    })
    .await;

    match acknowledged {
        Ok(true) => {
            debug!("Signaling {} closed cleanly", sink.id());
            sink.closed(CLOSE_NORMAL, true);
        }
        Ok(false) => sink.closed(CLOSE_ABNORMAL, false),
        Err(_) => {
            warn!(
                "Signaling {} close not acknowledged within {:?}",
                sink.id(),
                close_timeout
            );
            sink.closed(CLOSE_ABNORMAL, false);
        }
    }
}
