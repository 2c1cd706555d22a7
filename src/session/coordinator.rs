use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::state::{Notification, Role, SessionState};
use crate::config::Config;
use crate::dispatcher::Dispatcher;
use crate::error::SessionError;
use crate::reconnect::{ReconnectContext, ReconnectPolicy};
use crate::signaling::{
    ConnectionId, ConnectionState, Connector, EventSink, Inbound, RoomCode, SignalingClient,
    SignalingEvent, SignalingMessage,
};
use crate::transport::{PeerEvent, PeerEventSink, PeerTransport};

struct RetryTimer {
    task: JoinHandle<()>,
    delay: Duration,
}

/// Drives room creation / joining up to an established peer session.
///
/// Owned by the control loop. I/O tasks and the peer transport reach it only
/// through actions queued on its [`Dispatcher`], drained by [`tick`](Self::tick).
pub struct SessionCoordinator<P: PeerTransport> {
    config: Config,
    state: SessionState,
    reconnect: ReconnectContext,
    room_code: Option<RoomCode>,
    role: Option<Role>,
    /// Sent each time the connection opens, until answered
    pending_request: Option<SignalingMessage>,
    client: Option<SignalingClient>,
    next_connection: u64,
    intentional_close: bool,
    last_error: Option<String>,
    retry_timer: Option<RetryTimer>,
    /// Bumped on every timer cancellation; a retry from an older epoch is stale
    retry_epoch: u64,
    connector: Box<dyn Connector>,
    peer: P,
    dispatcher: Dispatcher<SessionCoordinator<P>>,
    notify_tx: async_channel::Sender<Notification>,
    notify_rx: async_channel::Receiver<Notification>,
}

impl<P: PeerTransport> SessionCoordinator<P> {
    pub fn new(config: Config, connector: impl Connector + 'static, peer: P) -> Self {
        let policy = ReconnectPolicy::new(config.max_reconnect_attempts, config.reconnect_base_delay);
        let (notify_tx, notify_rx) = async_channel::unbounded();

        Self {
            config,
            state: SessionState::Idle,
            reconnect: ReconnectContext::new(policy),
            room_code: None,
            role: None,
            pending_request: None,
            client: None,
            next_connection: 0,
            intentional_close: false,
            last_error: None,
            retry_timer: None,
            retry_epoch: 0,
            connector: Box::new(connector),
            peer,
            dispatcher: Dispatcher::new(),
            notify_tx,
            notify_rx,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn room_code(&self) -> Option<&RoomCode> {
        self.room_code.as_ref()
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn reconnect_context(&self) -> ReconnectContext {
        self.reconnect
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.client
            .as_ref()
            .map_or(ConnectionState::Disconnected, SignalingClient::state)
    }

    /// Delay of the scheduled reconnect, if one is pending
    pub fn pending_retry_delay(&self) -> Option<Duration> {
        self.retry_timer.as_ref().map(|t| t.delay)
    }

    pub fn notifications(&self) -> async_channel::Receiver<Notification> {
        self.notify_rx.clone()
    }

    pub fn dispatcher(&self) -> Dispatcher<SessionCoordinator<P>> {
        self.dispatcher.clone()
    }

    pub fn peer(&self) -> &P {
        &self.peer
    }

    pub fn peer_mut(&mut self) -> &mut P {
        &mut self.peer
    }

    /// Drain queued events once. Call every control-loop tick.
    pub fn tick(&mut self) -> usize {
        let dispatcher = self.dispatcher.clone();
        dispatcher.drain_once(self)
    }

    /// Sink for peer transport events, routed through the dispatcher
    pub fn peer_events(&self) -> PeerEventSink {
        let dispatcher = self.dispatcher.clone();
        PeerEventSink::new(move |event| {
            dispatcher.enqueue(move |c: &mut SessionCoordinator<P>| {
                c.on_peer_event(event);
                Ok(())
            });
        })
    }

    pub fn create_room(&mut self) -> Result<(), SessionError> {
        self.ensure_idle()?;

        let request = SignalingMessage::CreateRoomRequest {
            host_address: self.config.local_address(),
            port: self.config.peer_port,
        };
        self.begin(SessionState::AwaitingRoomCreation, request)?;
        info!("Creating room via {}", self.config.server_url);
        Ok(())
    }

    pub fn join_room(&mut self, code: impl Into<RoomCode>) -> Result<(), SessionError> {
        self.ensure_idle()?;

        let code = code.into();
        if code.is_empty() {
            return Err(SessionError::InvalidRoomCode);
        }

        let request = SignalingMessage::JoinRoomRequest {
            room_code: code.clone(),
            client_address: self.config.local_address(),
        };
        self.begin(SessionState::AwaitingJoinResponse, request)?;
        info!("Joining room {} via {}", code, self.config.server_url);
        self.room_code = Some(code);
        Ok(())
    }

    /// Back to `Idle` from any state: closes signaling and cancels any pending reconnect
    pub fn reset(&mut self) {
        info!("Resetting session (was {:?})", self.state);
        self.cancel_retry_timer();
        self.close_connection();
        self.pending_request = None;
        self.room_code = None;
        self.role = None;
        self.last_error = None;
        self.transition(SessionState::Idle);
    }

    /// Release the connection and timers without touching session state
    pub fn shutdown(&mut self) {
        self.cancel_retry_timer();
        self.close_connection();
    }

    fn ensure_idle(&self) -> Result<(), SessionError> {
        if self.state != SessionState::Idle {
            warn!("Session request refused while {:?}", self.state);
            return Err(SessionError::AlreadyInProgress);
        }
        Ok(())
    }

    fn begin(&mut self, next: SessionState, request: SignalingMessage) -> Result<(), SessionError> {
        self.reconnect.reset();
        self.open_connection()?;
        self.pending_request = Some(request);
        self.transition(next);
        Ok(())
    }

    fn open_connection(&mut self) -> Result<(), SessionError> {
        self.close_connection();

        self.next_connection += 1;
        let id = ConnectionId(self.next_connection);
        let dispatcher = self.dispatcher.clone();
        let sink = EventSink::new(id, move |id, event| {
            dispatcher.enqueue(move |c: &mut SessionCoordinator<P>| {
                c.on_signaling_event(id, event).map_err(Into::into)
            });
        });

        let client = SignalingClient::connect(
            self.connector.as_mut(),
            &self.config.server_url,
            sink,
            self.config.close_timeout,
        )?;

        self.client = Some(client);
        self.intentional_close = false;
        self.last_error = None;
        Ok(())
    }

    fn close_connection(&mut self) {
        if let Some(client) = self.client.as_mut() {
            self.intentional_close = true;
            client.close();
        }
    }

    fn on_signaling_event(
        &mut self,
        id: ConnectionId,
        event: SignalingEvent,
    ) -> Result<(), SessionError> {
        let Some(client) = self.client.as_mut().filter(|c| c.id() == id) else {
            debug!("Ignoring {:?} from stale {}", event, id);
            return Ok(());
        };
        client.apply(&event);

        match event {
            SignalingEvent::Opened => self.on_open(),
            SignalingEvent::Message(raw) => self.on_message(&raw),
            SignalingEvent::Error(reason) => {
                warn!("Signaling {} error: {}", id, reason);
                self.last_error = Some(reason);
                Ok(())
            }
            SignalingEvent::Closed { code, was_clean } => {
                self.on_close(code, was_clean);
                Ok(())
            }
        }
    }

    fn on_open(&mut self) -> Result<(), SessionError> {
        info!("Signaling connection open while {:?}", self.state);
        let Some(request) = self.pending_request.clone() else {
            return Ok(());
        };
        match self.client.as_mut() {
            Some(client) => client.send(&request),
            None => Err(SessionError::NotConnected),
        }
    }

    fn on_message(&mut self, raw: &str) -> Result<(), SessionError> {
        match Inbound::decode(raw)? {
            Inbound::SideChannel { kind, payload } => {
                debug!("Forwarding {} push", kind);
                self.notify(Notification::GameplayPush { kind, payload });
            }
            Inbound::Signaling(message) => self.on_signaling_message(message),
        }
        Ok(())
    }

    fn on_signaling_message(&mut self, message: SignalingMessage) {
        match (self.state, message) {
            (
                SessionState::AwaitingRoomCreation,
                SignalingMessage::RoomCreated {
                    success: true,
                    room_code,
                },
            ) => {
                self.pending_request = None;
                info!("Room {} created", room_code);
                self.room_code = Some(room_code.clone());
                self.transition(SessionState::HostWaitingForPeer);
                self.notify(Notification::RoomCreated(room_code));

                let events = self.peer_events();
                let (bind, port) = (self.config.bind_address, self.config.peer_port);
                if !self.peer.start_host(bind, port, events) {
                    self.fail(SessionError::PeerStartFailure("host"));
                }
            }

            (SessionState::AwaitingRoomCreation, SignalingMessage::RoomCreated { success: false, .. }) => {
                self.fail(SessionError::ServerRejection(
                    "room creation was rejected".to_string(),
                ));
            }

            (
                SessionState::AwaitingJoinResponse,
                SignalingMessage::JoinResponse {
                    success: true,
                    host_address: Some(host),
                    port: Some(port),
                    ..
                },
            ) => {
                self.pending_request = None;
                info!("Room accepted, connecting to host {}:{}", host, port);
                self.transition(SessionState::ClientConnecting);

                let events = self.peer_events();
                if !self.peer.start_client(host, port, events) {
                    self.fail(SessionError::PeerStartFailure("client"));
                }
            }

            (SessionState::AwaitingJoinResponse, SignalingMessage::JoinResponse { success: true, .. }) => {
                self.fail(SessionError::ProtocolError(
                    "join-response without host address".to_string(),
                ));
            }

            (
                SessionState::AwaitingJoinResponse,
                SignalingMessage::JoinResponse {
                    success: false,
                    message,
                    ..
                },
            ) => {
                let reason = if message.is_empty() {
                    "join was rejected".to_string()
                } else {
                    message
                };
                self.fail(SessionError::ServerRejection(reason));
            }

            (state, message) => {
                warn!("Ignoring {} while {:?}", message.kind(), state);
            }
        }
    }

    fn on_close(&mut self, code: u16, was_clean: bool) {
        let reason = self
            .last_error
            .take()
            .unwrap_or_else(|| format!("closed with code {}", code));
        self.client = None;

        if self.intentional_close {
            debug!("Signaling connection closed as requested ({})", code);
            return;
        }
        if !self.state.retries_on_disconnect() {
            info!(
                "Signaling connection closed while {:?}: {} (clean: {})",
                self.state, reason, was_clean
            );
            return;
        }

        warn!(
            "Signaling connection lost while {:?}: {}",
            self.state,
            SessionError::ConnectionError(reason)
        );
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        let Some(delay) = self.reconnect.next_retry() else {
            let attempts = self.reconnect.attempt;
            self.fail(SessionError::ReconnectExhausted(attempts));
            return;
        };

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                self.fail(SessionError::ConnectionError(format!(
                    "cannot schedule reconnect: {}",
                    e
                )));
                return;
            }
        };

        let attempt = self.reconnect.attempt;
        info!(
            "Reconnecting in {:?} (attempt {}/{})",
            delay, attempt, self.reconnect.policy.max_attempts
        );

        self.cancel_retry_timer();
        let epoch = self.retry_epoch;
        let dispatcher = self.dispatcher.clone();
        let task = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            dispatcher.enqueue(move |c: &mut SessionCoordinator<P>| {
                c.on_retry_due(epoch);
                Ok(())
            });
        });

        self.retry_timer = Some(RetryTimer { task, delay });
        self.notify(Notification::Reconnecting { attempt, delay });
    }

    fn on_retry_due(&mut self, epoch: u64) {
        if epoch != self.retry_epoch || self.retry_timer.take().is_none() {
            debug!("Discarding stale reconnect timer");
            return;
        }
        if !self.state.retries_on_disconnect() {
            return;
        }

        info!("Reconnect attempt {}", self.reconnect.attempt);
        if let Err(e) = self.open_connection() {
            self.fail(e);
        }
    }

    fn cancel_retry_timer(&mut self) {
        if let Some(timer) = self.retry_timer.take() {
            debug!("Cancelling reconnect timer ({:?})", timer.delay);
            timer.task.abort();
        }
        self.retry_epoch += 1;
    }

    fn on_peer_event(&mut self, event: PeerEvent) {
        match (self.state, event) {
            (SessionState::HostWaitingForPeer, PeerEvent::HostStarted) => {
                self.establish(Role::Host);
            }
            (SessionState::ClientConnecting, PeerEvent::ClientConnected(peer)) => {
                debug!("Connected to host as peer {}", peer);
                self.establish(Role::Client);
            }
            (_, PeerEvent::ClientConnected(peer)) => info!("Peer {} connected", peer),
            (_, PeerEvent::ClientDisconnected(peer)) => info!("Peer {} disconnected", peer),
            (state, PeerEvent::HostStarted) => warn!("Host started while {:?}, ignoring", state),
        }
    }

    fn establish(&mut self, role: Role) {
        self.cancel_retry_timer();
        self.role = Some(role);
        self.transition(SessionState::Established);
        info!("Session established as {}", role);
        self.notify(Notification::SessionEstablished(role));
    }

    fn fail(&mut self, err: SessionError) {
        error!("Session failed while {:?}: {}", self.state, err);
        self.cancel_retry_timer();
        self.close_connection();
        self.pending_request = None;
        self.transition(SessionState::Failed);
        self.notify(Notification::SessionFailed(err));
    }

    fn transition(&mut self, next: SessionState) {
        debug!("Session {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn notify(&self, notification: Notification) {
        if let Err(e) = self.notify_tx.try_send(notification) {
            warn!("Dropping notification: {}", e);
        }
    }
}

impl<P: PeerTransport> Drop for SessionCoordinator<P> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
