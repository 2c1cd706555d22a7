use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::info;

use super::types::{HostEndpoint, Room, RoomCode, Rooms, ServerError};

/// Commands sent to the room manager actor
pub(crate) enum RoomCommand {
    Create {
        host: HostEndpoint,
        owner: u64,
        reply: oneshot::Sender<RoomCode>,
    },
    Join {
        code: RoomCode,
        reply: oneshot::Sender<Result<HostEndpoint, ServerError>>,
    },
    /// Connection `owner` went away; its rooms start their grace period
    Leave { owner: u64 },
}

/// How long a room outlives its host's signaling connection
pub const ROOM_GRACE_PERIOD: Duration = Duration::from_secs(30);

pub(crate) async fn room_manager_actor(mut rx: mpsc::Receiver<RoomCommand>, grace: Duration) {
    let mut rooms = Rooms::new();

    while let Some(cmd) = rx.recv().await {
        let now = Instant::now();
        rooms.retain(|code, room| {
            let expired = room.is_expired(now, grace);
            if expired {
                info!("Room {} expired (host did not return)", code);
            }
            !expired
        });

        match cmd {
            RoomCommand::Create { host, owner, reply } => {
                let code = loop {
                    let candidate = RoomCode::generate();
                    if !rooms.contains_key(&candidate) {
                        break candidate;
                    }
                };

                rooms.insert(code.clone(), Room::new(host, owner));
                info!(
                    "Room {} created for host {}:{}",
                    code, host.address, host.port
                );
                let _ = reply.send(code);
            }

            RoomCommand::Join { code, reply } => {
                let result = match rooms.get(&code) {
                    Some(room) => {
                        info!("Peer joining room {}", code);
                        Ok(room.host)
                    }
                    None => Err(ServerError::RoomNotFound(code)),
                };
                let _ = reply.send(result);
            }

            RoomCommand::Leave { owner } => {
                for (code, room) in rooms.iter_mut().filter(|(_, r)| r.owner == owner) {
                    info!("Host of room {} left, keeping it for {:?}", code, grace);
                    room.orphaned_at = Some(now);
                }
            }
        }
    }
}

/// Handle to communicate with the room manager actor
#[derive(Clone)]
pub struct RoomManagerHandle {
    pub(crate) tx: mpsc::Sender<RoomCommand>,
}

impl RoomManagerHandle {
    /// Spawn the actor on the current runtime
    pub fn spawn() -> Self {
        Self::spawn_with_grace(ROOM_GRACE_PERIOD)
    }

    /// Spawn with a custom grace period; zero drops rooms as soon as the host leaves
    pub fn spawn_with_grace(grace: Duration) -> Self {
        let (tx, rx) = mpsc::channel::<RoomCommand>(1024);
        tokio::spawn(room_manager_actor(rx, grace));
        Self { tx }
    }

    /// Register a room hosted at `host`
    pub async fn create_room(&self, host: HostEndpoint, owner: u64) -> Result<RoomCode, ServerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(RoomCommand::Create {
                host,
                owner,
                reply: reply_tx,
            })
            .await;
        reply_rx
            .await
            .map_err(|_| ServerError::Internal("actor channel closed".to_string()))
    }

    /// Look up the host of an existing room
    pub async fn join_room(&self, code: RoomCode) -> Result<HostEndpoint, ServerError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let _ = self
            .tx
            .send(RoomCommand::Join {
                code,
                reply: reply_tx,
            })
            .await;
        reply_rx
            .await
            .map_err(|_| ServerError::Internal("actor channel closed".to_string()))?
    }

    pub async fn leave(&self, owner: u64) {
        let _ = self.tx.send(RoomCommand::Leave { owner }).await;
    }
}
