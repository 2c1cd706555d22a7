use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{Bytes, Message};
use tracing::{debug, error, info, warn};

use super::actor::{ROOM_GRACE_PERIOD, RoomManagerHandle};
use super::messages::SignalingMessage;
use super::types::{HostEndpoint, OutboundMessage};

pub const DEFAULT_SIGNALING_PORT: u16 = 3000;
const PING_INTERVAL: Duration = Duration::from_secs(30);
const PONG_TIMEOUT: Duration = Duration::from_secs(10);

/// Reference matchmaking server speaking the create-room / join-room protocol
pub struct SignalingServer {
    listener: TcpListener,
    handle: RoomManagerHandle,
}

impl SignalingServer {
    pub async fn bind(addr: &str) -> std::io::Result<Self> {
        Self::bind_with_grace(addr, ROOM_GRACE_PERIOD).await
    }

    /// Rooms outlive their host's connection by `room_grace`
    pub async fn bind_with_grace(addr: &str, room_grace: Duration) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!("Signaling server listening on {}", listener.local_addr()?);

        Ok(Self {
            listener,
            handle: RoomManagerHandle::spawn_with_grace(room_grace),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn run(self) -> std::io::Result<()> {
        let mut next_id: u64 = 0;

        loop {
            let (stream, addr) = self.listener.accept().await?;
            let handle = self.handle.clone();
            next_id += 1;
            let conn_id = next_id;

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, addr, conn_id, handle).await {
                    error!("Connection error from {}: {}", addr, e);
                }
            });
        }
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    conn_id: u64,
    handle: RoomManagerHandle,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let ws_stream = tokio_tungstenite::accept_async(stream).await?;
    let (mut ws_tx, mut ws_rx) = ws_stream.split();

    info!("WebSocket connection from {}", addr);

    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    let mut waiting_for_pong = false;
    let mut pong_deadline: Option<tokio::time::Instant> = None;

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_tx.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    loop {
        let pong_timeout = async {
            match pong_deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            _ = ping_interval.tick() => {
                if waiting_for_pong {
                    warn!("No Pong received, disconnecting {}", addr);
                    break;
                }
                if tx.send(Message::Ping(Bytes::new())).is_err() {
                    break;
                }
                waiting_for_pong = true;
                pong_deadline = Some(tokio::time::Instant::now() + PONG_TIMEOUT);
                debug!("Ping sent to {}", addr);
            }

            _ = pong_timeout => {
                warn!("Pong timeout, disconnecting {}", addr);
                break;
            }

            msg = ws_rx.next() => {
                let msg = match msg {
                    Some(Ok(m)) => m,
                    Some(Err(e)) => {
                        warn!("WebSocket error: {}", e);
                        break;
                    }
                    None => break,
                };

                match msg {
                    Message::Text(text) => {
                        if let Some(reply) = handle_text_message(&text, &handle, conn_id).await {
                            let json = serde_json::to_string(&reply)?;
                            let _ = tx.send(Message::Text(OutboundMessage::from(json).into_inner()));
                        }
                    }
                    Message::Pong(_) => {
                        waiting_for_pong = false;
                        pong_deadline = None;
                        debug!("Pong received from {}", addr);
                    }
                    Message::Close(_) => {
                        info!("Close received from {}", addr);
                        // flushes the close reply queued by tungstenite
                        let _ = tx.send(Message::Close(None));
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    handle.leave(conn_id).await;

    drop(tx);
    let abort = send_task.abort_handle();
    if tokio::time::timeout(Duration::from_secs(1), send_task).await.is_err() {
        debug!("Send task for {} did not finish, aborting", addr);
        abort.abort();
    }
    info!("WebSocket disconnected: {}", addr);

    Ok(())
}

async fn handle_text_message(
    text: &str,
    handle: &RoomManagerHandle,
    conn_id: u64,
) -> Option<SignalingMessage> {
    let message: SignalingMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(e) => {
            warn!("Invalid message from connection {}: {}", conn_id, e);
            return None;
        }
    };

    match message {
        SignalingMessage::CreateRoomRequest { host_address, port } => {
            let host = HostEndpoint {
                address: host_address,
                port,
            };
            let reply = match handle.create_room(host, conn_id).await {
                Ok(room_code) => SignalingMessage::RoomCreated {
                    success: true,
                    room_code,
                },
                Err(e) => {
                    warn!("Room creation failed: {}", e);
                    SignalingMessage::RoomCreated {
                        success: false,
                        room_code: Default::default(),
                    }
                }
            };
            Some(reply)
        }

        SignalingMessage::JoinRoomRequest {
            room_code,
            client_address,
        } => {
            debug!("Join request for {} from {}", room_code, client_address);
            let reply = match handle.join_room(room_code).await {
                Ok(host) => SignalingMessage::JoinResponse {
                    success: true,
                    message: String::new(),
                    host_address: Some(host.address),
                    port: Some(host.port),
                },
                Err(e) => SignalingMessage::JoinResponse {
                    success: false,
                    message: e.to_string(),
                    host_address: None,
                    port: None,
                },
            };
            Some(reply)
        }

        other => {
            warn!("Unexpected {} from connection {}", other.kind(), conn_id);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::RoomCode;
    use std::net::Ipv4Addr;

    #[tokio::test]
    async fn create_then_join_returns_host_endpoint() {
        let handle = RoomManagerHandle::spawn();
        let created = handle_text_message(
            r#"{"type":"create-room","hostIP":"192.168.1.9","port":7777}"#,
            &handle,
            1,
        )
        .await;

        let room_code = match created {
            Some(SignalingMessage::RoomCreated {
                success: true,
                room_code,
            }) => room_code,
            other => panic!("Expected room-created, got {:?}", other),
        };

        let joined = handle_text_message(
            &format!(r#"{{"type":"join-room","roomCode":"{}","playerIP":"10.0.0.2"}}"#, room_code),
            &handle,
            2,
        )
        .await;
        assert_eq!(
            joined,
            Some(SignalingMessage::JoinResponse {
                success: true,
                message: String::new(),
                host_address: Some(Ipv4Addr::new(192, 168, 1, 9)),
                port: Some(7777),
            })
        );
    }

    #[tokio::test]
    async fn join_unknown_room_is_rejected() {
        let handle = RoomManagerHandle::spawn();
        let reply = handle_text_message(
            r#"{"type":"join-room","roomCode":"XYZ999","playerIP":"10.0.0.2"}"#,
            &handle,
            1,
        )
        .await;
        assert_eq!(
            reply,
            Some(SignalingMessage::JoinResponse {
                success: false,
                message: "room not found".to_string(),
                host_address: None,
                port: None,
            })
        );
    }

    #[tokio::test]
    async fn invalid_and_unexpected_messages_get_no_reply() {
        let handle = RoomManagerHandle::spawn();
        assert_eq!(handle_text_message("garbage", &handle, 1).await, None);

        let unexpected = SignalingMessage::RoomCreated {
            success: true,
            room_code: RoomCode::from("ABC123"),
        };
        let text = serde_json::to_string(&unexpected).unwrap();
        assert_eq!(handle_text_message(&text, &handle, 1).await, None);
    }
}
