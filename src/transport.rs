//! Boundary to the external peer-network engine

use std::fmt;
use std::net::Ipv4Addr;
use std::sync::Arc;

use tracing::info;

/// Peer id as assigned by the peer transport
pub type PeerId = u64;

/// Lifecycle notifications raised by the peer transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    HostStarted,
    ClientConnected(PeerId),
    ClientDisconnected(PeerId),
}

/// Handed to the peer transport on start; each call only enqueues onto the control loop
#[derive(Clone)]
pub struct PeerEventSink {
    deliver: Arc<dyn Fn(PeerEvent) + Send + Sync>,
}

impl fmt::Debug for PeerEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PeerEventSink")
    }
}

impl PeerEventSink {
    pub fn new<F>(deliver: F) -> Self
    where
        F: Fn(PeerEvent) + Send + Sync + 'static,
    {
        Self {
            deliver: Arc::new(deliver),
        }
    }

    pub fn host_started(&self) {
        (self.deliver)(PeerEvent::HostStarted);
    }

    pub fn client_connected(&self, peer: PeerId) {
        (self.deliver)(PeerEvent::ClientConnected(peer));
    }

    pub fn client_disconnected(&self, peer: PeerId) {
        (self.deliver)(PeerEvent::ClientDisconnected(peer));
    }
}

/// Implemented by the peer-network engine. A `false` return means the
/// transport could not start in that role.
pub trait PeerTransport: 'static {
    fn start_host(&mut self, bind_address: Ipv4Addr, port: u16, events: PeerEventSink) -> bool;

    fn start_client(&mut self, host_address: Ipv4Addr, port: u16, events: PeerEventSink) -> bool;
}

/// Stand-in transport that only logs and reports success straight away
#[derive(Debug, Default)]
pub struct LoggingPeerTransport {
    next_peer: PeerId,
}

impl PeerTransport for LoggingPeerTransport {
    fn start_host(&mut self, bind_address: Ipv4Addr, port: u16, events: PeerEventSink) -> bool {
        info!("Peer transport hosting on {}:{}", bind_address, port);
        events.host_started();
        true
    }

    fn start_client(&mut self, host_address: Ipv4Addr, port: u16, events: PeerEventSink) -> bool {
        info!("Peer transport connecting to {}:{}", host_address, port);
        self.next_peer += 1;
        events.client_connected(self.next_peer);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn logging_transport_reports_started_roles() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = Arc::clone(&seen);
        let sink = PeerEventSink::new(move |event| log.lock().unwrap().push(event));

        let mut transport = LoggingPeerTransport::default();
        assert!(transport.start_host(Ipv4Addr::UNSPECIFIED, 7777, sink.clone()));
        assert!(transport.start_client(Ipv4Addr::LOCALHOST, 7777, sink));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![PeerEvent::HostStarted, PeerEvent::ClientConnected(1)]
        );
    }
}
