//! Client configuration: defaults, builder setters and environment overrides

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;

use tracing::debug;

use crate::error::ConfigError;

pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:3000";
pub const DEFAULT_PEER_PORT: u16 = 7777;
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_millis(1000);
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(16);

const ENV_URL: &str = "ARENA_SIGNAL_URL";
const ENV_BIND: &str = "ARENA_SIGNAL_BIND";
const ENV_PEER_PORT: &str = "ARENA_SIGNAL_PEER_PORT";
const ENV_ADVERTISE: &str = "ARENA_SIGNAL_ADVERTISE";

#[derive(Debug, Clone)]
pub struct Config {
    /// Matchmaking server, `ws://host:port`
    pub server_url: String,
    /// Address the peer transport binds to when hosting
    pub bind_address: Ipv4Addr,
    /// Port the peer transport listens on when hosting
    pub peer_port: u16,
    /// Address sent to the server in create-room / join-room.
    /// `None` means discover the local address.
    pub advertised_address: Option<Ipv4Addr>,
    pub max_reconnect_attempts: u32,
    pub reconnect_base_delay: Duration,
    /// Upper bound on waiting for the server to acknowledge a close frame
    pub close_timeout: Duration,
    /// Upper bound on the TCP connect plus WebSocket upgrade
    pub connect_timeout: Duration,
    pub tick_interval: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            bind_address: Ipv4Addr::UNSPECIFIED,
            peer_port: DEFAULT_PEER_PORT,
            advertised_address: None,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }
}

impl Config {
    /// Defaults overridden by `ARENA_SIGNAL_*` environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().merge_vars(|key| std::env::var(key).ok())
    }

    fn merge_vars(
        mut self,
        var: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(url) = var(ENV_URL) {
            self.server_url = url;
        }
        if let Some(bind) = var(ENV_BIND) {
            self.bind_address = parse_var(ENV_BIND, bind)?;
        }
        if let Some(port) = var(ENV_PEER_PORT) {
            self.peer_port = parse_var(ENV_PEER_PORT, port)?;
        }
        if let Some(addr) = var(ENV_ADVERTISE) {
            self.advertised_address = Some(parse_var(ENV_ADVERTISE, addr)?);
        }
        Ok(self)
    }

    #[must_use]
    pub fn with_server_url(mut self, url: impl Into<String>) -> Self {
        self.server_url = url.into();
        self
    }

    #[must_use]
    pub fn with_peer_port(mut self, port: u16) -> Self {
        self.peer_port = port;
        self
    }

    #[must_use]
    pub fn with_advertised_address(mut self, addr: Ipv4Addr) -> Self {
        self.advertised_address = Some(addr);
        self
    }

    #[must_use]
    pub fn with_reconnect(mut self, max_attempts: u32, base_delay: Duration) -> Self {
        self.max_reconnect_attempts = max_attempts;
        self.reconnect_base_delay = base_delay;
        self
    }

    #[must_use]
    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// The configured advertised address, or the discovered local one
    pub fn local_address(&self) -> Ipv4Addr {
        self.advertised_address.unwrap_or_else(discover_local_ipv4)
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue { key, value })
}

/// Find the IPv4 address of the outbound interface.
///
/// Connecting a UDP socket only selects a route, no packet is sent.
/// Falls back to loopback when there is no route.
pub fn discover_local_ipv4() -> Ipv4Addr {
    let probe = || -> std::io::Result<SocketAddr> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
        socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9))?;
        socket.local_addr()
    };

    match probe() {
        Ok(SocketAddr::V4(v4)) if !v4.ip().is_unspecified() => *v4.ip(),
        Ok(other) => {
            debug!("No usable IPv4 route (got {}), using loopback", other);
            Ipv4Addr::LOCALHOST
        }
        Err(e) => {
            debug!("Local address discovery failed: {}", e);
            Ipv4Addr::LOCALHOST
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> =
            pairs.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_behavior() {
        let config = Config::default();
        assert_eq!(config.server_url, "ws://127.0.0.1:3000");
        assert_eq!(config.peer_port, 7777);
        assert_eq!(config.max_reconnect_attempts, 5);
        assert_eq!(config.reconnect_base_delay, Duration::from_millis(1000));
        assert_eq!(config.bind_address, Ipv4Addr::UNSPECIFIED);
    }

    #[test]
    fn env_overrides_apply() {
        let config = Config::default()
            .merge_vars(vars(&[
                (ENV_URL, "ws://10.0.0.2:4000"),
                (ENV_PEER_PORT, "9000"),
                (ENV_ADVERTISE, "10.0.0.5"),
            ]))
            .unwrap();
        assert_eq!(config.server_url, "ws://10.0.0.2:4000");
        assert_eq!(config.peer_port, 9000);
        assert_eq!(config.local_address(), Ipv4Addr::new(10, 0, 0, 5));
    }

    #[test]
    fn invalid_port_is_rejected() {
        let err = Config::default()
            .merge_vars(vars(&[(ENV_PEER_PORT, "seventy")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_PEER_PORT));
    }

    #[test]
    fn builder_setters() {
        let config = Config::default()
            .with_server_url("ws://example.test:1")
            .with_reconnect(3, Duration::from_millis(10))
            .with_connect_timeout(Duration::from_secs(3));
        assert_eq!(config.server_url, "ws://example.test:1");
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.max_reconnect_attempts, 3);
        assert_eq!(config.reconnect_base_delay, Duration::from_millis(10));
    }
}
