//! Session configuration.

use std::time::Duration;

/// Default cloud server port
pub const DEFAULT_PORT: u16 = 5683;

/// Timing and identity parameters for one device session.
///
/// Defaults match the reference protocol; tests shrink the intervals to
/// keep scenarios fast.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server `host:port`; schemes like `tcp://` are stripped on entry
    pub server_addr: String,

    /// Artificial delay applied to every chunk in each direction
    pub network_delay: Duration,

    /// TCP connect timeout
    pub connect_timeout: Duration,

    /// Idle window with no server bytes before the connection is torn down
    pub idle_timeout: Duration,

    /// Window for the server's Hello after handshake completion
    pub hello_timeout: Duration,

    /// Keepalive ping interval while Ready
    pub ping_interval: Duration,

    /// Wait for an ACK before logging a correlation warning
    pub ack_timeout: Duration,

    /// Pause before reconnecting after a lost connection
    pub reconnect_delay: Duration,

    /// Event name used by webhook sends
    pub webhook_event: String,

    /// Product id reported in the Hello payload
    pub product_id: u16,

    /// Firmware version reported in the Hello payload
    pub firmware_version: u16,

    /// Platform id reported in the Hello and Describe payloads
    pub platform_id: u16,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_addr: format!("127.0.0.1:{DEFAULT_PORT}"),
            network_delay: Duration::ZERO,
            connect_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(31),
            hello_timeout: Duration::from_secs(3),
            ping_interval: Duration::from_secs(10),
            ack_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_secs(15),
            webhook_event: "phantom/webhook".to_string(),
            product_id: 0,
            firmware_version: 1,
            platform_id: 0,
        }
    }
}

impl SessionConfig {
    /// Normalize a caller-supplied server address: strip any URL scheme
    /// and append the default port when none is given.
    #[must_use]
    pub fn normalize_addr(addr: &str) -> String {
        let stripped = addr
            .split_once("://")
            .map_or(addr, |(_, rest)| rest)
            .trim_end_matches('/');

        if stripped.contains(':') {
            stripped.to_string()
        } else {
            format!("{stripped}:{DEFAULT_PORT}")
        }
    }
}
