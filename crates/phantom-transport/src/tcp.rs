//! TCP connection setup and statistics.
//!
//! A device session connects out to the cloud server, splits the stream
//! into owned halves, and accounts its traffic against a shared
//! [`TransportStats`] that survives reconnects.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::net::TcpStream;

use crate::{TransportError, TransportResult};

/// Connect to `addr` (a `host:port` string) with a timeout.
///
/// Nagle is disabled: handshake messages and CoAP frames are small and
/// latency-sensitive.
pub async fn connect(addr: &str, timeout: Duration) -> TransportResult<TcpStream> {
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| TransportError::ConnectTimeout)?
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

    stream
        .set_nodelay(true)
        .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;

    tracing::debug!(peer = %addr, "tcp connected");
    Ok(stream)
}

/// Per-session traffic counters.
///
/// Shared across reconnects of the same session; all counters are
/// monotonic and lock-free.
#[derive(Debug, Default)]
pub struct TransportStats {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    messages_sent: AtomicU64,
    messages_received: AtomicU64,
    connects: AtomicU64,
    send_errors: AtomicU64,
}

impl TransportStats {
    /// Create zeroed counters
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an outbound message of `bytes` wire bytes
    pub fn record_send(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.messages_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an inbound chunk of `bytes` wire bytes
    pub fn record_recv(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful TCP connect
    pub fn record_connect(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a dropped or failed write
    pub fn record_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a consistent-enough snapshot for reporting
    #[must_use]
    pub fn snapshot(&self) -> TransportStatsSnapshot {
        TransportStatsSnapshot {
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            connects: self.connects.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`TransportStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStatsSnapshot {
    /// Total wire bytes written
    pub bytes_sent: u64,
    /// Total wire bytes read
    pub bytes_received: u64,
    /// Outbound messages submitted to the socket
    pub messages_sent: u64,
    /// Inbound chunks read from the socket
    pub messages_received: u64,
    /// Successful TCP connects (1 + reconnects)
    pub connects: u64,
    /// Writes that failed or were dropped
    pub send_errors: u64,
}
