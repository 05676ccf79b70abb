//! Error types for the PHANTOM core protocol.

use thiserror::Error;

/// Frame codec errors
#[derive(Debug, Error)]
pub enum FrameError {
    /// Message too long for the 2-byte length prefix
    #[error("message length {len} exceeds the 65535 byte frame limit")]
    Oversized {
        /// Offending message length
        len: usize,
    },
}

/// CoAP codec errors
///
/// Malformed inbound packets are logged and ignored by the session;
/// they never tear a connection down.
#[derive(Debug, Error)]
pub enum CoapError {
    /// Buffer shorter than the 4-byte CoAP header
    #[error("packet too short: {0} bytes")]
    TooShort(usize),

    /// Version bits were not 1
    #[error("unsupported CoAP version {0}")]
    InvalidVersion(u8),

    /// Token length nibble above 8
    #[error("invalid token length {0}")]
    InvalidTokenLength(u8),

    /// Option header used a reserved nibble or ran past the buffer
    #[error("malformed option at offset {0}")]
    MalformedOption(usize),

    /// Packet ended inside a token, option, or after a payload marker
    #[error("truncated packet")]
    Truncated,
}

/// Session-level errors
///
/// [`SessionError::is_fatal`] separates errors that tear the connection
/// down (crypto, transport, handshake) from those the dispatcher logs
/// and ignores.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Cryptographic failure (RSA, CBC padding, secret parsing)
    #[error("crypto error: {0}")]
    Crypto(#[from] phantom_crypto::CryptoError),

    /// Transport failure (connect, idle timeout)
    #[error("transport error: {0}")]
    Transport(#[from] phantom_transport::TransportError),

    /// Socket I/O failure mid-connection
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Server's signed HMAC did not match the locally computed value
    #[error("handshake rejected: session-key HMAC mismatch")]
    HandshakeRejected,

    /// Peer closed the connection
    #[error("connection closed by peer")]
    ConnectionClosed,

    /// No data from the server within the idle window
    #[error("connection idle timeout")]
    IdleTimeout,

    /// Server never answered the device Hello
    #[error("no hello response within the handshake window")]
    HelloTimeout,

    /// Outbound frame failed to encode
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Malformed inbound CoAP packet
    #[error("coap error: {0}")]
    Coap(#[from] CoapError),

    /// Operation attempted in the wrong session state
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// Session was torn down by user disconnect
    #[error("session cancelled")]
    Cancelled,
}

impl SessionError {
    /// Whether this error tears the connection down and triggers the
    /// reconnect schedule.
    ///
    /// Protocol-level noise (malformed CoAP, unknown URIs) is not fatal;
    /// everything touching crypto integrity or the socket is.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SessionError::Coap(_))
    }
}
