//! # PHANTOM Core
//!
//! Core virtual-device transport stack for the PHANTOM load-generation
//! harness. A [`device::DeviceSession`] impersonates one physical IoT
//! device against a Particle-style local cloud server: it performs the
//! RSA session-key handshake, maintains the framed AES-128-CBC-chained
//! byte pipeline, and drives the CoAP message layer.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        DeviceSession                             │
//! │   (handshake, CoAP dispatch, ACK correlation, ping, reconnect)  │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                        CipherChain                               │
//! │   (AES-128-CBC per frame, chained IV per direction)             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                        FrameCodec                                │
//! │   (2-byte big-endian length prefix over the TCP stream)         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                 ThrottleFilter → TCP socket                      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Inbound bytes flow socket → throttle → framing → cipher → CoAP
//! dispatch; outbound messages flow CoAP build → cipher → throttle →
//! framing → socket. Ordering within each direction is strict; the
//! chained IV discipline depends on it.
//!
//! A [`device::DeviceFleet`] holds many sessions and is the surface an
//! orchestrator drives.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod chain;
pub mod coap;
pub mod device;
pub mod error;
pub mod framing;

pub use chain::CipherState;
pub use coap::{CoapCode, CoapPacket, CoapType};
pub use device::{DeviceFleet, DeviceIdentity, DeviceSession, DeviceState, SessionConfig};
pub use error::{CoapError, FrameError, SessionError};
pub use framing::{encode_frame, FrameDecoder};

/// Handshake nonce size sent by the server on TCP accept
pub const NONCE_SIZE: usize = 40;

/// Device id size on the wire
pub const DEVICE_ID_SIZE: usize = 12;

/// Size of the session-key ciphertext in the handshake response
pub const SESSION_KEY_CIPHER_SIZE: usize = 128;

/// Size of the signed-HMAC block in the handshake response
pub const SIGNED_HMAC_SIZE: usize = 128;

/// Total handshake response size read from the socket
pub const HANDSHAKE_RESPONSE_SIZE: usize = SESSION_KEY_CIPHER_SIZE + SIGNED_HMAC_SIZE;

/// Maximum frame payload length representable by the 2-byte prefix
pub const MAX_FRAME_LEN: usize = 65535;
