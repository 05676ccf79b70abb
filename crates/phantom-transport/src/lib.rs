//! # PHANTOM Transport
//!
//! TCP transport layer for PHANTOM device sessions.
//!
//! This crate provides:
//! - Connecting TCP sockets with timeouts and per-connection statistics
//! - The throttle filter that injects artificial per-direction delay
//!   between the socket and the framing layer
//!
//! Sessions own their socket halves directly; this crate deliberately
//! stays thin. Reliability, ordering, and back-pressure are the OS
//! socket's business: PHANTOM is a stress tool and drops writes the
//! socket will not take.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod tcp;
pub mod throttle;

pub use tcp::{connect, TransportStats, TransportStatsSnapshot};
pub use throttle::Throttle;

use thiserror::Error;

/// Transport layer errors
#[derive(Debug, Error)]
pub enum TransportError {
    /// TCP connect failed
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// TCP connect did not complete within the configured timeout
    #[error("connect timed out")]
    ConnectTimeout,
}

/// Result type for transport operations
pub type TransportResult<T> = std::result::Result<T, TransportError>;
