//! # PHANTOM Crypto
//!
//! Cryptographic primitives for the PHANTOM virtual-device protocol.
//!
//! This crate provides:
//! - RSA-PKCS#1 v1.5 keypairs (1024-bit device keys, server public key)
//! - Chunked RSA encryption for oversize handshake payloads
//! - AES-128-CBC one-shot encryption with PKCS#7 padding
//! - HMAC-SHA1 session-key authentication
//! - Secure random number generation
//! - Constant-time comparison
//!
//! ## Cryptographic Suite
//!
//! | Function | Algorithm | Notes |
//! |----------|-----------|-------|
//! | Device keys | RSA-1024, e=65537 | PKCS#1 private PEM on disk |
//! | Server key | RSA public | PKCS#8 PEM, shared process-wide |
//! | Transport cipher | AES-128-CBC | chained IV, one cipher per frame |
//! | Handshake MAC | HMAC-SHA1 | over the session-key ciphertext |
//! | Padding | PKCS#1 v1.5 / PKCS#7 | asymmetric / symmetric |
//!
//! The suite is fixed by the wire protocol this crate speaks; there is no
//! negotiation.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod aes_cbc;
pub mod constant_time;
pub mod error;
pub mod keys;
pub mod mac;
pub mod random;
pub mod secrets;

pub use error::CryptoError;
pub use keys::{DeviceKeypair, ServerPublicKey};
pub use secrets::SessionSecrets;

/// RSA modulus size for device keys, in bits
pub const DEVICE_KEY_BITS: usize = 1024;

/// RSA modulus size for device keys, in bytes
pub const DEVICE_KEY_SIZE: usize = DEVICE_KEY_BITS / 8;

/// PKCS#1 v1.5 padding overhead per RSA block
pub const RSA_PKCS1_OVERHEAD: usize = 11;

/// AES key size used by the transport cipher
pub const AES_KEY_SIZE: usize = 16;

/// AES block (and IV) size
pub const AES_BLOCK_SIZE: usize = 16;

/// HMAC-SHA1 output size
pub const HMAC_SHA1_SIZE: usize = 20;

/// Length of the session-secret blob minted by the server
pub const SESSION_SECRET_SIZE: usize = 40;
