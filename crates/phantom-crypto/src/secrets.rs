//! Ephemeral per-connection session secrets.
//!
//! The server mints 40 bytes of session material and delivers them
//! RSA-encrypted in the second handshake step:
//!
//! | Bytes | Contents |
//! |-------|----------|
//! | 0..16 | AES-128 key |
//! | 16..32 | initial IV for both directions |
//! | 32..34 | initial CoAP message id (big-endian) |
//! | 34..40 | CoAP token prefix |
//!
//! Secrets live for exactly one connection and are wiped on drop.

use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;
use crate::{AES_BLOCK_SIZE, AES_KEY_SIZE, SESSION_SECRET_SIZE};

/// Length of the CoAP token prefix carried in the secret blob
pub const TOKEN_PREFIX_SIZE: usize = 6;

/// Parsed 40-byte session secret blob.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct SessionSecrets {
    aes_key: [u8; AES_KEY_SIZE],
    initial_iv: [u8; AES_BLOCK_SIZE],
    initial_message_id: u16,
    token_prefix: [u8; TOKEN_PREFIX_SIZE],
}

impl SessionSecrets {
    /// Parse the decrypted session-key blob.
    ///
    /// The blob must be exactly 40 bytes. Anything beyond the fields
    /// above is undefined by the protocol and ignored.
    pub fn from_bytes(buf: &[u8]) -> Result<Self, CryptoError> {
        if buf.len() != SESSION_SECRET_SIZE {
            return Err(CryptoError::InvalidSecretLength {
                expected: SESSION_SECRET_SIZE,
                actual: buf.len(),
            });
        }

        let mut aes_key = [0u8; AES_KEY_SIZE];
        aes_key.copy_from_slice(&buf[0..16]);
        let mut initial_iv = [0u8; AES_BLOCK_SIZE];
        initial_iv.copy_from_slice(&buf[16..32]);
        let initial_message_id = u16::from_be_bytes([buf[32], buf[33]]);
        let mut token_prefix = [0u8; TOKEN_PREFIX_SIZE];
        token_prefix.copy_from_slice(&buf[34..40]);

        Ok(Self {
            aes_key,
            initial_iv,
            initial_message_id,
            token_prefix,
        })
    }

    /// AES-128 key for both cipher directions
    #[must_use]
    pub fn aes_key(&self) -> &[u8; AES_KEY_SIZE] {
        &self.aes_key
    }

    /// Initial IV shared by both cipher directions
    #[must_use]
    pub fn initial_iv(&self) -> &[u8; AES_BLOCK_SIZE] {
        &self.initial_iv
    }

    /// Starting value for the outbound CoAP message-id counter
    #[must_use]
    pub fn initial_message_id(&self) -> u16 {
        self.initial_message_id
    }

    /// Token prefix for device-initiated confirmable requests
    #[must_use]
    pub fn token_prefix(&self) -> &[u8; TOKEN_PREFIX_SIZE] {
        &self.token_prefix
    }
}
