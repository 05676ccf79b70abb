//! Cryptographic error types.

use thiserror::Error;

/// Cryptographic errors
///
/// Every variant is fatal to the session that observes it; the session
/// layer responds by disconnecting and scheduling a reconnect.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// RSA key generation failed
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// Malformed PEM or DER key material
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// RSA encryption failed
    #[error("RSA encryption failed")]
    EncryptionFailed,

    /// RSA decryption failed (wrong key or corrupt ciphertext)
    #[error("RSA decryption failed")]
    DecryptionFailed,

    /// Ciphertext length is not a whole number of RSA blocks
    #[error("ciphertext length {len} is not a multiple of the {block} byte block size")]
    InvalidCiphertextLength {
        /// Observed ciphertext length
        len: usize,
        /// RSA block size for the key in use
        block: usize,
    },

    /// Recovered signature block has malformed PKCS#1 padding
    #[error("malformed signature block")]
    MalformedSignature,

    /// CBC padding invalid on decrypt
    #[error("invalid padding")]
    InvalidPadding,

    /// Session secret blob has the wrong length
    #[error("invalid session secret length: expected {expected}, got {actual}")]
    InvalidSecretLength {
        /// Expected length
        expected: usize,
        /// Actual length
        actual: usize,
    },

    /// Random number generation failed
    #[error("random number generation failed")]
    RandomFailed,
}
