//! Secure random number generation.
//!
//! All randomness comes from the operating system CSPRNG.

use crate::error::CryptoError;

/// Fill a buffer with random bytes from the OS CSPRNG
pub fn fill_random(buf: &mut [u8]) -> Result<(), CryptoError> {
    getrandom::getrandom(buf).map_err(|_| CryptoError::RandomFailed)
}

/// Generate `n` random bytes
pub fn random_bytes(n: usize) -> Result<Vec<u8>, CryptoError> {
    let mut buf = vec![0u8; n];
    fill_random(&mut buf)?;
    Ok(buf)
}

/// Generate a random u32
pub fn random_u32() -> Result<u32, CryptoError> {
    let mut buf = [0u8; 4];
    fill_random(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}
