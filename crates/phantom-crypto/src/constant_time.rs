//! Constant-time comparison.
//!
//! The handshake HMAC check must not leak how many bytes matched; all
//! comparisons of secret-derived data go through this module.

use subtle::ConstantTimeEq;

use crate::HMAC_SHA1_SIZE;

/// Constant-time comparison of byte slices.
///
/// Returns `true` if slices are equal. Execution time depends only on
/// slice length, not content.
#[must_use]
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Timing-safe HMAC-SHA1 tag comparison.
#[must_use]
#[inline(never)]
pub fn verify_hmac(expected: &[u8; HMAC_SHA1_SIZE], got: &[u8]) -> bool {
    ct_eq(expected, got)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ct_eq_same() {
        assert!(ct_eq(&[1u8; 20], &[1u8; 20]));
    }

    #[test]
    fn test_ct_eq_different() {
        assert!(!ct_eq(&[1u8; 20], &[2u8; 20]));
    }

    #[test]
    fn test_ct_eq_length_mismatch() {
        assert!(!ct_eq(&[1u8; 20], &[1u8; 19]));
    }

    #[test]
    fn test_verify_hmac() {
        let tag = [0x42u8; 20];
        assert!(verify_hmac(&tag, &[0x42u8; 20]));
        assert!(!verify_hmac(&tag, &[0x43u8; 20]));
        assert!(!verify_hmac(&tag, &[]));
    }
}
