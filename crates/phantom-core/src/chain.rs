//! Chained-IV AES-128-CBC cipher state.
//!
//! Each pipeline direction owns one [`CipherState`]. After every frame
//! the IV becomes the last 16 bytes of that direction's *ciphertext*:
//! the output for the encrypt direction, the input for the decrypt
//! direction. Both peers can therefore recover every subsequent IV
//! without extra state, as long as no frame is processed out of order.
//!
//! The chain is never reset within a connection; a reconnect builds
//! fresh states from the new session secrets.

use phantom_crypto::aes_cbc::{aes128_cbc_decrypt, aes128_cbc_encrypt};
use phantom_crypto::{CryptoError, AES_BLOCK_SIZE, AES_KEY_SIZE};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Cipher state for one direction of one connection.
///
/// Updated only by the single task that processes its direction, so no
/// locking is needed within a session.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct CipherState {
    key: [u8; AES_KEY_SIZE],
    iv: [u8; AES_BLOCK_SIZE],
}

impl CipherState {
    /// Create a direction state from the session secrets.
    #[must_use]
    pub fn new(key: [u8; AES_KEY_SIZE], iv: [u8; AES_BLOCK_SIZE]) -> Self {
        Self { key, iv }
    }

    /// Encrypt one frame and advance the chain.
    ///
    /// The IV becomes the final block of the returned ciphertext.
    pub fn encrypt(&mut self, frame: &[u8]) -> Vec<u8> {
        let ciphertext = aes128_cbc_encrypt(&self.key, &self.iv, frame);
        // PKCS#7 guarantees at least one block of output
        self.iv
            .copy_from_slice(&ciphertext[ciphertext.len() - AES_BLOCK_SIZE..]);
        ciphertext
    }

    /// Decrypt one frame and advance the chain.
    ///
    /// The IV becomes the final block of the *input* ciphertext. The
    /// chain only advances on success; a padding failure is fatal to the
    /// session and the state is discarded with it.
    pub fn decrypt(&mut self, frame: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let plaintext = aes128_cbc_decrypt(&self.key, &self.iv, frame)?;
        self.iv
            .copy_from_slice(&frame[frame.len() - AES_BLOCK_SIZE..]);
        Ok(plaintext)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; 16] = [0x0F; 16];
    const IV0: [u8; 16] = [0xF0; 16];

    #[test]
    fn test_chain_roundtrip() {
        let mut enc = CipherState::new(KEY, IV0);
        let mut dec = CipherState::new(KEY, IV0);

        let messages: [&[u8]; 3] = [b"first message", b"second", b"third frame here"];
        for msg in messages {
            let ct = enc.encrypt(msg);
            let pt = dec.decrypt(&ct).unwrap();
            assert_eq!(pt, msg);
        }
    }

    #[test]
    fn test_second_frame_uses_first_ciphertext_tail() {
        let mut enc = CipherState::new(KEY, IV0);
        let c1 = enc.encrypt(b"message one");
        let c2 = enc.encrypt(b"message two");

        // Encrypting the second message standalone with last16(c1) as IV
        // must reproduce c2.
        let mut iv1 = [0u8; 16];
        iv1.copy_from_slice(&c1[c1.len() - 16..]);
        let standalone = aes128_cbc_encrypt(&KEY, &iv1, b"message two");
        assert_eq!(c2, standalone);
    }

    #[test]
    fn test_directions_evolve_independently() {
        let mut send = CipherState::new(KEY, IV0);
        let mut recv = CipherState::new(KEY, IV0);

        // Peer encrypts two frames; we decrypt them while also sending
        // our own. Interleaving across directions must not matter.
        let mut peer = CipherState::new(KEY, IV0);
        let c1 = peer.encrypt(b"inbound one");
        let _ = send.encrypt(b"outbound in between");
        let c2 = peer.encrypt(b"inbound two");

        assert_eq!(recv.decrypt(&c1).unwrap(), b"inbound one");
        assert_eq!(recv.decrypt(&c2).unwrap(), b"inbound two");
    }

    #[test]
    fn test_out_of_order_decrypt_fails_or_garbles() {
        let mut enc = CipherState::new(KEY, IV0);
        let _c1 = enc.encrypt(b"frame one");
        let c2 = enc.encrypt(b"frame two");

        // Skipping c1 breaks the chain for c2
        let mut dec = CipherState::new(KEY, IV0);
        match dec.decrypt(&c2) {
            Ok(pt) => assert_ne!(pt, b"frame two"),
            Err(CryptoError::InvalidPadding) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    #[test]
    fn test_failed_decrypt_leaves_chain_unadvanced() {
        let mut enc = CipherState::new(KEY, IV0);
        let c1 = enc.encrypt(b"good frame");

        let mut dec = CipherState::new(KEY, IV0);
        // Unaligned input fails before the chain advances
        assert!(dec.decrypt(&c1[..15]).is_err());
        assert_eq!(dec.decrypt(&c1).unwrap(), b"good frame");
    }
}
