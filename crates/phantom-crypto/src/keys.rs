//! RSA keypair management and PKCS#1 v1.5 operations.
//!
//! Two key roles exist on the wire:
//! - **Device keys**: 1024-bit keypairs, one per simulated device. The
//!   private key decrypts the server-minted session secret; the public key
//!   travels inside the first handshake message as PKCS#8 DER.
//! - **Server key**: the cloud's RSA public key, loaded once from PKCS#8
//!   PEM and shared by every session. It encrypts the first handshake
//!   message and recovers the server-signed HMAC.
//!
//! Plaintexts longer than one RSA block are chunked: each chunk of at most
//! `modulus - 11` bytes is encrypted separately and the ciphertext blocks
//! are concatenated. The peer decrypts block-by-block and concatenates the
//! plaintexts. The 214-byte handshake payload therefore occupies 256 wire
//! bytes under either a 1024-bit or a 2048-bit server key.

use rsa::hazmat::{rsa_decrypt_and_check, rsa_encrypt};
use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs8::{DecodePublicKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use rsa::{BigUint, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::{DEVICE_KEY_BITS, RSA_PKCS1_OVERHEAD};

/// RSA keypair for a simulated device.
///
/// Generated once per device identity and persisted externally as a
/// PKCS#1 private PEM so the same identity can reconnect across restarts.
#[derive(Clone)]
pub struct DeviceKeypair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl DeviceKeypair {
    /// Generate a fresh 1024-bit keypair with public exponent 65537.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut rng = rand::rngs::OsRng;
        let private = RsaPrivateKey::new(&mut rng, DEVICE_KEY_BITS)
            .map_err(|e| CryptoError::KeyGeneration(e.to_string()))?;
        let public = private.to_public_key();
        Ok(Self { private, public })
    }

    /// Load a keypair from a PKCS#1 private PEM document.
    pub fn from_pkcs1_pem(pem: &str) -> Result<Self, CryptoError> {
        let private = RsaPrivateKey::from_pkcs1_pem(pem)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let public = private.to_public_key();
        Ok(Self { private, public })
    }

    /// Export the private key as a PKCS#1 PEM document.
    pub fn to_pkcs1_pem(&self) -> Result<Zeroizing<String>, CryptoError> {
        self.private
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    /// Export the public key as a PKCS#8 (SPKI) PEM document.
    pub fn public_key_pem(&self) -> Result<String, CryptoError> {
        self.public
            .to_public_key_pem(LineEnding::LF)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))
    }

    /// Export the public key as raw PKCS#8 (SPKI) DER bytes.
    ///
    /// This is the form carried inside the first handshake message.
    pub fn public_key_der(&self) -> Result<Vec<u8>, CryptoError> {
        let doc = self
            .public
            .to_public_key_der()
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(doc.as_bytes().to_vec())
    }

    /// RSA block size for this key, in bytes.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.public.size()
    }

    /// Decrypt PKCS#1 v1.5 ciphertext produced for this key.
    ///
    /// The input must be a whole number of RSA blocks; each block is
    /// decrypted independently and the plaintexts are concatenated.
    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let block = self.block_size();
        if ciphertext.is_empty() || ciphertext.len() % block != 0 {
            return Err(CryptoError::InvalidCiphertextLength {
                len: ciphertext.len(),
                block,
            });
        }

        let mut plaintext = Vec::new();
        for chunk in ciphertext.chunks(block) {
            let part = self
                .private
                .decrypt(Pkcs1v15Encrypt, chunk)
                .map_err(|_| CryptoError::DecryptionFailed)?;
            plaintext.extend_from_slice(&part);
        }
        Ok(plaintext)
    }

    /// Encrypt a single block with the *private* key (recoverable signature).
    ///
    /// Produces a PKCS#1 type-1 padded block raised to the private
    /// exponent; the holder of the public key recovers the payload with
    /// [`ServerPublicKey::recover_signed`]. This is the server side of the
    /// handshake's signed-HMAC step and is exercised by the stub servers
    /// the test suite runs.
    pub fn private_encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let block = self.block_size();
        if data.len() + RSA_PKCS1_OVERHEAD > block {
            return Err(CryptoError::EncryptionFailed);
        }

        // EM = 0x00 || 0x01 || 0xFF.. || 0x00 || data
        let mut em = vec![0xFFu8; block];
        em[0] = 0x00;
        em[1] = 0x01;
        let sep = block - data.len() - 1;
        em[sep] = 0x00;
        em[sep + 1..].copy_from_slice(data);

        let m = BigUint::from_bytes_be(&em);
        let mut rng = rand::rngs::OsRng;
        let c = rsa_decrypt_and_check(&self.private, Some(&mut rng), &m)
            .map_err(|_| CryptoError::EncryptionFailed)?;
        Ok(left_pad(&c.to_bytes_be(), block))
    }
}

/// The cloud server's RSA public key.
///
/// Loaded once at startup from a PKCS#8 PEM file and passed to every
/// session as a shared immutable handle.
#[derive(Clone)]
pub struct ServerPublicKey {
    inner: RsaPublicKey,
}

impl ServerPublicKey {
    /// Load from a PKCS#8 (SPKI) PEM document.
    pub fn from_public_key_pem(pem: &str) -> Result<Self, CryptoError> {
        let inner =
            RsaPublicKey::from_public_key_pem(pem).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Load from raw PKCS#8 (SPKI) DER bytes, the form device public
    /// keys travel in during the handshake.
    pub fn from_public_key_der(der: &[u8]) -> Result<Self, CryptoError> {
        let inner =
            RsaPublicKey::from_public_key_der(der).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        Ok(Self { inner })
    }

    /// RSA block size for this key, in bytes.
    #[must_use]
    pub fn block_size(&self) -> usize {
        self.inner.size()
    }

    /// Encrypt with PKCS#1 v1.5, chunking oversize plaintexts.
    ///
    /// Chunks of at most `block_size - 11` bytes are encrypted separately
    /// and the ciphertext blocks concatenated.
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let max_chunk = self.block_size() - RSA_PKCS1_OVERHEAD;
        let mut rng = rand::rngs::OsRng;
        let mut ciphertext = Vec::new();
        for chunk in data.chunks(max_chunk) {
            let block = self
                .inner
                .encrypt(&mut rng, Pkcs1v15Encrypt, chunk)
                .map_err(|_| CryptoError::EncryptionFailed)?;
            ciphertext.extend_from_slice(&block);
        }
        Ok(ciphertext)
    }

    /// Recover the payload of a block encrypted with the server's private key.
    ///
    /// Performs the raw RSA public operation and strips PKCS#1 type-1
    /// (or type-2) padding. Used to verify the server-signed HMAC during
    /// the handshake: the result must equal the locally computed MAC.
    pub fn recover_signed(&self, block: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let k = self.block_size();
        if block.len() != k {
            return Err(CryptoError::InvalidCiphertextLength {
                len: block.len(),
                block: k,
            });
        }

        let c = BigUint::from_bytes_be(block);
        let m = rsa_encrypt(&self.inner, &c).map_err(|_| CryptoError::DecryptionFailed)?;
        strip_pkcs1_padding(&left_pad(&m.to_bytes_be(), k))
    }
}

/// Left-pad big-endian bytes with zeros to a fixed width.
fn left_pad(bytes: &[u8], width: usize) -> Vec<u8> {
    let mut out = vec![0u8; width.saturating_sub(bytes.len())];
    out.extend_from_slice(bytes);
    out
}

/// Strip PKCS#1 v1.5 padding from an encryption block.
///
/// Accepts both block type 1 (0xFF fill, used for signatures) and block
/// type 2 (random fill, used for encryption). The payload follows the
/// first 0x00 separator after the fill; at least 8 fill bytes are
/// required.
fn strip_pkcs1_padding(em: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if em.len() < 11 || em[0] != 0x00 || (em[1] != 0x01 && em[1] != 0x02) {
        return Err(CryptoError::MalformedSignature);
    }

    let sep = em[2..]
        .iter()
        .position(|&b| b == 0x00)
        .ok_or(CryptoError::MalformedSignature)?;
    if sep < 8 {
        return Err(CryptoError::MalformedSignature);
    }
    Ok(em[2 + sep + 1..].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_from(keypair: &DeviceKeypair) -> ServerPublicKey {
        let pem = keypair.public_key_pem().unwrap();
        ServerPublicKey::from_public_key_pem(&pem).unwrap()
    }

    #[test]
    fn test_keypair_pem_roundtrip() {
        let keypair = DeviceKeypair::generate().unwrap();
        let pem = keypair.to_pkcs1_pem().unwrap();
        let restored = DeviceKeypair::from_pkcs1_pem(&pem).unwrap();

        assert_eq!(keypair.public_key_der().unwrap(), restored.public_key_der().unwrap());
    }

    #[test]
    fn test_public_key_exports() {
        let keypair = DeviceKeypair::generate().unwrap();

        let pem = keypair.public_key_pem().unwrap();
        assert!(pem.starts_with("-----BEGIN PUBLIC KEY-----"));

        // SPKI DER for a 1024-bit key is around 160 bytes
        let der = keypair.public_key_der().unwrap();
        assert!(der.len() > 120 && der.len() < 200);
    }

    #[test]
    fn test_encrypt_decrypt_single_block() {
        let keypair = DeviceKeypair::generate().unwrap();
        let public = server_from(&keypair);

        let plaintext = b"forty bytes of session secret material!!";
        assert_eq!(plaintext.len(), 40);

        let ciphertext = public.encrypt(plaintext).unwrap();
        assert_eq!(ciphertext.len(), 128);

        let recovered = keypair.decrypt(&ciphertext).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn test_encrypt_decrypt_chunked() {
        let keypair = DeviceKeypair::generate().unwrap();
        let public = server_from(&keypair);

        // Handshake-sized payload: 40 + 12 + ~162 = ~214 bytes, two blocks
        // under a 1024-bit key.
        let plaintext: Vec<u8> = (0u16..214).map(|i| (i & 0xFF) as u8).collect();
        let ciphertext = public.encrypt(&plaintext).unwrap();
        assert_eq!(ciphertext.len(), 256);

        let recovered = keypair.decrypt(&ciphertext).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn test_decrypt_rejects_partial_block() {
        let keypair = DeviceKeypair::generate().unwrap();
        let result = keypair.decrypt(&[0u8; 100]);
        assert!(matches!(
            result,
            Err(CryptoError::InvalidCiphertextLength { .. })
        ));
    }

    #[test]
    fn test_der_pem_loaders_agree() {
        let keypair = DeviceKeypair::generate().unwrap();
        let from_pem = server_from(&keypair);
        let from_der =
            ServerPublicKey::from_public_key_der(&keypair.public_key_der().unwrap()).unwrap();

        // Both loaders must encrypt to ciphertext the same key decrypts
        let ct = from_der.encrypt(b"cross-check").unwrap();
        assert_eq!(keypair.decrypt(&ct).unwrap(), b"cross-check");
        assert_eq!(from_pem.block_size(), from_der.block_size());
    }

    #[test]
    fn test_signed_recovery_roundtrip() {
        let keypair = DeviceKeypair::generate().unwrap();
        let public = server_from(&keypair);

        let digest = [0x5Au8; 20];
        let signed = keypair.private_encrypt(&digest).unwrap();
        assert_eq!(signed.len(), 128);

        let recovered = public.recover_signed(&signed).unwrap();
        assert_eq!(recovered, digest);
    }

    #[test]
    fn test_recover_signed_rejects_garbage() {
        let keypair = DeviceKeypair::generate().unwrap();
        let public = server_from(&keypair);

        let garbage = [0xA7u8; 128];
        assert!(public.recover_signed(&garbage).is_err());
    }

    #[test]
    fn test_strip_padding_type_two() {
        let mut em = vec![0x00, 0x02];
        em.extend_from_slice(&[0x37; 16]);
        em.push(0x00);
        em.extend_from_slice(b"payload");

        assert_eq!(strip_pkcs1_padding(&em).unwrap(), b"payload");
    }

    #[test]
    fn test_strip_padding_rejects_short_fill() {
        let mut em = vec![0x00, 0x01];
        em.extend_from_slice(&[0xFF; 4]);
        em.push(0x00);
        em.extend_from_slice(b"data data data");

        assert!(strip_pkcs1_padding(&em).is_err());
    }
}
