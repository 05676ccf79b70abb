//! Device identity and key-file management.
//!
//! A device identity is a 12-byte opaque id plus a 1024-bit RSA keypair.
//! The id renders as 24 lowercase hex characters for external APIs and
//! names the on-disk key file: `<keys_dir>/<deviceIdHex>.pem`, a PKCS#1
//! private PEM. Identities are immutable after creation; the same file
//! reconnects the same device across restarts.

use std::fs;
use std::path::{Path, PathBuf};

use phantom_crypto::{random, CryptoError, DeviceKeypair};

use crate::error::SessionError;
use crate::DEVICE_ID_SIZE;

/// One device's identity: wire id plus RSA keypair.
#[derive(Clone)]
pub struct DeviceIdentity {
    id: [u8; DEVICE_ID_SIZE],
    keypair: DeviceKeypair,
}

impl DeviceIdentity {
    /// Generate a random id and a fresh keypair.
    pub fn generate() -> Result<Self, CryptoError> {
        let mut id = [0u8; DEVICE_ID_SIZE];
        random::fill_random(&mut id)?;
        let keypair = DeviceKeypair::generate()?;
        Ok(Self { id, keypair })
    }

    /// Assemble an identity from existing parts.
    #[must_use]
    pub fn from_parts(id: [u8; DEVICE_ID_SIZE], keypair: DeviceKeypair) -> Self {
        Self { id, keypair }
    }

    /// Parse a 24-hex-character device id.
    pub fn parse_hex_id(hex_id: &str) -> Result<[u8; DEVICE_ID_SIZE], SessionError> {
        let bytes = hex::decode(hex_id)
            .map_err(|_| SessionError::InvalidState("device id is not valid hex"))?;
        bytes
            .try_into()
            .map_err(|_| SessionError::InvalidState("device id must be 12 bytes"))
    }

    /// Load the identity for `id` from the keys directory, or generate
    /// and persist a new one.
    ///
    /// With no id given, a fresh identity is always generated. The key
    /// file is owned by this device id; concurrent sessions for the same
    /// id are undefined behavior.
    pub fn load_or_generate(
        keys_dir: &Path,
        id: Option<[u8; DEVICE_ID_SIZE]>,
    ) -> Result<Self, SessionError> {
        let identity = match id {
            Some(id) => {
                let path = Self::key_path(keys_dir, &id);
                if path.exists() {
                    let pem = fs::read_to_string(&path)?;
                    let keypair = DeviceKeypair::from_pkcs1_pem(&pem)?;
                    tracing::debug!(device = %hex::encode(id), path = %path.display(), "loaded device key");
                    return Ok(Self { id, keypair });
                }
                Self::from_parts(id, DeviceKeypair::generate()?)
            }
            None => Self::generate()?,
        };

        identity.persist(keys_dir)?;
        Ok(identity)
    }

    /// Write the private key to its place in the keys directory.
    pub fn persist(&self, keys_dir: &Path) -> Result<(), SessionError> {
        fs::create_dir_all(keys_dir)?;
        let path = Self::key_path(keys_dir, &self.id);
        let pem = self.keypair.to_pkcs1_pem()?;
        fs::write(&path, pem.as_bytes())?;
        tracing::info!(device = %self.id_hex(), path = %path.display(), "persisted device key");
        Ok(())
    }

    /// Key-file path for a device id.
    #[must_use]
    pub fn key_path(keys_dir: &Path, id: &[u8; DEVICE_ID_SIZE]) -> PathBuf {
        keys_dir.join(format!("{}.pem", hex::encode(id)))
    }

    /// The 12-byte wire id
    #[must_use]
    pub fn id(&self) -> &[u8; DEVICE_ID_SIZE] {
        &self.id
    }

    /// The id as 24 lowercase hex characters
    #[must_use]
    pub fn id_hex(&self) -> String {
        hex::encode(self.id)
    }

    /// The RSA keypair
    #[must_use]
    pub fn keypair(&self) -> &DeviceKeypair {
        &self.keypair
    }

    /// Public key as PKCS#8 PEM, for out-of-band registration
    pub fn public_key_pem(&self) -> Result<String, CryptoError> {
        self.keypair.public_key_pem()
    }
}
