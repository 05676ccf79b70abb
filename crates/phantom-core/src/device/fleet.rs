//! Device fleet: the collection surface an orchestrator drives.
//!
//! The fleet holds one [`DeviceSession`] per simulated device, created
//! from a shared server key and a template configuration. Sessions run
//! independently; the fleet only fans orchestration calls out.

use std::path::PathBuf;
use std::sync::Arc;

use phantom_crypto::ServerPublicKey;
use phantom_transport::tcp::TransportStatsSnapshot;

use crate::device::config::SessionConfig;
use crate::device::identity::DeviceIdentity;
use crate::device::session::DeviceSession;
use crate::error::SessionError;

/// A collection of device sessions against one cloud server.
pub struct DeviceFleet {
    server_key: Arc<ServerPublicKey>,
    keys_dir: PathBuf,
    config: SessionConfig,
    sessions: Vec<DeviceSession>,
}

impl DeviceFleet {
    /// Create an empty fleet.
    ///
    /// `config` is the template every spawned session copies; the server
    /// key is shared by all of them.
    #[must_use]
    pub fn new(
        server_key: Arc<ServerPublicKey>,
        keys_dir: impl Into<PathBuf>,
        config: SessionConfig,
    ) -> Self {
        Self {
            server_key,
            keys_dir: keys_dir.into(),
            config,
            sessions: Vec::new(),
        }
    }

    /// Construct a session, loading or generating device keys.
    ///
    /// With `hex_id` the key file for that id is reused when present;
    /// without it a fresh identity is minted and persisted.
    pub fn spawn_device(&mut self, hex_id: Option<&str>) -> Result<&DeviceSession, SessionError> {
        let id = hex_id.map(DeviceIdentity::parse_hex_id).transpose()?;
        let identity = DeviceIdentity::load_or_generate(&self.keys_dir, id)?;
        tracing::info!(device = %identity.id_hex(), fleet_size = self.sessions.len() + 1, "device spawned");

        let session = DeviceSession::new(
            identity,
            Arc::clone(&self.server_key),
            self.config.clone(),
        );
        self.sessions.push(session);
        Ok(self.sessions.last().expect("session just pushed"))
    }

    /// Begin the handshake on every session.
    pub fn connect_all(&self) {
        for session in &self.sessions {
            session.connect();
        }
    }

    /// Terminally tear every session down.
    pub async fn disconnect_all(&self) {
        for session in &self.sessions {
            session.disconnect().await;
        }
    }

    /// Fire a webhook event from every session; returns how many were
    /// actually enqueued.
    pub async fn send_webhook_all(&self) -> usize {
        let mut sent = 0;
        for session in &self.sessions {
            if session.send_webhook().await.is_some() {
                sent += 1;
            }
        }
        sent
    }

    /// Fire a webhook event from the session at `index`.
    ///
    /// Returns the assigned message id, or `None` when the index is out
    /// of range or the session had no live connection to enqueue on.
    pub async fn send_webhook(&self, index: usize) -> Option<u16> {
        self.sessions.get(index)?.send_webhook().await
    }

    /// Sessions currently in the Ready state
    pub async fn connected_count(&self) -> usize {
        let mut connected = 0;
        for session in &self.sessions {
            if session.is_connected().await {
                connected += 1;
            }
        }
        connected
    }

    /// Number of sessions in the fleet
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the fleet is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// All sessions, for registration and observation
    #[must_use]
    pub fn sessions(&self) -> &[DeviceSession] {
        &self.sessions
    }

    /// Session by index
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&DeviceSession> {
        self.sessions.get(index)
    }

    /// Summed traffic counters across the fleet
    #[must_use]
    pub fn total_stats(&self) -> TransportStatsSnapshot {
        let mut total = TransportStatsSnapshot::default();
        for session in &self.sessions {
            let snap = session.stats();
            total.bytes_sent += snap.bytes_sent;
            total.bytes_received += snap.bytes_received;
            total.messages_sent += snap.messages_sent;
            total.messages_received += snap.messages_received;
            total.connects += snap.connects;
            total.send_errors += snap.send_errors;
        }
        total
    }
}
