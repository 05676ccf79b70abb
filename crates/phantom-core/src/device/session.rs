//! Device session state machine.
//!
//! One [`DeviceSession`] impersonates one physical device. Its lifecycle:
//!
//! ```text
//!                connect()
//! Disconnected ────────────→ Nonce ──→ AwaitSessionKey ──→ Ready
//!        ▲                                                   │
//!        │        socket error / idle / crypto failure       │
//!        └──────────── (reconnect after 15 s) ◄──────────────┘
//! ```
//!
//! A supervisor task owns the reconnect loop. Each connection runs the
//! handshake inline, then splits into a select-driven read loop (socket →
//! throttle → framing → cipher → CoAP dispatch) and a writer task
//! draining the outbound queue (CoAP build → cipher → throttle → framing
//! → socket). Message ids are assigned under the outbound lock at
//! submission time, so ids are monotonic in queue order and the writer
//! preserves that order on the wire.
//!
//! `disconnect()` is sticky: after a user disconnect no socket event
//! schedules a reconnect and `connect()` becomes a no-op.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{mpsc, oneshot, watch, Mutex, RwLock};
use tokio::time::Instant;

use phantom_crypto::constant_time::verify_hmac;
use phantom_crypto::mac::hmac_sha1;
use phantom_crypto::secrets::TOKEN_PREFIX_SIZE;
use phantom_crypto::{CryptoError, ServerPublicKey, SessionSecrets};
use phantom_transport::tcp::{TransportStats, TransportStatsSnapshot};
use phantom_transport::Throttle;

use crate::chain::CipherState;
use crate::coap::{CoapCode, CoapPacket, CoapType};
use crate::device::config::SessionConfig;
use crate::device::events::{AckRegistry, DeviceEvent, EventSubscribers};
use crate::device::identity::DeviceIdentity;
use crate::error::SessionError;
use crate::framing::{encode_frame, FrameDecoder};
use crate::{HANDSHAKE_RESPONSE_SIZE, NONCE_SIZE, SESSION_KEY_CIPHER_SIZE};

/// Read buffer size for the inbound pipeline
const READ_BUF_SIZE: usize = 16 * 1024;

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Connected, waiting for the server's 40-byte nonce
    Nonce,
    /// Nonce answered, waiting for the session-key response
    AwaitSessionKey,
    /// Handshake complete, encrypted pipeline live
    Ready,
    /// No connection (initial, between reconnects, or terminal)
    Disconnected,
}

/// Live outbound half of a connection.
///
/// Present only while a connection is up; messages submitted without one
/// are silently dropped, matching the stress tool's no-back-pressure
/// contract.
pub(crate) struct Outbound {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    message_id: u16,
    token_prefix: [u8; TOKEN_PREFIX_SIZE],
}

pub(crate) struct SessionInner {
    pub(crate) identity: DeviceIdentity,
    pub(crate) server_key: Arc<ServerPublicKey>,
    pub(crate) config: SessionConfig,
    pub(crate) state: RwLock<DeviceState>,
    pub(crate) outbound: Mutex<Option<Outbound>>,
    pub(crate) hello_wait: Mutex<Option<oneshot::Sender<()>>>,
    pub(crate) acks: AckRegistry,
    pub(crate) subscribers: EventSubscribers,
    pub(crate) stats: TransportStats,
    pub(crate) user_disconnected: AtomicBool,
    supervisor_running: AtomicBool,
    shutdown: watch::Sender<bool>,
}

/// One simulated device.
///
/// Cheaply cloneable; all clones share the same session.
#[derive(Clone)]
pub struct DeviceSession {
    inner: Arc<SessionInner>,
}

impl DeviceSession {
    /// Create a session for `identity` against the server at
    /// `config.server_addr` (scheme stripped, default port appended).
    ///
    /// The server key is the process-wide immutable handle every session
    /// shares. No I/O happens until [`connect`](Self::connect).
    #[must_use]
    pub fn new(
        identity: DeviceIdentity,
        server_key: Arc<ServerPublicKey>,
        mut config: SessionConfig,
    ) -> Self {
        config.server_addr = SessionConfig::normalize_addr(&config.server_addr);
        let (shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(SessionInner {
                identity,
                server_key,
                config,
                state: RwLock::new(DeviceState::Disconnected),
                outbound: Mutex::new(None),
                hello_wait: Mutex::new(None),
                acks: AckRegistry::default(),
                subscribers: EventSubscribers::default(),
                stats: TransportStats::new(),
                user_disconnected: AtomicBool::new(false),
                supervisor_running: AtomicBool::new(false),
                shutdown,
            }),
        }
    }

    /// Begin the async handshake; idempotent while a connection attempt
    /// is in flight. A no-op after a user disconnect.
    pub fn connect(&self) {
        if self.inner.user_disconnected.load(Ordering::SeqCst) {
            tracing::debug!(device = %self.device_id_hex(), "connect ignored after disconnect");
            return;
        }
        if self
            .inner
            .supervisor_running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }

        let inner = Arc::clone(&self.inner);
        tokio::spawn(supervise(inner));
    }

    /// Terminal tear-down: cancels the reconnect schedule and the ping
    /// timer, drops pending waits, and closes the socket. Idempotent.
    pub async fn disconnect(&self) {
        if self.inner.user_disconnected.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.inner.shutdown.send(true);
        self.inner.acks.cancel_all().await;
        self.inner.set_state(DeviceState::Disconnected).await;
        tracing::info!(device = %self.device_id_hex(), "session disconnected by user");
    }

    /// Current lifecycle state
    pub async fn state(&self) -> DeviceState {
        self.inner.state().await
    }

    /// Whether the handshake is complete and the pipeline live
    pub async fn is_connected(&self) -> bool {
        self.state().await == DeviceState::Ready
    }

    /// Device id as 24 lowercase hex characters
    #[must_use]
    pub fn device_id_hex(&self) -> String {
        self.inner.identity.id_hex()
    }

    /// Device public key PEM for out-of-band registration
    pub fn public_key_pem(&self) -> Result<String, CryptoError> {
        self.inner.identity.public_key_pem()
    }

    /// Lifetime traffic counters (across reconnects)
    #[must_use]
    pub fn stats(&self) -> TransportStatsSnapshot {
        self.inner.stats.snapshot()
    }

    /// Publish a confirmable event and wait for the server's ACK.
    ///
    /// Returns the ACK packet, or `None` when the ACK timed out, the
    /// session tore down, or no connection was live (all non-fatal).
    pub async fn publish(&self, name: &str, payload: Vec<u8>) -> Option<CoapPacket> {
        let (message_id, ack_rx) = self
            .inner
            .send_message(
                CoapType::Confirmable,
                CoapCode::Post,
                vec!["e".to_string(), name.to_string()],
                payload,
                None,
                true,
            )
            .await?;
        self.inner.await_ack(message_id, ack_rx?).await
    }

    /// Fire a webhook-triggering event: `POST /e/<webhook_event>` with a
    /// small random JSON payload. Returns the assigned message id.
    pub async fn send_webhook(&self) -> Option<u16> {
        let payload = serde_json::json!({
            "source": self.device_id_hex(),
            "value": phantom_crypto::random::random_u32().unwrap_or_default(),
        });
        let (message_id, _) = self
            .inner
            .send_message(
                CoapType::Confirmable,
                CoapCode::Post,
                vec!["e".to_string(), self.inner.config.webhook_event.clone()],
                payload.to_string().into_bytes(),
                None,
                false,
            )
            .await?;
        Some(message_id)
    }

    /// Subscribe to events named `name`.
    ///
    /// Registers a local observer, then sends the confirmable
    /// `GET /e/<name>` and waits for its ACK (a timeout is logged, not
    /// fatal). The returned receiver lives until dropped.
    pub async fn subscribe(&self, name: &str) -> mpsc::UnboundedReceiver<DeviceEvent> {
        let rx = self.inner.subscribers.subscribe(name).await;

        if let Some((message_id, Some(ack_rx))) = self
            .inner
            .send_message(
                CoapType::Confirmable,
                CoapCode::Get,
                vec!["e".to_string(), name.to_string()],
                Vec::new(),
                None,
                true,
            )
            .await
        {
            self.inner.await_ack(message_id, ack_rx).await;
        }

        rx
    }

    /// Remove every observer registered for `name`.
    pub async fn unsubscribe(&self, name: &str) {
        self.inner.subscribers.remove_all(name).await;
    }
}

impl SessionInner {
    pub(crate) async fn state(&self) -> DeviceState {
        *self.state.read().await
    }

    pub(crate) async fn set_state(&self, next: DeviceState) {
        let mut state = self.state.write().await;
        if *state != next {
            tracing::debug!(device = %self.identity.id_hex(), from = ?*state, to = ?next, "state transition");
            *state = next;
        }
    }

    /// Assign the next message id and enqueue an outbound CoAP packet.
    ///
    /// The id counter lives under the outbound lock, so ids are strictly
    /// increasing (mod 65536) in queue order. `token` of `None` derives
    /// the token from the session prefix; replies pass the request's
    /// token, pings pass an empty one. With `register_ack` the caller
    /// receives a completion slot registered before the packet leaves.
    ///
    /// Returns `None`, dropping the message, when no connection is live.
    pub(crate) async fn send_message(
        &self,
        msg_type: CoapType,
        code: CoapCode,
        uri_path: Vec<String>,
        payload: Vec<u8>,
        token: Option<Vec<u8>>,
        register_ack: bool,
    ) -> Option<(u16, Option<oneshot::Receiver<CoapPacket>>)> {
        let mut guard = self.outbound.lock().await;
        let Some(outbound) = guard.as_mut() else {
            tracing::debug!(device = %self.identity.id_hex(), "dropping message, no live connection");
            self.stats.record_send_error();
            return None;
        };

        let message_id = outbound.message_id.wrapping_add(1);
        let token = token.unwrap_or_else(|| outbound.token_prefix[..4].to_vec());

        let packet = CoapPacket {
            msg_type,
            code,
            message_id,
            token,
            uri_path,
            payload,
        };
        let bytes = match packet.encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                // The counter only commits on success, so no id is skipped
                tracing::warn!(device = %self.identity.id_hex(), error = %e, "failed to encode outbound packet");
                return None;
            }
        };
        outbound.message_id = message_id;

        let ack_rx = if register_ack {
            Some(self.acks.register(message_id).await)
        } else {
            None
        };
        if outbound.tx.send(bytes).is_err() {
            self.acks.remove(message_id).await;
            self.stats.record_send_error();
            return None;
        }
        Some((message_id, ack_rx))
    }

    /// Wait for the ACK matching `message_id`, up to the configured
    /// timeout. A timeout resolves with a warning; teardown resolves as
    /// cancelled. Both are `None`.
    pub(crate) async fn await_ack(
        &self,
        message_id: u16,
        rx: oneshot::Receiver<CoapPacket>,
    ) -> Option<CoapPacket> {
        match tokio::time::timeout(self.config.ack_timeout, rx).await {
            Ok(Ok(packet)) => Some(packet),
            Ok(Err(_)) => {
                tracing::debug!(message_id, "ack wait cancelled");
                None
            }
            Err(_) => {
                tracing::warn!(device = %self.identity.id_hex(), message_id, "no ACK within timeout");
                self.acks.remove(message_id).await;
                None
            }
        }
    }

    /// Enqueue the device Hello announcing identity and firmware.
    pub(crate) async fn send_hello(&self) {
        let id = self.identity.id();
        let mut payload = Vec::with_capacity(10 + id.len());
        payload.extend_from_slice(&self.config.product_id.to_be_bytes());
        payload.extend_from_slice(&self.config.firmware_version.to_be_bytes());
        payload.extend_from_slice(&[0, 0]);
        payload.extend_from_slice(&self.config.platform_id.to_be_bytes());
        payload.extend_from_slice(&(id.len() as u16).to_be_bytes());
        payload.extend_from_slice(id);

        self.send_message(
            CoapType::Confirmable,
            CoapCode::Post,
            vec!["h".to_string()],
            payload,
            None,
            false,
        )
        .await;
    }

    /// Enqueue a keepalive ping: confirmable, code 0.00, no path, no
    /// token, no payload.
    pub(crate) async fn send_ping(&self) {
        self.send_message(
            CoapType::Confirmable,
            CoapCode::Empty,
            Vec::new(),
            Vec::new(),
            Some(Vec::new()),
            false,
        )
        .await;
    }
}

/// Reconnect supervisor: runs connections until a user disconnect.
async fn supervise(inner: Arc<SessionInner>) {
    let mut shutdown = inner.shutdown.subscribe();

    loop {
        if inner.user_disconnected.load(Ordering::SeqCst) {
            break;
        }

        let result = run_connection(&inner, &mut shutdown).await;
        teardown(&inner).await;

        match result {
            Ok(()) | Err(SessionError::Cancelled) => break,
            Err(e) => {
                tracing::warn!(
                    device = %inner.identity.id_hex(),
                    error = %e,
                    delay = ?inner.config.reconnect_delay,
                    "connection lost, reconnect scheduled"
                );
            }
        }

        tokio::select! {
            () = tokio::time::sleep(inner.config.reconnect_delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    inner.set_state(DeviceState::Disconnected).await;
    inner.supervisor_running.store(false, Ordering::SeqCst);
}

/// Drop the connection-scoped state after a connection ends.
async fn teardown(inner: &SessionInner) {
    *inner.outbound.lock().await = None;
    *inner.hello_wait.lock().await = None;
    inner.acks.cancel_all().await;
    inner.set_state(DeviceState::Disconnected).await;
}

/// One full connection: handshake, pipeline, dispatch. Returns `Ok(())`
/// only on user-initiated shutdown; every other exit is an error that
/// the supervisor answers with a reconnect.
async fn run_connection(
    inner: &Arc<SessionInner>,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), SessionError> {
    let device = inner.identity.id_hex();
    let config = inner.config.clone();

    tracing::info!(device = %device, server = %config.server_addr, "connecting");
    let stream = tokio::select! {
        res = phantom_transport::tcp::connect(&config.server_addr, config.connect_timeout) => res?,
        _ = shutdown.changed() => return Err(SessionError::Cancelled),
    };
    inner.stats.record_connect();
    let (mut reader, mut writer) = stream.into_split();

    // Step 1: the server opens with 40 plaintext nonce bytes. Answer
    // with nonce ‖ device id ‖ public key DER, encrypted to the server.
    inner.set_state(DeviceState::Nonce).await;
    let mut nonce = [0u8; NONCE_SIZE];
    read_exact_guarded(inner, shutdown, &mut reader, &mut nonce).await?;

    let mut response = Vec::with_capacity(NONCE_SIZE + inner.identity.id().len() + 192);
    response.extend_from_slice(&nonce);
    response.extend_from_slice(inner.identity.id());
    response.extend_from_slice(&inner.identity.keypair().public_key_der()?);
    let ciphertext = inner.server_key.encrypt(&response)?;
    writer.write_all(&ciphertext).await?;
    inner.stats.record_send(ciphertext.len());

    // Step 2: 128 bytes of session-key ciphertext plus 128 bytes of
    // server-signed HMAC over it.
    inner.set_state(DeviceState::AwaitSessionKey).await;
    let mut handshake = [0u8; HANDSHAKE_RESPONSE_SIZE];
    read_exact_guarded(inner, shutdown, &mut reader, &mut handshake).await?;

    let (key_cipher, signed_hmac) = handshake.split_at(SESSION_KEY_CIPHER_SIZE);
    let session_key = inner.identity.keypair().decrypt(key_cipher)?;
    let expected = hmac_sha1(&session_key, key_cipher);
    let recovered = inner.server_key.recover_signed(signed_hmac)?;
    if !verify_hmac(&expected, &recovered) {
        return Err(SessionError::HandshakeRejected);
    }

    let secrets = SessionSecrets::from_bytes(&session_key)?;
    let mut recv_cipher = CipherState::new(*secrets.aes_key(), *secrets.initial_iv());
    let send_cipher = CipherState::new(*secrets.aes_key(), *secrets.initial_iv());

    // Install the pipeline: everything from here on is throttled,
    // framed, and CBC-chained in both directions.
    let (out_tx, out_rx) = mpsc::unbounded_channel();
    *inner.outbound.lock().await = Some(Outbound {
        tx: out_tx,
        message_id: secrets.initial_message_id(),
        token_prefix: *secrets.token_prefix(),
    });

    let throttle = Throttle::new(config.network_delay);
    let mut writer_task = tokio::spawn(write_loop(
        Arc::clone(inner),
        writer,
        out_rx,
        send_cipher,
        throttle,
    ));

    let (hello_tx, hello_rx) = oneshot::channel();
    *inner.hello_wait.lock().await = Some(hello_tx);

    inner.set_state(DeviceState::Ready).await;
    tracing::info!(device = %device, "handshake complete, session ready");
    inner.send_hello().await;

    let hello_window = tokio::time::timeout(config.hello_timeout, hello_rx);
    tokio::pin!(hello_window);
    let mut hello_pending = true;

    let mut ping = tokio::time::interval_at(
        Instant::now() + config.ping_interval,
        config.ping_interval,
    );
    let mut decoder = FrameDecoder::new();
    let mut read_buf = vec![0u8; READ_BUF_SIZE];

    let result = loop {
        tokio::select! {
            res = tokio::time::timeout(config.idle_timeout, reader.read(&mut read_buf)) => {
                let n = match res {
                    Err(_) => break Err(SessionError::IdleTimeout),
                    Ok(Err(e)) => break Err(e.into()),
                    Ok(Ok(0)) => break Err(SessionError::ConnectionClosed),
                    Ok(Ok(n)) => n,
                };
                inner.stats.record_recv(n);
                let arrival = Instant::now();
                throttle.hold_since(arrival).await;

                let mut fatal = None;
                for frame in decoder.push(&read_buf[..n]) {
                    match recv_cipher.decrypt(&frame) {
                        Err(e) => {
                            fatal = Some(SessionError::from(e));
                            break;
                        }
                        Ok(plaintext) => match CoapPacket::parse(&plaintext) {
                            Ok(packet) => inner.handle_packet(packet).await,
                            Err(e) => tracing::warn!(
                                device = %device,
                                error = %e,
                                "ignoring malformed coap packet"
                            ),
                        },
                    }
                }
                if let Some(e) = fatal {
                    break Err(e);
                }
            }
            res = &mut writer_task => {
                break match res {
                    Ok(Ok(())) => Err(SessionError::ConnectionClosed),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(SessionError::InvalidState("writer task failed")),
                };
            }
            res = &mut hello_window, if hello_pending => {
                hello_pending = false;
                match res {
                    Err(_) => break Err(SessionError::HelloTimeout),
                    Ok(_) => tracing::debug!(device = %device, "server hello received"),
                }
            }
            _ = ping.tick() => {
                if inner.state().await == DeviceState::Ready {
                    inner.send_ping().await;
                }
            }
            _ = shutdown.changed() => break Err(SessionError::Cancelled),
        }
    };

    writer_task.abort();
    result
}

/// Writer half of the pipeline: encrypt, throttle, frame, write, in
/// strict submission order.
async fn write_loop(
    inner: Arc<SessionInner>,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    mut cipher: CipherState,
    throttle: Throttle,
) -> Result<(), SessionError> {
    while let Some(message) = rx.recv().await {
        let ciphertext = cipher.encrypt(&message);
        throttle.hold().await;
        let framed = encode_frame(&ciphertext)?;
        if let Err(e) = writer.write_all(&framed).await {
            inner.stats.record_send_error();
            return Err(e.into());
        }
        inner.stats.record_send(framed.len());
    }
    Ok(())
}

/// Read exactly `buf` bytes, bounded by the idle timeout and the
/// shutdown signal. Used by the plaintext handshake steps.
async fn read_exact_guarded(
    inner: &SessionInner,
    shutdown: &mut watch::Receiver<bool>,
    reader: &mut OwnedReadHalf,
    buf: &mut [u8],
) -> Result<(), SessionError> {
    tokio::select! {
        res = tokio::time::timeout(inner.config.idle_timeout, reader.read_exact(buf)) => {
            res.map_err(|_| SessionError::IdleTimeout)??;
            inner.stats.record_recv(buf.len());
            Ok(())
        }
        _ = shutdown.changed() => Err(SessionError::Cancelled),
    }
}
