//! Inbound CoAP dispatch.
//!
//! Decrypted packets are routed by their first Uri-Path segment:
//!
//! | Segment | Meaning | Response |
//! |---------|---------|----------|
//! | `h` | Hello from the server | clears the hello window, no reply |
//! | `d` | Describe request | `2.05 Content`, canned JSON, token echoed |
//! | `f` | Function call | `2.04 Changed`, random u32, token echoed |
//! | `v` | Variable read | `2.05 Content`, random u32, token echoed |
//! | `e`/`E` | Event delivered to the device | local dispatch, no reply |
//!
//! Empty ACKs resolve the pending-response registry. Unknown URIs and
//! malformed packets are logged and ignored; nothing here tears a
//! connection down.

use phantom_crypto::random::random_u32;

use crate::coap::{CoapCode, CoapPacket, CoapType};
use crate::device::describe::{describe_blob, describe_flags};
use crate::device::events::DeviceEvent;
use crate::device::session::SessionInner;

impl SessionInner {
    /// Route one inbound packet.
    pub(crate) async fn handle_packet(&self, packet: CoapPacket) {
        if packet.is_empty_ack() {
            if !self.acks.complete(packet.message_id, packet.clone()).await {
                tracing::trace!(
                    device = %self.identity.id_hex(),
                    message_id = packet.message_id,
                    "ack without a waiter"
                );
            }
            return;
        }

        match packet.first_path_segment() {
            Some("h") => self.handle_hello().await,
            Some("d") => self.handle_describe(&packet).await,
            Some("f") => self.handle_function(&packet).await,
            Some("v") => self.handle_variable(&packet).await,
            Some("e" | "E") => self.handle_event(&packet).await,
            Some(other) => {
                tracing::warn!(
                    device = %self.identity.id_hex(),
                    uri = other,
                    "ignoring unknown coap uri"
                );
            }
            None => {
                tracing::debug!(
                    device = %self.identity.id_hex(),
                    code = ?packet.code,
                    "ignoring coap packet without a uri"
                );
            }
        }
    }

    async fn handle_hello(&self) {
        if let Some(tx) = self.hello_wait.lock().await.take() {
            let _ = tx.send(());
        }
        tracing::debug!(device = %self.identity.id_hex(), "hello from server");
    }

    async fn handle_describe(&self, request: &CoapPacket) {
        let flags = describe_flags(&request.payload);
        let blob = describe_blob(&self.identity.id_hex(), self.config.platform_id, flags);
        tracing::debug!(device = %self.identity.id_hex(), flags, "describe requested");
        self.send_reply(CoapCode::Content, request.token.clone(), blob)
            .await;
    }

    async fn handle_function(&self, request: &CoapPacket) {
        let result = random_u32().unwrap_or_default();
        tracing::debug!(
            device = %self.identity.id_hex(),
            function = request.uri_path.get(1).map(String::as_str).unwrap_or(""),
            result,
            "function called"
        );
        self.send_reply(
            CoapCode::Changed,
            request.token.clone(),
            result.to_be_bytes().to_vec(),
        )
        .await;
    }

    async fn handle_variable(&self, request: &CoapPacket) {
        let value = random_u32().unwrap_or_default();
        tracing::debug!(
            device = %self.identity.id_hex(),
            variable = request.uri_path.get(1).map(String::as_str).unwrap_or(""),
            value,
            "variable read"
        );
        self.send_reply(
            CoapCode::Content,
            request.token.clone(),
            value.to_be_bytes().to_vec(),
        )
        .await;
    }

    async fn handle_event(&self, packet: &CoapPacket) {
        let name = event_name(&packet.uri_path);
        if name.is_empty() {
            tracing::debug!(device = %self.identity.id_hex(), "event without a name");
            return;
        }
        tracing::debug!(device = %self.identity.id_hex(), event = %name, "event delivered");
        self.subscribers
            .emit(DeviceEvent {
                name,
                payload: packet.payload.clone(),
            })
            .await;
    }

    /// Reply to a server request: next message id, echoed token.
    async fn send_reply(&self, code: CoapCode, token: Vec<u8>, payload: Vec<u8>) {
        self.send_message(
            CoapType::Acknowledgement,
            code,
            Vec::new(),
            payload,
            Some(token),
            false,
        )
        .await;
    }
}

/// Join the event name from the Uri-Path: the segments after the `e`/`E`
/// marker, minus a trailing numeric index.
fn event_name(uri_path: &[String]) -> String {
    if uri_path.len() < 2 {
        return String::new();
    }

    let mut segments = &uri_path[1..];
    if segments.len() > 1
        && segments
            .last()
            .is_some_and(|last| last.parse::<u64>().is_ok())
    {
        segments = &segments[..segments.len() - 1];
    }
    segments.join("/")
}
