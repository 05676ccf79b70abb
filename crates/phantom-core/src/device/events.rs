//! ACK correlation and event subscription registries.
//!
//! Two small registries back the session's observer surface:
//!
//! - [`AckRegistry`] maps an outbound message id to a completion slot.
//!   The dispatcher resolves the slot when a matching empty ACK arrives;
//!   teardown drops every slot, which resolves waiters as cancelled.
//! - [`EventSubscribers`] is a name-keyed multimap of channels. Senders
//!   are copied out before iteration so a subscriber can drop (or a new
//!   one register) during dispatch.

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot, Mutex};

use crate::coap::CoapPacket;

/// An event delivered to this device over CoAP.
#[derive(Debug, Clone)]
pub struct DeviceEvent {
    /// Event name, joined from the Uri-Path segments
    pub name: String,
    /// Raw event payload
    pub payload: Vec<u8>,
}

/// Pending-response registry: message id → completion slot.
#[derive(Debug, Default)]
pub struct AckRegistry {
    pending: Mutex<HashMap<u16, oneshot::Sender<CoapPacket>>>,
}

impl AckRegistry {
    /// Register interest in the ACK for `message_id`.
    ///
    /// A second registration for the same id replaces the first; the
    /// protocol never reuses an id within a session.
    pub async fn register(&self, message_id: u16) -> oneshot::Receiver<CoapPacket> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(message_id, tx);
        rx
    }

    /// Resolve the slot for `message_id`, if any. Returns whether a
    /// waiter existed.
    pub async fn complete(&self, message_id: u16, packet: CoapPacket) -> bool {
        let slot = self.pending.lock().await.remove(&message_id);
        match slot {
            Some(tx) => tx.send(packet).is_ok(),
            None => false,
        }
    }

    /// Forget a registration (used when a wait times out).
    pub async fn remove(&self, message_id: u16) {
        self.pending.lock().await.remove(&message_id);
    }

    /// Drop every pending slot; waiters observe cancellation.
    pub async fn cancel_all(&self) {
        self.pending.lock().await.clear();
    }

    /// Number of outstanding waits
    pub async fn pending_count(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// Event-name subscription multimap with copy-on-iterate dispatch.
#[derive(Debug, Default)]
pub struct EventSubscribers {
    subscribers: Mutex<HashMap<String, Vec<mpsc::UnboundedSender<DeviceEvent>>>>,
}

impl EventSubscribers {
    /// Subscribe to events named `name`; the receiver lives until the
    /// caller drops it.
    pub async fn subscribe(&self, name: &str) -> mpsc::UnboundedReceiver<DeviceEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers
            .lock()
            .await
            .entry(name.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Remove every subscriber for `name`.
    pub async fn remove_all(&self, name: &str) {
        self.subscribers.lock().await.remove(name);
    }

    /// Deliver an event to the subscribers of its name.
    ///
    /// Closed subscribers are pruned after delivery.
    pub async fn emit(&self, event: DeviceEvent) {
        let targets: Vec<mpsc::UnboundedSender<DeviceEvent>> = {
            let map = self.subscribers.lock().await;
            match map.get(&event.name) {
                Some(list) => list.clone(),
                None => return,
            }
        };

        let mut any_closed = false;
        for tx in &targets {
            any_closed |= tx.send(event.clone()).is_err();
        }

        if any_closed {
            let mut map = self.subscribers.lock().await;
            if let Some(list) = map.get_mut(&event.name) {
                list.retain(|tx| !tx.is_closed());
                if list.is_empty() {
                    map.remove(&event.name);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coap::{CoapCode, CoapType};

    fn empty_ack(message_id: u16) -> CoapPacket {
        CoapPacket {
            msg_type: CoapType::Acknowledgement,
            code: CoapCode::Empty,
            message_id,
            token: Vec::new(),
            uri_path: Vec::new(),
            payload: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_ack_completes_waiter() {
        let registry = AckRegistry::default();
        let rx = registry.register(42).await;

        assert!(registry.complete(42, empty_ack(42)).await);
        let packet = rx.await.unwrap();
        assert_eq!(packet.message_id, 42);
        assert_eq!(registry.pending_count().await, 0);
    }

    #[tokio::test]
    async fn test_ack_without_waiter_is_noop() {
        let registry = AckRegistry::default();
        assert!(!registry.complete(7, empty_ack(7)).await);
    }

    #[tokio::test]
    async fn test_cancel_all_resolves_as_cancelled() {
        let registry = AckRegistry::default();
        let rx = registry.register(1).await;
        registry.cancel_all().await;
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_subscribers_receive_matching_events() {
        let subs = EventSubscribers::default();
        let mut rx = subs.subscribe("temp").await;

        subs.emit(DeviceEvent {
            name: "temp".into(),
            payload: b"21".to_vec(),
        })
        .await;
        subs.emit(DeviceEvent {
            name: "other".into(),
            payload: Vec::new(),
        })
        .await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name, "temp");
        assert_eq!(event.payload, b"21");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_pruned() {
        let subs = EventSubscribers::default();
        let rx = subs.subscribe("x").await;
        drop(rx);

        // First emit notices the closed channel and prunes it
        subs.emit(DeviceEvent {
            name: "x".into(),
            payload: Vec::new(),
        })
        .await;
        assert!(subs.subscribers.lock().await.get("x").is_none());
    }

    #[tokio::test]
    async fn test_remove_all() {
        let subs = EventSubscribers::default();
        let mut rx = subs.subscribe("gone").await;
        subs.remove_all("gone").await;

        subs.emit(DeviceEvent {
            name: "gone".into(),
            payload: Vec::new(),
        })
        .await;
        assert!(rx.recv().await.is_none());
    }
}
