//! Virtual device layer.
//!
//! A [`DeviceSession`] is one simulated device: it owns the handshake,
//! the encrypted pipeline, CoAP dispatch, the ping schedule, and the
//! reconnect loop. A [`DeviceFleet`] is the collection surface an
//! orchestrator drives.

pub mod config;
pub mod describe;
mod dispatch;
pub mod events;
pub mod fleet;
pub mod identity;
pub mod session;

pub use config::SessionConfig;
pub use events::DeviceEvent;
pub use fleet::DeviceFleet;
pub use identity::DeviceIdentity;
pub use session::{DeviceSession, DeviceState};
