//! Resilient link between a paired device and the desktop control server.
//!
//! The [`TransportClient`] is built once and passed to every component that
//! talks to the server; it shares the [`AuthSession`] and the
//! [`NetworkStatusMonitor`].

pub mod actions;
pub mod client;
pub mod error;
pub mod heartbeat;
pub mod identity;
pub mod network;
pub mod pairing;
pub mod session;
pub mod types;

#[cfg(test)]
mod test_support;

// Re-export for convenience
pub use actions::DesktopActions;
pub use client::{TransportClient, TransportResponse};
pub use error::{DeviceLinkError, Result};
pub use heartbeat::{HeartbeatScheduler, HeartbeatStats};
pub use identity::{default_device_name, load_or_create_identity, save_identity};
pub use network::{HealthProbe, ListenerId, NetworkStatusMonitor};
pub use pairing::PairingStateMachine;
pub use session::AuthSession;
pub use types::AccessMode;

pub use padlink_core::link::{NetworkStatus, PairingState, PairingStatus, RetryClass, RetryPolicy};
pub use padlink_core::DeviceIdentity;
pub use reqwest::Method;
