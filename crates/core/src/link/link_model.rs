//! Device link domain models.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{HEARTBEAT_DEFAULT_INTERVAL, HEARTBEAT_DEFAULT_TIMEOUT};
use crate::identity::DeviceIdentity;

/// Discriminator the desktop scanner expects in a pairing payload.
pub const PAIRING_REQUEST_TYPE: &str = "pairing_request";

/// Heartbeat cadence negotiated with the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: HEARTBEAT_DEFAULT_INTERVAL,
            timeout: HEARTBEAT_DEFAULT_TIMEOUT,
        }
    }
}

impl HeartbeatConfig {
    /// Build a config from the server's second-based values. Each field that is
    /// missing, non-finite or not positive falls back to its default.
    pub fn from_server_seconds(interval: Option<f64>, timeout: Option<f64>) -> Self {
        let defaults = Self::default();
        Self {
            interval: positive_secs(interval).unwrap_or(defaults.interval),
            timeout: positive_secs(timeout).unwrap_or(defaults.timeout),
        }
    }
}

fn positive_secs(value: Option<f64>) -> Option<Duration> {
    let secs = value?;
    if !secs.is_finite() || secs <= 0.0 {
        log::debug!("[Heartbeat] Ignoring server value {}; using default", secs);
        return None;
    }
    Duration::try_from_secs_f64(secs).ok()
}

/// Connectivity snapshot broadcast by the network monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub is_online: bool,
}

/// Payload rendered as a QR code so the desktop can pick up this device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub device_id: String,
    pub device_name: String,
    pub timestamp: i64,
}

impl PairingRequest {
    pub fn new(identity: &DeviceIdentity, timestamp_ms: i64) -> Self {
        Self {
            kind: PAIRING_REQUEST_TYPE.to_string(),
            device_id: identity.id().to_string(),
            device_name: identity.name.clone(),
            timestamp: timestamp_ms,
        }
    }

    /// Serialize to the scannable JSON text.
    pub fn to_payload(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Result of asking the server whether this device is paired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingStatus {
    pub paired: bool,
    pub message: Option<String>,
}

impl PairingStatus {
    pub fn unpaired(message: impl Into<String>) -> Self {
        Self {
            paired: false,
            message: Some(message.into()),
        }
    }
}

/// Pairing lifecycle of the local device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PairingState {
    Unpaired,
    CheckingStatus,
    AwaitingQrScan { message: Option<String> },
    AwaitingTokenInput,
    Verifying,
    Paired,
    Failed { reason: String },
}

impl PairingState {
    pub fn is_paired(&self) -> bool {
        matches!(self, Self::Paired)
    }
}
