//! Request/response types exchanged with the desktop control server.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DeviceLinkError;

/// Body-level success marker returned by command endpoints.
pub const STATUS_SUCCESS: &str = "success";

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Error body shapes the server produces (`{"detail": ...}` from the framework,
/// `{"message": ...}` from handlers).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiErrorResponse {
    pub detail: Option<serde_json::Value>,
    pub message: Option<String>,
}

impl ApiErrorResponse {
    pub fn into_detail(self) -> Option<String> {
        match self.detail {
            Some(serde_json::Value::String(detail)) => Some(detail),
            Some(serde_json::Value::Null) | None => self.message,
            Some(other) => Some(other.to_string()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Heartbeat
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfigResponse {
    pub interval: Option<f64>,
    pub timeout: Option<f64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatRequest {
    pub device_id: String,
    pub device_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatResponse {
    pub status: String,
    pub timestamp: Option<f64>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedDevice {
    pub last_heartbeat: f64,
    pub is_paired: bool,
    pub status: String,
    pub name: Option<String>,
    pub paired_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionStatusResponse {
    pub active_connections: usize,
    #[serde(default)]
    pub devices: HashMap<String, ConnectedDevice>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Pairing & auth
// ─────────────────────────────────────────────────────────────────────────────

/// Body for both `verify-device` and `pair-device`.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceRegistration {
    pub device_id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VerifyDeviceResponse {
    #[serde(default)]
    pub paired: bool,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthTokenRequest {
    pub enabled: bool,
    pub expiry_hours: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthTokenResponse {
    pub enabled: bool,
    pub token: Option<String>,
    pub expiry: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Commands
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct SendTextRequest {
    pub msg: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ShortcutRequest {
    pub shortcut: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct MouseActionRequest {
    pub action: String,
}

/// Generic `{status, message}` acknowledgement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: Option<String>,
    pub message: Option<String>,
    pub detail: Option<String>,
}

impl CommandResponse {
    pub fn is_success(&self) -> bool {
        self.status.as_deref() == Some(STATUS_SUCCESS)
    }

    /// Reason to show when the body does not carry the success marker.
    pub fn failure_reason(&self) -> String {
        self.message
            .clone()
            .or_else(|| self.detail.clone())
            .or_else(|| self.status.as_ref().map(|s| format!("status '{}'", s)))
            .unwrap_or_else(|| "missing success marker".to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Network administration
// ─────────────────────────────────────────────────────────────────────────────

/// Which client addresses the desktop server accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessMode {
    /// RFC 1918 ranges only.
    Private,
    Campus,
    Lan,
    All,
}

impl AccessMode {
    pub const ALL: [AccessMode; 4] = [Self::Private, Self::Campus, Self::Lan, Self::All];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Private => "private",
            Self::Campus => "campus",
            Self::Lan => "lan",
            Self::All => "all",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessMode {
    type Err = DeviceLinkError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| {
                DeviceLinkError::invalid_request(format!(
                    "Unknown access mode '{}'; expected private, campus, lan or all",
                    value
                ))
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PairedDeviceInfo {
    pub device_id: String,
    pub name: Option<String>,
    pub paired_at: Option<String>,
    pub last_seen: Option<String>,
}

/// `GET /api/network/status`. The access mode stays a string so a server
/// with a newer mode still parses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatusResponse {
    pub access_mode: String,
    #[serde(default)]
    pub access_mode_description: String,
    pub auth_enabled: bool,
    pub token_expiry: Option<String>,
    #[serde(default)]
    pub paired_devices: Vec<PairedDeviceInfo>,
    #[serde(default)]
    pub https_enabled: bool,
    pub cert_info: Option<serde_json::Value>,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AccessModeRequest {
    pub mode: AccessMode,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccessModeResponse {
    pub status: Option<String>,
    pub message: Option<String>,
    pub access_mode: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OriginRequest {
    pub origin: String,
}

/// Answer of every `allowed-origins` route.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AllowedOriginsResponse {
    pub status: Option<String>,
    pub message: Option<String>,
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    pub access_mode: Option<String>,
}

/// `GET /api/desktop/access-info`: where a phone can reach the desktop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AccessInfo {
    pub network_ip: Option<String>,
    pub port: u16,
    pub phone_url: String,
    pub qrcode_url: String,
    pub localhost_url: Option<String>,
    pub error: Option<String>,
}
