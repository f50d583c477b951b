use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};

use crate::store::SecretBackend;

/// Port the desktop control server listens on out of the box.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:19653";

const DATA_DIR_NAME: &str = "padlink";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub server_url: String,
    /// Overrides the host-derived name; renames an existing identity.
    pub device_name: Option<String>,
    pub data_dir: PathBuf,
    /// `None` picks the keychain when the host has one.
    pub secret_store: Option<SecretBackend>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let server_url = non_empty("PADLINK_SERVER_URL")
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
            .trim()
            .trim_end_matches('/')
            .to_string();

        let data_dir = match non_empty("PADLINK_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| anyhow!("Could not find config directory; set PADLINK_DATA_DIR"))?
                .join(DATA_DIR_NAME),
        };

        let secret_store = match non_empty("PADLINK_SECRET_STORE")
            .map(|v| v.trim().to_ascii_lowercase())
            .as_deref()
        {
            None | Some("auto") => None,
            Some("keyring") => Some(SecretBackend::Keyring),
            Some("file") => Some(SecretBackend::File),
            Some(other) => bail!(
                "Unknown PADLINK_SECRET_STORE value '{}' (expected auto, keyring or file)",
                other
            ),
        };

        Ok(Self {
            server_url,
            device_name: non_empty("PADLINK_DEVICE_NAME").map(|v| v.trim().to_string()),
            data_dir,
            secret_store,
        })
    }

    /// Replace the server URL, e.g. from a command-line flag.
    pub fn with_server_url(mut self, url: &str) -> Self {
        self.server_url = url.trim().trim_end_matches('/').to_string();
        self
    }
}
