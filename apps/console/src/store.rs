//! Secret storage for the console: the platform keychain where one is
//! available, a private JSON file in the data directory otherwise.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use keyring::Entry;
use padlink_core::secrets::{SecretStore, SecretStoreError};

const SECRETS_FILE: &str = "secrets.json";

/// Service name the keychain entries are filed under.
pub const KEYRING_SERVICE: &str = "padlink";

/// Where secrets live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretBackend {
    Keyring,
    File,
}

/// Open the configured backend, or detect one when `preferred` is `None`.
///
/// A detected keychain that fails its first read falls back to the file
/// store; an explicitly requested keychain does not.
pub fn open_secret_store(
    preferred: Option<SecretBackend>,
    data_dir: &Path,
) -> anyhow::Result<Arc<dyn SecretStore>> {
    let backend = preferred.unwrap_or_else(detect_backend);

    if backend == SecretBackend::Keyring {
        let store = KeyringSecretStore::new(KEYRING_SERVICE);
        match store.check_access() {
            Ok(()) => {
                tracing::debug!(service = KEYRING_SERVICE, "Using system keychain for secrets");
                return Ok(Arc::new(store));
            }
            Err(err) if preferred.is_none() => {
                tracing::warn!(error = %err, "System keychain unavailable, using file store");
            }
            Err(err) => return Err(err).context("System keychain unavailable"),
        }
    }

    let store = FileSecretStore::open(data_dir)
        .with_context(|| format!("Failed to open data dir {}", data_dir.display()))?;
    tracing::debug!(path = %store.path().display(), "Using file store for secrets");
    Ok(Arc::new(store))
}

/// Pick the keychain on macOS and Windows, and on Linux desktops that are not
/// WSL. Headless hosts get the file store.
pub fn detect_backend() -> SecretBackend {
    #[cfg(any(target_os = "macos", target_os = "windows"))]
    {
        SecretBackend::Keyring
    }

    #[cfg(target_os = "linux")]
    {
        let proc_version = fs::read_to_string("/proc/version").ok();
        linux_backend(|key| std::env::var(key).ok(), proc_version.as_deref())
    }

    #[cfg(not(any(target_os = "macos", target_os = "windows", target_os = "linux")))]
    {
        SecretBackend::File
    }
}

#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn linux_backend(
    lookup: impl Fn(&str) -> Option<String>,
    proc_version: Option<&str>,
) -> SecretBackend {
    let is_wsl = proc_version.is_some_and(|v| v.contains("Microsoft") || v.contains("WSL"))
        || lookup("WSL_DISTRO_NAME").is_some()
        || lookup("WSL_INTEROP").is_some();
    if is_wsl {
        return SecretBackend::File;
    }

    // Secret Service daemons need a session bus and a display.
    let has_desktop = (lookup("DISPLAY").is_some() || lookup("WAYLAND_DISPLAY").is_some())
        && lookup("DBUS_SESSION_BUS_ADDRESS").is_some();
    if has_desktop {
        SecretBackend::Keyring
    } else {
        SecretBackend::File
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Keychain
// ─────────────────────────────────────────────────────────────────────────────

/// Secrets in the platform keychain, one entry per key.
#[derive(Debug)]
pub struct KeyringSecretStore {
    service: String,
    entries: Mutex<HashMap<String, Entry>>,
}

impl KeyringSecretStore {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// One read against the keychain; a missing entry counts as access.
    pub fn check_access(&self) -> Result<(), SecretStoreError> {
        self.get_secret(padlink_device_link::session::AUTH_TOKEN_KEY).map(|_| ())
    }

    fn with_entry<T>(
        &self,
        key: &str,
        op: impl FnOnce(&Entry) -> keyring::Result<T>,
    ) -> Result<keyring::Result<T>, SecretStoreError> {
        let mut entries = self.entries.lock().map_err(|_| SecretStoreError::Poisoned)?;
        let entry = match entries.entry(key.to_string()) {
            std::collections::hash_map::Entry::Occupied(slot) => slot.into_mut(),
            std::collections::hash_map::Entry::Vacant(slot) => {
                let entry = Entry::new(&self.service, key).map_err(|e| {
                    SecretStoreError::Backend(format!("failed to create keyring entry: {e}"))
                })?;
                slot.insert(entry)
            }
        };
        Ok(op(entry))
    }
}

fn backend_error(action: &str, err: keyring::Error) -> SecretStoreError {
    match err {
        keyring::Error::PlatformFailure(inner) => {
            SecretStoreError::Backend(format!("keychain refused to {action}: {inner}"))
        }
        keyring::Error::NoStorageAccess(inner) => {
            SecretStoreError::Backend(format!("no access to keychain to {action}: {inner}"))
        }
        other => SecretStoreError::Backend(format!("failed to {action}: {other}")),
    }
}

impl SecretStore for KeyringSecretStore {
    fn get_secret(&self, key: &str) -> Result<Option<String>, SecretStoreError> {
        match self.with_entry(key, |entry| entry.get_password())? {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(backend_error("read secret", err)),
        }
    }

    fn set_secret(&self, key: &str, value: &str) -> Result<(), SecretStoreError> {
        self.with_entry(key, |entry| entry.set_password(value))?
            .map_err(|err| backend_error("write secret", err))
    }

    fn delete_secret(&self, key: &str) -> Result<(), SecretStoreError> {
        match self.with_entry(key, |entry| entry.delete_credential())? {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(backend_error("delete secret", err)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File fallback
// ─────────────────────────────────────────────────────────────────────────────

/// Stores every secret in one JSON object readable only by the owner. Writes
/// go to a sibling temp file that is renamed into place.
#[derive(Debug)]
pub struct FileSecretStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileSecretStore {
    pub fn open(data_dir: &Path) -> Result<Self, SecretStoreError> {
        fs::create_dir_all(data_dir)?;
        Ok(Self {
            path: data_dir.join(SECRETS_FILE),
            lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, SecretStoreError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(e.into()),
        };
        if raw.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&raw)
            .map_err(|e| SecretStoreError::Corrupted(format!("{}: {}", self.path.display(), e)))
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> Result<(), SecretStoreError> {
        let json = serde_json::to_string_pretty(values)
            .map_err(|e| SecretStoreError::Corrupted(e.to_string()))?;
        let tmp = self.path.with_extension("json.tmp");

        // A leftover temp file would keep its old mode.
        match fs::remove_file(&tmp) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let mut options = fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options.open(&tmp)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        drop(file);

        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SecretStore for FileSecretStore {
    fn get_secret(&self, key: &str) -> Result<Option<String>, SecretStoreError> {
        let _guard = self.lock.lock().map_err(|_| SecretStoreError::Poisoned)?;
        Ok(self.read_all()?.remove(key))
    }

    fn set_secret(&self, key: &str, value: &str) -> Result<(), SecretStoreError> {
        let _guard = self.lock.lock().map_err(|_| SecretStoreError::Poisoned)?;
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());
        self.write_all(&values)
    }

    fn delete_secret(&self, key: &str) -> Result<(), SecretStoreError> {
        let _guard = self.lock.lock().map_err(|_| SecretStoreError::Poisoned)?;
        let mut values = self.read_all()?;
        if values.remove(key).is_some() {
            self.write_all(&values)?;
        }
        Ok(())
    }
}
