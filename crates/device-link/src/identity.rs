//! Persistence of the device identity.

use log::{debug, info, warn};
use padlink_core::identity::is_well_formed_device_id;
use padlink_core::secrets::SecretStore;
use padlink_core::DeviceIdentity;

use crate::error::Result;

/// Storage key of the persisted identity JSON.
pub const DEVICE_IDENTITY_KEY: &str = "device_identity";

/// Default display name derived from platform signals.
pub fn default_device_name() -> String {
    let host = gethostname::gethostname().to_string_lossy().trim().to_string();
    if host.is_empty() || host == "localhost" {
        format!("{} device", std::env::consts::OS)
    } else {
        host
    }
}

/// Load the install's identity, generating and persisting one on first use.
///
/// A stored identity that cannot be parsed is replaced; the id is otherwise
/// never regenerated.
pub fn load_or_create_identity(
    store: &dyn SecretStore,
    default_name: &str,
) -> Result<DeviceIdentity> {
    if let Some(json) = store.get_secret(DEVICE_IDENTITY_KEY)? {
        match serde_json::from_str::<DeviceIdentity>(&json) {
            Ok(identity) if is_well_formed_device_id(identity.id()) => {
                debug!("[Identity] Loaded device identity (device_id={})", identity.id());
                return Ok(identity);
            }
            Ok(identity) => {
                warn!(
                    "[Identity] Stored device id '{}' is malformed; generating a new one",
                    identity.id()
                );
            }
            Err(e) => warn!("[Identity] Failed to parse stored identity: {}", e),
        }
    }

    let identity = DeviceIdentity::generate(default_name);
    save_identity(store, &identity)?;
    info!("[Identity] Generated device identity (device_id={})", identity.id());
    Ok(identity)
}

/// Persist the identity, e.g. after a rename.
pub fn save_identity(store: &dyn SecretStore, identity: &DeviceIdentity) -> Result<()> {
    let json = serde_json::to_string(identity)?;
    store.set_secret(DEVICE_IDENTITY_KEY, &json)?;
    Ok(())
}
