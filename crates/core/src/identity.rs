//! Stable device identity.

use rand::Rng;
use serde::{Deserialize, Serialize};

const DEVICE_ID_PREFIX: &str = "device_";
const DEVICE_ID_SUFFIX_LEN: usize = 9;
const BASE36_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Identity a companion device presents to the control server.
///
/// The `id` is generated once per install and never changes afterwards; the
/// `name` is what the desktop shows in its paired device list and can be
/// edited freely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceIdentity {
    id: String,
    pub name: String,
}

impl DeviceIdentity {
    /// Create a brand new identity using the current wall clock.
    pub fn generate(name: impl Into<String>) -> Self {
        let now_ms = chrono::Utc::now().timestamp_millis();
        Self {
            id: generate_device_id(now_ms, &mut rand::thread_rng()),
            name: name.into(),
        }
    }

    /// Rebuild an identity from previously persisted parts.
    pub fn from_parts(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }
}

/// Build a device id of the form `device_<unix-millis>_<base36 suffix>`.
pub fn generate_device_id<R: Rng + ?Sized>(timestamp_ms: i64, rng: &mut R) -> String {
    let suffix: String = (0..DEVICE_ID_SUFFIX_LEN)
        .map(|_| BASE36_ALPHABET[rng.gen_range(0..BASE36_ALPHABET.len())] as char)
        .collect();
    format!("{}{}_{}", DEVICE_ID_PREFIX, timestamp_ms, suffix)
}

/// Returns true for ids produced by [`generate_device_id`].
pub fn is_well_formed_device_id(id: &str) -> bool {
    let Some(rest) = id.strip_prefix(DEVICE_ID_PREFIX) else {
        return false;
    };
    let Some((timestamp, suffix)) = rest.split_once('_') else {
        return false;
    };
    !timestamp.is_empty()
        && timestamp.bytes().all(|b| b.is_ascii_digit())
        && suffix.len() == DEVICE_ID_SUFFIX_LEN
        && suffix.bytes().all(|b| BASE36_ALPHABET.contains(&b))
}
