//! Domain models shared by the PadLink companion client.
//!
//! Nothing in this crate performs network I/O. Identity generation, pairing
//! payloads, retry arithmetic and the secret storage seam live here so the
//! transport crate and the console binary agree on a single definition.

pub mod identity;
pub mod link;
pub mod secrets;

pub use identity::DeviceIdentity;
