//! Pairing flow: unauthenticated device to paired, token-holding device.
//!
//! ```text
//! Unpaired -> CheckingStatus -> Paired
//!                            -> AwaitingQrScan -> AwaitingTokenInput -> Verifying -> Paired
//!                                                                                -> Failed
//! ```
//!
//! Only `Paired` outlives the process, and only through the persisted token;
//! every run starts `Unpaired` and checks the server once.

use std::sync::Mutex;
use std::time::Duration;

use log::{debug, info, warn};
use padlink_core::link::{PairingRequest, PairingState, PairingStatus, RetryPolicy};
use padlink_core::DeviceIdentity;
use reqwest::Method;

use crate::client::TransportClient;
use crate::error::{DeviceLinkError, Result};
use crate::types::{DeviceRegistration, VerifyDeviceResponse};

pub const VERIFY_DEVICE_PATH: &str = "/api/network/verify-device";
pub const NETWORK_STATUS_PATH: &str = "/api/network/status";

const PAIRING_TIMEOUT: Duration = Duration::from_secs(10);

fn pairing_policy() -> RetryPolicy {
    RetryPolicy::default()
        .with_timeout(PAIRING_TIMEOUT)
        .with_max_retries(1)
}

pub struct PairingStateMachine {
    transport: TransportClient,
    identity: DeviceIdentity,
    state: Mutex<PairingState>,
}

impl PairingStateMachine {
    pub fn new(transport: TransportClient, identity: DeviceIdentity) -> Self {
        Self {
            transport,
            identity,
            state: Mutex::new(PairingState::Unpaired),
        }
    }

    pub fn state(&self) -> PairingState {
        self.state.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    fn transition(&self, next: PairingState) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if *state != next {
            debug!("[Pairing] {:?} -> {:?}", *state, next);
            *state = next;
        }
    }

    /// Ask the server whether this device is already paired.
    ///
    /// Never fails: an authentication rejection or any transport failure is
    /// reported as "not paired" so the caller simply prompts for pairing.
    pub async fn check_pairing_status(&self) -> PairingStatus {
        self.transition(PairingState::CheckingStatus);

        let body = DeviceRegistration {
            device_id: self.identity.id().to_string(),
            name: self.identity.name.clone(),
        };
        let result = self
            .transport
            .post::<_, VerifyDeviceResponse>(VERIFY_DEVICE_PATH, &body, Some(pairing_policy()))
            .await;

        let status = match result {
            Ok(response) if response.paired => {
                info!("[Pairing] Device {} is paired", self.identity.id());
                PairingStatus {
                    paired: true,
                    message: response.message,
                }
            }
            Ok(response) => PairingStatus {
                paired: false,
                message: response.message,
            },
            Err(DeviceLinkError::Unauthenticated) => {
                debug!("[Pairing] Status check requires a token; treating as unpaired");
                PairingStatus::unpaired("Pairing required")
            }
            Err(err) => {
                warn!("[Pairing] Status check failed, treating as unpaired: {}", err);
                PairingStatus::unpaired(err.user_message())
            }
        };

        if status.paired {
            self.transition(PairingState::Paired);
        } else {
            self.transition(PairingState::AwaitingQrScan {
                message: status.message.clone(),
            });
        }
        status
    }

    /// Scannable payload announcing this device to the desktop.
    pub fn generate_pairing_payload(&self) -> Result<String> {
        let request = PairingRequest::new(&self.identity, chrono::Utc::now().timestamp_millis());
        Ok(request.to_payload()?)
    }

    /// Switch from showing the QR code to manual token entry. Returns false
    /// when a check or verification is in progress or the device is paired.
    pub fn begin_token_entry(&self) -> bool {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        match *state {
            PairingState::Unpaired
            | PairingState::AwaitingQrScan { .. }
            | PairingState::Failed { .. } => {
                *state = PairingState::AwaitingTokenInput;
                true
            }
            PairingState::AwaitingTokenInput => true,
            _ => false,
        }
    }

    /// Verify a user-supplied token with an authenticated probe.
    ///
    /// The candidate is installed in the session first; on any failure it is
    /// removed again and the state becomes `Failed` with a readable reason.
    pub async fn verify_token(&self, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            self.transition(PairingState::Failed {
                reason: "Token must not be empty".to_string(),
            });
            return Err(DeviceLinkError::invalid_request("Token must not be empty"));
        }

        self.transition(PairingState::Verifying);
        let session = self.transport.session();
        session.set_token(token);

        match self
            .transport
            .request(Method::GET, NETWORK_STATUS_PATH, None, &pairing_policy())
            .await
        {
            Ok(_) => {
                info!("[Pairing] Token accepted; device {} paired", self.identity.id());
                self.transition(PairingState::Paired);
                Ok(())
            }
            Err(err) => {
                session.clear();
                let reason = err.user_message();
                warn!("[Pairing] Token verification failed: {}", reason);
                self.transition(PairingState::Failed { reason });
                Err(err)
            }
        }
    }

    /// Forget the credential and start over.
    pub fn reset(&self) {
        self.transport.session().clear();
        self.transition(PairingState::Unpaired);
    }
}
