//! Typed application actions and server administration calls.

use std::time::Duration;

use log::{debug, info};
use padlink_core::link::RetryPolicy;

use crate::client::TransportClient;
use crate::error::{DeviceLinkError, Result};
use crate::pairing::NETWORK_STATUS_PATH;
use crate::types::{
    AccessInfo, AccessMode, AccessModeRequest, AccessModeResponse, AllowedOriginsResponse,
    AuthTokenRequest, AuthTokenResponse, CommandResponse, ConnectionStatusResponse,
    DeviceRegistration, MouseActionRequest, NetworkStatusResponse, OriginRequest,
    SendTextRequest, ShortcutRequest, STATUS_SUCCESS,
};

pub const SEND_TEXT_PATH: &str = "/send";
pub const SHORTCUT_PATH: &str = "/api/shortcut/execute";
pub const MOUSE_ACTION_PATH: &str = "/api/mouse/execute";
pub const AUTH_TOKEN_PATH: &str = "/api/network/auth-token";
pub const PAIR_DEVICE_PATH: &str = "/api/network/pair-device";
pub const UNPAIR_DEVICE_PATH: &str = "/api/network/unpair-device";
pub const CONNECTION_STATUS_PATH: &str = "/api/heartbeat/status";
pub const ACCESS_MODE_PATH: &str = "/api/network/access-mode";
pub const ALLOWED_ORIGINS_PATH: &str = "/api/network/allowed-origins";
pub const ACCESS_INFO_PATH: &str = "/api/desktop/access-info";

fn send_text_policy() -> RetryPolicy {
    RetryPolicy::default()
        .with_timeout(Duration::from_secs(10))
        .with_max_retries(2)
}

fn shortcut_policy() -> RetryPolicy {
    RetryPolicy::default()
        .with_timeout(Duration::from_secs(5))
        .with_max_retries(1)
}

// Pointer input is only useful in real time; a late retry would misplace it.
fn mouse_policy() -> RetryPolicy {
    RetryPolicy::no_retry(Duration::from_secs(3))
}

/// Commands a paired device sends to the desktop.
#[derive(Debug, Clone)]
pub struct DesktopActions {
    transport: TransportClient,
}

impl DesktopActions {
    pub fn new(transport: TransportClient) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &TransportClient {
        &self.transport
    }

    /// Type `msg` on the desktop.
    pub async fn send_text(&self, msg: &str) -> Result<()> {
        if msg.is_empty() {
            return Err(DeviceLinkError::invalid_request("Message must not be empty"));
        }
        let body = SendTextRequest {
            msg: msg.to_string(),
        };
        self.command(SEND_TEXT_PATH, &body, send_text_policy()).await
    }

    /// Trigger a key combination such as `ctrl+c`.
    pub async fn execute_shortcut(&self, shortcut: &str) -> Result<()> {
        let body = ShortcutRequest {
            shortcut: shortcut.to_string(),
        };
        self.command(SHORTCUT_PATH, &body, shortcut_policy()).await
    }

    pub async fn execute_mouse_action(&self, action: &str) -> Result<()> {
        let body = MouseActionRequest {
            action: action.to_string(),
        };
        self.command(MOUSE_ACTION_PATH, &body, mouse_policy()).await
    }

    /// Turn token authentication on or off on the server.
    ///
    /// A token issued by the server is installed into the session so this
    /// device keeps working once authentication is enforced.
    pub async fn configure_auth_token(
        &self,
        enabled: bool,
        expiry_hours: Option<u32>,
    ) -> Result<AuthTokenResponse> {
        let body = AuthTokenRequest {
            enabled,
            expiry_hours,
        };
        let response: AuthTokenResponse = self.transport.post(AUTH_TOKEN_PATH, &body, None).await?;

        if let Some(token) = response.token.as_deref().filter(|t| !t.trim().is_empty()) {
            if response.enabled {
                info!("[Actions] Server issued a new token; updating session");
                self.transport.session().set_token(token);
            }
        }
        Ok(response)
    }

    pub async fn pair_device(&self, device_id: &str, name: &str) -> Result<CommandResponse> {
        let body = DeviceRegistration {
            device_id: device_id.to_string(),
            name: name.to_string(),
        };
        let response: CommandResponse = self.transport.post(PAIR_DEVICE_PATH, &body, None).await?;
        ensure_success(&response)?;
        Ok(response)
    }

    pub async fn unpair_device(&self, device_id: &str) -> Result<CommandResponse> {
        if device_id.trim().is_empty() {
            return Err(DeviceLinkError::invalid_request("Device id must not be empty"));
        }
        let path = format!(
            "{}/{}",
            UNPAIR_DEVICE_PATH,
            urlencoding::encode(device_id)
        );
        let response: CommandResponse = self.transport.delete(&path, None).await?;
        ensure_success(&response)?;
        Ok(response)
    }

    /// Devices the server currently tracks, keyed by device id.
    pub async fn connection_status(&self) -> Result<ConnectionStatusResponse> {
        self.transport.get(CONNECTION_STATUS_PATH, None).await
    }

    /// Server-side network configuration: access mode, auth, paired devices.
    pub async fn network_status(&self) -> Result<NetworkStatusResponse> {
        self.transport.get(NETWORK_STATUS_PATH, None).await
    }

    pub async fn set_access_mode(&self, mode: AccessMode) -> Result<AccessModeResponse> {
        let body = AccessModeRequest { mode };
        let response: AccessModeResponse =
            self.transport.post(ACCESS_MODE_PATH, &body, None).await?;
        if response.status.as_deref() != Some(STATUS_SUCCESS) {
            let reason = response
                .message
                .clone()
                .unwrap_or_else(|| "missing success marker".to_string());
            return Err(DeviceLinkError::client(200, reason));
        }
        info!("[Actions] Access mode set to {}", mode);
        Ok(response)
    }

    pub async fn allowed_origins(&self) -> Result<Vec<String>> {
        let response: AllowedOriginsResponse = self.transport.get(ALLOWED_ORIGINS_PATH, None).await?;
        Ok(response.allowed_origins)
    }

    /// Returns the origin list after the change.
    pub async fn add_allowed_origin(&self, origin: &str) -> Result<Vec<String>> {
        let origin = non_empty_origin(origin)?;
        let body = OriginRequest {
            origin: origin.to_string(),
        };
        let response: AllowedOriginsResponse =
            self.transport.post(ALLOWED_ORIGINS_PATH, &body, None).await?;
        Ok(response.allowed_origins)
    }

    /// Returns the origin list after the change. An origin the server does not
    /// know fails with a 404 client error.
    pub async fn remove_allowed_origin(&self, origin: &str) -> Result<Vec<String>> {
        let origin = non_empty_origin(origin)?;
        let path = format!("{}/{}", ALLOWED_ORIGINS_PATH, urlencoding::encode(origin));
        let response: AllowedOriginsResponse = self.transport.delete(&path, None).await?;
        Ok(response.allowed_origins)
    }

    /// Addresses the desktop advertises for phones on the local network.
    pub async fn access_info(&self) -> Result<AccessInfo> {
        self.transport.get(ACCESS_INFO_PATH, None).await
    }

    async fn command<B: serde::Serialize>(
        &self,
        path: &str,
        body: &B,
        policy: RetryPolicy,
    ) -> Result<()> {
        let response: CommandResponse = self.transport.post(path, body, Some(policy)).await?;
        ensure_success(&response)?;
        debug!("[Actions] {} acknowledged", path);
        Ok(())
    }
}

fn non_empty_origin(origin: &str) -> Result<&str> {
    let origin = origin.trim();
    if origin.is_empty() {
        return Err(DeviceLinkError::invalid_request("Origin must not be empty"));
    }
    Ok(origin)
}

/// A 2xx without `status: "success"` is still a rejection.
fn ensure_success(response: &CommandResponse) -> Result<()> {
    if response.is_success() {
        Ok(())
    } else {
        Err(DeviceLinkError::client(200, response.failure_reason()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkStatusMonitor;
    use crate::session::AuthSession;
    use crate::test_support::{MockOutcome, MockServer};
    use std::sync::Arc;

    const OK: &str = r#"{"status":"success","message":"ok"}"#;

    fn actions(base_url: &str) -> DesktopActions {
        let session = Arc::new(AuthSession::in_memory());
        session.set_token("tok");
        DesktopActions::new(TransportClient::new(
            base_url,
            session,
            Arc::new(NetworkStatusMonitor::new()),
        ))
    }

    #[tokio::test]
    async fn send_text_posts_message_with_bearer() {
        let server = MockServer::start(|_| MockOutcome::json(200, OK)).await;
        let actions = actions(&server.base_url);

        actions.send_text("hello 世界").await.expect("sent");

        let requests = server.requests().await;
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, SEND_TEXT_PATH);
        assert_eq!(requests[0].json()["msg"], "hello 世界");
        assert_eq!(requests[0].authorization(), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn empty_text_is_rejected_locally() {
        let server = MockServer::start(|_| MockOutcome::json(200, OK)).await;
        let actions = actions(&server.base_url);

        let err = actions.send_text("").await.expect_err("empty");
        assert!(matches!(err, DeviceLinkError::InvalidRequest(_)));
        assert!(server.requests().await.is_empty());
    }

    #[tokio::test]
    async fn missing_success_marker_is_surfaced() {
        let server = MockServer::start(|_| {
            MockOutcome::json(200, r#"{"status":"error","message":"unsupported shortcut"}"#)
        })
        .await;
        let actions = actions(&server.base_url);

        let err = actions
            .execute_shortcut("hyper+q")
            .await
            .expect_err("rejected");

        assert_eq!(err.user_message(), "unsupported shortcut");
        assert_eq!(server.requests().await[0].json()["shortcut"], "hyper+q");
    }

    #[tokio::test]
    async fn shortcut_retries_once_on_server_error() {
        let server = MockServer::scripted(vec![
            MockOutcome::json(503, r#"{"detail":"busy"}"#),
            MockOutcome::json(200, OK),
        ])
        .await;
        let actions = actions(&server.base_url);

        // Default 1s delay before the single retry.
        actions.execute_shortcut("ctrl+c").await.expect("recovered");
        assert_eq!(server.count(SHORTCUT_PATH).await, 2);
    }

    #[tokio::test]
    async fn mouse_action_is_not_retried() {
        let server = MockServer::start(|_| MockOutcome::json(500, r#"{"detail":"boom"}"#)).await;
        let actions = actions(&server.base_url);

        let err = actions
            .execute_mouse_action("left_click")
            .await
            .expect_err("failed");

        assert!(matches!(err, DeviceLinkError::ServerError { status: 500, .. }));
        assert_eq!(server.count(MOUSE_ACTION_PATH).await, 1);
    }

    #[tokio::test]
    async fn enabling_auth_installs_issued_token() {
        let server = MockServer::start(|_| {
            MockOutcome::json(
                200,
                r#"{"enabled":true,"token":"fresh","expiry":"2026-10-18T00:00:00"}"#,
            )
        })
        .await;
        let actions = actions(&server.base_url);

        let response = actions
            .configure_auth_token(true, Some(24))
            .await
            .expect("configured");

        assert_eq!(response.token.as_deref(), Some("fresh"));
        assert_eq!(actions.transport().session().token().as_deref(), Some("fresh"));
        let body = server.requests().await[0].json();
        assert_eq!(body["enabled"], true);
        assert_eq!(body["expiry_hours"], 24);
    }

    #[tokio::test]
    async fn disabling_auth_keeps_current_token() {
        let server =
            MockServer::start(|_| MockOutcome::json(200, r#"{"enabled":false,"token":null}"#)).await;
        let actions = actions(&server.base_url);

        actions
            .configure_auth_token(false, None)
            .await
            .expect("configured");
        assert_eq!(actions.transport().session().token().as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn unpair_encodes_device_id_in_path() {
        let server = MockServer::start(|_| MockOutcome::json(200, OK)).await;
        let actions = actions(&server.base_url);

        actions
            .unpair_device("device 1/2")
            .await
            .expect("unpaired");

        let requests = server.requests().await;
        assert_eq!(requests[0].method, "DELETE");
        assert_eq!(requests[0].path, "/api/network/unpair-device/device%201%2F2");
    }

    #[tokio::test]
    async fn pair_device_sends_registration() {
        let server = MockServer::start(|_| MockOutcome::json(200, OK)).await;
        let actions = actions(&server.base_url);

        let response = actions
            .pair_device("device_1_abc", "Tablet")
            .await
            .expect("paired");

        assert_eq!(response.message.as_deref(), Some("ok"));
        let body = server.requests().await[0].json();
        assert_eq!(body["device_id"], "device_1_abc");
        assert_eq!(body["name"], "Tablet");
    }

    #[tokio::test]
    async fn connection_status_lists_devices() {
        let server = MockServer::start(|_| {
            MockOutcome::json(
                200,
                r#"{"active_connections":1,"devices":{"device_1_abc":{"last_heartbeat":1700000000.5,"is_paired":true,"status":"online","name":"Phone"}}}"#,
            )
        })
        .await;
        let actions = actions(&server.base_url);

        let status = actions.connection_status().await.expect("status");

        assert_eq!(status.active_connections, 1);
        let device = &status.devices["device_1_abc"];
        assert!(device.is_paired);
        assert_eq!(device.name.as_deref(), Some("Phone"));
        assert_eq!(server.requests().await[0].method, "GET");
    }

    #[tokio::test]
    async fn network_status_reports_server_configuration() {
        let server = MockServer::start(|_| {
            MockOutcome::json(
                200,
                r#"{"access_mode":"private","access_mode_description":"private ranges","auth_enabled":true,"token_expiry":"2026-10-18T09:00:00","paired_devices":[{"device_id":"device_1_abc","name":"Phone","paired_at":"2026-10-17T09:00:00","last_seen":"2026-10-17T10:00:00"}],"https_enabled":false,"cert_info":null,"allowed_origins":["http://localhost:3000"]}"#,
            )
        })
        .await;
        let actions = actions(&server.base_url);

        let status = actions.network_status().await.expect("status");

        assert_eq!(status.access_mode, "private");
        assert!(status.auth_enabled);
        assert_eq!(status.paired_devices.len(), 1);
        assert_eq!(status.paired_devices[0].device_id, "device_1_abc");
        assert_eq!(status.allowed_origins, vec!["http://localhost:3000"]);
        let requests = server.requests().await;
        assert_eq!(requests[0].path, NETWORK_STATUS_PATH);
        assert_eq!(requests[0].authorization(), Some("Bearer tok"));
    }

    #[tokio::test]
    async fn set_access_mode_posts_lowercase_mode() {
        let server = MockServer::start(|_| {
            MockOutcome::json(
                200,
                r#"{"status":"success","message":"updated","access_mode":"lan","description":"LAN"}"#,
            )
        })
        .await;
        let actions = actions(&server.base_url);

        let response = actions
            .set_access_mode(AccessMode::Lan)
            .await
            .expect("updated");

        assert_eq!(response.access_mode.as_deref(), Some("lan"));
        let requests = server.requests().await;
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].path, ACCESS_MODE_PATH);
        assert_eq!(requests[0].json()["mode"], "lan");
    }

    #[tokio::test]
    async fn rejected_access_mode_is_not_retried() {
        let server = MockServer::start(|_| {
            MockOutcome::json(400, r#"{"detail":"invalid access mode"}"#)
        })
        .await;
        let actions = actions(&server.base_url);

        let err = actions
            .set_access_mode(AccessMode::All)
            .await
            .expect_err("rejected");

        assert_eq!(err.status_code(), Some(400));
        assert_eq!(err.user_message(), "invalid access mode");
        assert_eq!(server.count(ACCESS_MODE_PATH).await, 1);
    }

    #[tokio::test]
    async fn allowed_origins_can_be_listed_added_and_removed() {
        let server = MockServer::start(|request| match request.method.as_str() {
            "GET" => MockOutcome::json(
                200,
                r#"{"status":"success","allowed_origins":["http://localhost:3000"],"access_mode":"lan"}"#,
            ),
            "POST" => MockOutcome::json(
                200,
                r#"{"status":"success","message":"added","allowed_origins":["http://localhost:3000","https://pad.example"]}"#,
            ),
            _ => MockOutcome::json(200, r#"{"status":"success","message":"removed","allowed_origins":[]}"#),
        })
        .await;
        let actions = actions(&server.base_url);

        assert_eq!(
            actions.allowed_origins().await.expect("list"),
            vec!["http://localhost:3000"]
        );
        assert_eq!(
            actions
                .add_allowed_origin(" https://pad.example ")
                .await
                .expect("add")
                .len(),
            2
        );
        assert!(actions
            .remove_allowed_origin("https://pad.example")
            .await
            .expect("remove")
            .is_empty());

        let requests = server.requests().await;
        assert_eq!(requests[1].json()["origin"], "https://pad.example");
        assert_eq!(requests[2].method, "DELETE");
        assert_eq!(
            requests[2].path,
            "/api/network/allowed-origins/https%3A%2F%2Fpad.example"
        );
    }

    #[tokio::test]
    async fn unknown_origin_removal_surfaces_not_found() {
        let server = MockServer::start(|_| MockOutcome::json(404, r#"{"detail":"origin not found"}"#)).await;
        let actions = actions(&server.base_url);

        let err = actions
            .remove_allowed_origin("https://nowhere.example")
            .await
            .expect_err("404");
        assert_eq!(err.status_code(), Some(404));

        let err = actions.add_allowed_origin("  ").await.expect_err("empty");
        assert!(matches!(err, DeviceLinkError::InvalidRequest(_)));
        assert_eq!(server.requests().await.len(), 1);
    }

    #[tokio::test]
    async fn access_info_reports_phone_url() {
        let server = MockServer::start(|_| {
            MockOutcome::json(
                200,
                r#"{"network_ip":"192.168.1.20","hotspot_ip":"192.168.1.20","port":19653,"phone_url":"http://192.168.1.20:19653/phone","qrcode_url":"http://192.168.1.20:19653/phone","localhost_url":"http://localhost:19653"}"#,
            )
        })
        .await;
        let actions = actions(&server.base_url);

        let info = actions.access_info().await.expect("info");

        assert_eq!(info.network_ip.as_deref(), Some("192.168.1.20"));
        assert_eq!(info.port, 19653);
        assert_eq!(info.phone_url, "http://192.168.1.20:19653/phone");
        assert_eq!(info.error, None);
        assert_eq!(server.requests().await[0].path, ACCESS_INFO_PATH);
    }
}
