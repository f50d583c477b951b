//! Resilient HTTP transport to the desktop control server.
//!
//! Every call goes through the same pipeline: offline gate, bearer header from
//! the shared [`AuthSession`], a per-call timeout that drops the in-flight
//! exchange, status classification, and bounded exponential backoff for
//! transient failures.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use padlink_core::link::{RetryClass, RetryPolicy, NETWORK_PROBE_TIMEOUT};
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::time::sleep;

use crate::error::{DeviceLinkError, Result};
use crate::network::{HealthProbe, NetworkStatusMonitor};
use crate::session::AuthSession;
use crate::types::ApiErrorResponse;

const MAX_LOG_BODY_CHARS: usize = 512;
const HEALTH_PATH: &str = "/health";

/// Raw response of a successful (2xx) call.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    status: u16,
    body: String,
}

impl TransportResponse {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    /// Decode the body as JSON.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_str(&self.body).map_err(|e| {
            log::error!(
                "[Transport] Failed to deserialize response. Body: {}, Error: {}",
                preview(&self.body),
                e
            );
            DeviceLinkError::Serialization(e)
        })
    }
}

/// Client for the desktop control server.
///
/// Constructed once and handed to every component that talks to the server;
/// clones share the same session, network monitor and connection pool.
#[derive(Debug, Clone)]
pub struct TransportClient {
    client: reqwest::Client,
    base_url: String,
    session: Arc<AuthSession>,
    network: Arc<NetworkStatusMonitor>,
    default_policy: RetryPolicy,
}

impl TransportClient {
    /// Create a new transport.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Server root (e.g., "http://192.168.1.20:19653")
    /// * `session` - Bearer credential shared with pairing and heartbeats
    /// * `network` - Connectivity monitor consulted before each attempt
    pub fn new(
        base_url: &str,
        session: Arc<AuthSession>,
        network: Arc<NetworkStatusMonitor>,
    ) -> Self {
        // Timeouts are enforced per call, not on the shared client.
        let client = reqwest::Client::builder()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            session,
            network,
            default_policy: RetryPolicy::default(),
        }
    }

    /// Replace the policy used by the convenience verbs when none is given.
    pub fn with_default_policy(mut self, policy: RetryPolicy) -> Self {
        self.default_policy = policy;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    pub fn network(&self) -> &Arc<NetworkStatusMonitor> {
        &self.network
    }

    pub fn default_policy(&self) -> RetryPolicy {
        self.default_policy
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn log_response(status: StatusCode, body: &str) {
        if status.is_success() {
            debug!("[Transport] Response status: {}", status);
            return;
        }
        debug!("[Transport] Response error ({}): {}", status, preview(body));
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Core request pipeline
    // ─────────────────────────────────────────────────────────────────────────

    /// Issue a request with timeout, retry and error classification.
    ///
    /// 401 clears the session and is never retried; other 4xx are never
    /// retried; 5xx, timeouts and connection failures are retried while the
    /// policy allows, waiting `retry_delay * factor^attempt` between attempts.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
        policy: &RetryPolicy,
    ) -> Result<TransportResponse> {
        let url = self.url(path);
        let mut attempt: u32 = 0;

        loop {
            if !self.network.is_online() {
                debug!("[Transport] {} {} skipped: offline", method, path);
                return Err(DeviceLinkError::NetworkUnavailable);
            }

            let err = match self
                .send_once(method.clone(), &url, body, policy.timeout, true)
                .await
            {
                Ok(response) => return Ok(response),
                Err(err) => err,
            };

            if err.retry_class() != RetryClass::Retryable || !policy.allows_retry(attempt) {
                debug!(
                    "[Transport] {} {} failed after {} attempt(s): {}",
                    method,
                    path,
                    attempt + 1,
                    err
                );
                return Err(err);
            }

            if !self.network.is_online() {
                debug!("[Transport] {} {} not retried: went offline", method, path);
                return Err(DeviceLinkError::NetworkUnavailable);
            }

            let backoff = policy.backoff_delay(attempt);
            warn!(
                "[Transport] {} {} retry attempt {}/{} in {:?}: {}",
                method,
                path,
                attempt + 1,
                policy.max_retries,
                backoff,
                err
            );
            sleep(backoff).await;
            attempt += 1;
        }
    }

    /// One exchange under a timeout. Dropping the exchange future on expiry
    /// aborts the in-flight call.
    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
        timeout: Duration,
        with_auth: bool,
    ) -> Result<TransportResponse> {
        let mut builder = self.client.request(method, url);
        if with_auth {
            // Re-read on every attempt so a cleared token is never resent.
            if let Some(token) = self.session.token() {
                builder = builder.header(AUTHORIZATION, bearer_header(&token)?);
            }
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, text))
        };

        let (status, text) = match tokio::time::timeout(timeout, exchange).await {
            Ok(Ok(parts)) => parts,
            Ok(Err(err)) if err.is_timeout() => return Err(DeviceLinkError::Timeout),
            Ok(Err(err)) => return Err(DeviceLinkError::Transport(err)),
            Err(_) => {
                debug!("[Transport] Aborted {} after {:?}", url, timeout);
                return Err(DeviceLinkError::Timeout);
            }
        };
        Self::log_response(status, &text);

        if status.is_success() {
            return Ok(TransportResponse {
                status: status.as_u16(),
                body: text,
            });
        }

        if status == StatusCode::UNAUTHORIZED {
            // Only a rejected bearer token ends the session.
            if with_auth && self.session.clear() {
                warn!("[Transport] Server rejected the bearer token; session cleared");
            }
            return Err(DeviceLinkError::Unauthenticated);
        }

        Err(DeviceLinkError::from_status(
            status.as_u16(),
            error_detail(status, &text),
        ))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Convenience verbs
    // ─────────────────────────────────────────────────────────────────────────

    /// GET and decode JSON.
    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        policy: Option<RetryPolicy>,
    ) -> Result<T> {
        let policy = policy.unwrap_or(self.default_policy);
        self.request(Method::GET, path, None, &policy).await?.json()
    }

    /// POST a JSON body and decode JSON.
    pub async fn post<B, T>(&self, path: &str, body: &B, policy: Option<RetryPolicy>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let policy = policy.unwrap_or(self.default_policy);
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, path, Some(&body), &policy)
            .await?
            .json()
    }

    /// PUT a JSON body and decode JSON.
    pub async fn put<B, T>(&self, path: &str, body: &B, policy: Option<RetryPolicy>) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let policy = policy.unwrap_or(self.default_policy);
        let body = serde_json::to_value(body)?;
        self.request(Method::PUT, path, Some(&body), &policy)
            .await?
            .json()
    }

    /// DELETE and decode JSON.
    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        policy: Option<RetryPolicy>,
    ) -> Result<T> {
        let policy = policy.unwrap_or(self.default_policy);
        self.request(Method::DELETE, path, None, &policy)
            .await?
            .json()
    }

    /// Single unauthenticated GET `/health` that ignores the offline gate, so
    /// the monitor can notice when the server comes back.
    pub async fn probe_health(&self) -> Result<()> {
        let url = self.url(HEALTH_PATH);
        self.send_once(Method::GET, &url, None, NETWORK_PROBE_TIMEOUT, false)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl HealthProbe for TransportClient {
    async fn probe(&self) -> bool {
        match self.probe_health().await {
            Ok(()) => true,
            Err(err) => {
                debug!("[Transport] Health probe failed: {}", err);
                false
            }
        }
    }
}

fn bearer_header(token: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| DeviceLinkError::invalid_request("Invalid access token format"))
}

fn error_detail(status: StatusCode, body: &str) -> String {
    serde_json::from_str::<ApiErrorResponse>(body)
        .ok()
        .and_then(ApiErrorResponse::into_detail)
        .filter(|detail| !detail.is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("Request failed")
                    .to_string()
            } else {
                format!("Request failed: {}", preview(body))
            }
        })
}

fn preview(body: &str) -> String {
    let mut preview = body.chars().take(MAX_LOG_BODY_CHARS).collect::<String>();
    if body.chars().count() > MAX_LOG_BODY_CHARS {
        preview.push_str("...");
    }
    preview
}
