//! Periodic liveness signal for the paired desktop.

use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use padlink_core::link::{
    HeartbeatConfig, RetryPolicy, HEARTBEAT_CONFIG_FETCH_TIMEOUT, HEARTBEAT_MAX_RETRIES,
};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::client::TransportClient;
use crate::error::{DeviceLinkError, Result};
use crate::types::{HeartbeatConfigResponse, HeartbeatRequest, HeartbeatResponse, STATUS_SUCCESS};

pub const HEARTBEAT_CONFIG_PATH: &str = "/api/heartbeat/config";
pub const HEARTBEAT_PATH: &str = "/api/heartbeat/heartbeat";

/// Counters for status display.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeartbeatStats {
    pub config: Option<HeartbeatConfig>,
    pub sent: u64,
    pub failed: u64,
    pub skipped_ticks: u64,
    pub last_success_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Sends `{device_id, device_name}` to the server once per configured interval.
///
/// Sends never overlap: the loop awaits each heartbeat before the next tick,
/// and ticks that elapse while a heartbeat is outstanding are skipped.
pub struct HeartbeatScheduler {
    transport: TransportClient,
    device_id: String,
    task: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<Mutex<HeartbeatStats>>,
}

impl HeartbeatScheduler {
    pub fn new(transport: TransportClient, device_id: impl Into<String>) -> Self {
        Self {
            transport,
            device_id: device_id.into(),
            task: Mutex::new(None),
            stats: Arc::new(Mutex::new(HeartbeatStats::default())),
        }
    }

    /// Start (or restart) the heartbeat loop.
    ///
    /// The config is fetched once per start; the first heartbeat goes out right
    /// after it, then one per interval until [`stop`](Self::stop).
    pub fn start(&self, device_name: impl Into<String>) {
        let request = HeartbeatRequest {
            device_id: self.device_id.clone(),
            device_name: device_name.into(),
        };
        let transport = self.transport.clone();
        let stats = Arc::clone(&self.stats);

        let mut task = self.task.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(previous) = task.take() {
            previous.abort();
            debug!("[Heartbeat] Restarting; previous loop aborted");
        }

        *task = Some(tokio::spawn(async move {
            let config = fetch_config(&transport).await;
            lock_stats(&stats).config = Some(config);
            info!(
                "[Heartbeat] Started for {} (interval={:?}, timeout={:?})",
                request.device_id, config.interval, config.timeout
            );

            let policy = RetryPolicy::default()
                .with_timeout(config.timeout)
                .with_max_retries(HEARTBEAT_MAX_RETRIES);
            let mut ticker = tokio::time::interval(config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let started = Instant::now();
                let outcome = send_heartbeat(&transport, &request, policy).await;
                let skipped = (started.elapsed().as_nanos() / config.interval.as_nanos().max(1))
                    .try_into()
                    .unwrap_or(u64::MAX);

                let mut current = lock_stats(&stats);
                current.skipped_ticks = current.skipped_ticks.saturating_add(skipped);
                match outcome {
                    Ok(()) => {
                        current.sent += 1;
                        current.last_success_at = Some(Utc::now());
                        current.last_error = None;
                    }
                    Err(err) => {
                        current.failed += 1;
                        current.last_error = Some(err.to_string());
                        match err {
                            DeviceLinkError::NetworkUnavailable => {
                                debug!("[Heartbeat] Skipped: offline")
                            }
                            other => warn!("[Heartbeat] Failed: {}", other),
                        }
                    }
                }
                if skipped > 0 {
                    debug!("[Heartbeat] Slow send; {} tick(s) coalesced", skipped);
                }
            }
        }));
    }

    /// Stop the loop. Safe to call when already stopped.
    pub fn stop(&self) {
        let handle = self.task.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(handle) = handle {
            handle.abort();
            info!("[Heartbeat] Stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    pub fn stats(&self) -> HeartbeatStats {
        lock_stats(&self.stats).clone()
    }

    pub fn sent_count(&self) -> u64 {
        lock_stats(&self.stats).sent
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        lock_stats(&self.stats).last_success_at
    }
}

impl Drop for HeartbeatScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock_stats(stats: &Mutex<HeartbeatStats>) -> std::sync::MutexGuard<'_, HeartbeatStats> {
    stats.lock().unwrap_or_else(|p| p.into_inner())
}

async fn fetch_config(transport: &TransportClient) -> HeartbeatConfig {
    let policy = RetryPolicy::no_retry(HEARTBEAT_CONFIG_FETCH_TIMEOUT);
    match transport
        .get::<HeartbeatConfigResponse>(HEARTBEAT_CONFIG_PATH, Some(policy))
        .await
    {
        Ok(response) => HeartbeatConfig::from_server_seconds(response.interval, response.timeout),
        Err(err) => {
            warn!(
                "[Heartbeat] Failed to fetch config, using defaults: {}",
                err
            );
            HeartbeatConfig::default()
        }
    }
}

async fn send_heartbeat(
    transport: &TransportClient,
    request: &HeartbeatRequest,
    policy: RetryPolicy,
) -> Result<()> {
    let response: HeartbeatResponse = transport.post(HEARTBEAT_PATH, request, Some(policy)).await?;
    if response.status != STATUS_SUCCESS {
        return Err(DeviceLinkError::client(
            200,
            response
                .message
                .unwrap_or_else(|| format!("status '{}'", response.status)),
        ));
    }
    debug!("[Heartbeat] Delivered for {}", request.device_id);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::NetworkStatusMonitor;
    use crate::session::AuthSession;
    use crate::test_support::{MockOutcome, MockServer};
    use std::time::Duration;

    const FAST_CONFIG: &str = r#"{"interval":0.1,"timeout":1,"message":"test"}"#;
    const OK: &str = r#"{"status":"success","timestamp":1.0,"message":"ok"}"#;

    fn scheduler(base_url: &str) -> HeartbeatScheduler {
        let transport = TransportClient::new(
            base_url,
            Arc::new(AuthSession::in_memory()),
            Arc::new(NetworkStatusMonitor::new()),
        );
        HeartbeatScheduler::new(transport, "device_1_abcdefghi")
    }

    async fn server_with(heartbeat: MockOutcome, config: MockOutcome) -> MockServer {
        MockServer::start(move |request| {
            if request.path == HEARTBEAT_CONFIG_PATH {
                config.clone()
            } else {
                heartbeat.clone()
            }
        })
        .await
    }

    #[tokio::test]
    async fn sends_immediately_then_every_interval() {
        let server = server_with(MockOutcome::json(200, OK), MockOutcome::json(200, FAST_CONFIG)).await;
        let heartbeat = scheduler(&server.base_url);

        heartbeat.start("Phone");
        tokio::time::sleep(Duration::from_millis(350)).await;
        heartbeat.stop();

        let count = server.count(HEARTBEAT_PATH).await;
        assert!((3..=5).contains(&count), "unexpected heartbeat count {}", count);

        let requests = server.requests().await;
        let first = requests
            .iter()
            .find(|r| r.path == HEARTBEAT_PATH)
            .expect("heartbeat sent");
        assert_eq!(first.method, "POST");
        assert_eq!(first.json()["device_id"], "device_1_abcdefghi");
        assert_eq!(first.json()["device_name"], "Phone");

        let stats = heartbeat.stats();
        assert_eq!(
            stats.config,
            Some(HeartbeatConfig {
                interval: Duration::from_millis(100),
                timeout: Duration::from_secs(1),
            })
        );
        assert!(stats.sent >= 3);
        assert_eq!(heartbeat.sent_count(), stats.sent);
        assert_eq!(heartbeat.last_success(), stats.last_success_at);
        assert!(stats.last_success_at.is_some());
    }

    #[tokio::test]
    async fn double_start_keeps_single_loop() {
        let server = server_with(MockOutcome::json(200, OK), MockOutcome::json(200, FAST_CONFIG)).await;
        let heartbeat = scheduler(&server.base_url);

        heartbeat.start("Phone");
        heartbeat.start("Phone");
        tokio::time::sleep(Duration::from_millis(350)).await;
        heartbeat.stop();

        let count = server.count(HEARTBEAT_PATH).await;
        assert!((3..=5).contains(&count), "restart leaked a loop: {}", count);
        assert_eq!(server.count(HEARTBEAT_CONFIG_PATH).await, 1);
    }

    #[tokio::test]
    async fn stop_halts_sends_and_is_idempotent() {
        let server = server_with(MockOutcome::json(200, OK), MockOutcome::json(200, FAST_CONFIG)).await;
        let heartbeat = scheduler(&server.base_url);

        heartbeat.stop();
        assert!(!heartbeat.is_running());

        heartbeat.start("Phone");
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(heartbeat.is_running());
        heartbeat.stop();
        heartbeat.stop();
        assert!(!heartbeat.is_running());

        let count_at_stop = server.count(HEARTBEAT_PATH).await;
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(server.count(HEARTBEAT_PATH).await, count_at_stop);
    }

    #[tokio::test]
    async fn config_failure_falls_back_to_defaults() {
        let server = server_with(MockOutcome::json(200, OK), MockOutcome::json(500, "")).await;
        let heartbeat = scheduler(&server.base_url);

        heartbeat.start("Phone");
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(heartbeat.stats().config, Some(HeartbeatConfig::default()));
        // Default interval is 30s, so only the immediate heartbeat has gone out.
        assert_eq!(server.count(HEARTBEAT_PATH).await, 1);
        assert_eq!(server.count(HEARTBEAT_CONFIG_PATH).await, 1);
        heartbeat.stop();
    }

    #[tokio::test]
    async fn failures_are_swallowed_and_schedule_continues() {
        let server = server_with(
            MockOutcome::json(400, r#"{"detail":"bad heartbeat"}"#),
            MockOutcome::json(200, FAST_CONFIG),
        )
        .await;
        let heartbeat = scheduler(&server.base_url);

        heartbeat.start("Phone");
        tokio::time::sleep(Duration::from_millis(350)).await;

        assert!(heartbeat.is_running());
        let stats = heartbeat.stats();
        assert!(stats.failed >= 3);
        assert_eq!(stats.sent, 0);
        assert!(stats.last_error.unwrap().contains("bad heartbeat"));
        heartbeat.stop();
    }

    #[tokio::test]
    async fn slow_heartbeats_do_not_overlap() {
        let server = server_with(
            MockOutcome::delayed(200, OK, 250),
            MockOutcome::json(200, FAST_CONFIG),
        )
        .await;
        let heartbeat = scheduler(&server.base_url);

        heartbeat.start("Phone");
        tokio::time::sleep(Duration::from_millis(450)).await;
        heartbeat.stop();

        // Without coalescing five sends would be in flight by now.
        let count = server.count(HEARTBEAT_PATH).await;
        assert!((1..=3).contains(&count), "heartbeats overlapped: {}", count);
        assert!(heartbeat.stats().skipped_ticks >= 1);
    }

    #[tokio::test]
    async fn body_without_success_marker_counts_as_failure() {
        let server = server_with(
            MockOutcome::json(200, r#"{"status":"error","message":"device unknown"}"#),
            MockOutcome::json(200, FAST_CONFIG),
        )
        .await;
        let heartbeat = scheduler(&server.base_url);

        heartbeat.start("Phone");
        tokio::time::sleep(Duration::from_millis(50)).await;
        heartbeat.stop();

        let stats = heartbeat.stats();
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.last_error.as_deref(), Some("Request rejected (200): device unknown"));
    }

    #[tokio::test]
    async fn persistent_server_error_is_retried_once_per_tick() {
        let server = server_with(
            MockOutcome::json(503, ""),
            MockOutcome::json(200, r#"{"interval":10,"timeout":1}"#),
        )
        .await;
        let heartbeat = scheduler(&server.base_url);

        heartbeat.start("Phone");
        // First attempt, one 1s backoff, then the single retry.
        tokio::time::sleep(Duration::from_millis(1400)).await;
        heartbeat.stop();

        assert_eq!(server.count(HEARTBEAT_PATH).await, 2);
        let stats = heartbeat.stats();
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.failed, 1);
    }

    #[tokio::test]
    async fn server_timeout_bounds_each_send() {
        let server = server_with(
            MockOutcome::delayed(200, OK, 200),
            MockOutcome::json(200, r#"{"interval":10,"timeout":0.05}"#),
        )
        .await;
        let heartbeat = scheduler(&server.base_url);

        heartbeat.start("Phone");
        tokio::time::sleep(Duration::from_millis(1400)).await;
        heartbeat.stop();

        let stats = heartbeat.stats();
        let timeout = stats.config.expect("config fetched").timeout;
        assert!((timeout.as_secs_f64() - 0.05).abs() < 1e-6, "timeout {:?}", timeout);
        assert_eq!(stats.sent, 0);
        assert_eq!(stats.last_error.as_deref(), Some("Request timed out"));
        assert_eq!(server.count(HEARTBEAT_PATH).await, 2);
    }
}
