//! Scheduler constants for heartbeats and connectivity probing.

use std::time::Duration;

/// Heartbeat cadence used when the server does not provide one.
pub const HEARTBEAT_DEFAULT_INTERVAL: Duration = Duration::from_secs(30);

/// Per-heartbeat timeout used when the server does not provide one.
pub const HEARTBEAT_DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// Retry budget for a single heartbeat send.
pub const HEARTBEAT_MAX_RETRIES: u32 = 1;

/// Timeout for the one-shot heartbeat config fetch at scheduler start.
pub const HEARTBEAT_CONFIG_FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// Active connectivity probe period.
pub const NETWORK_PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Timeout for a single connectivity probe.
pub const NETWORK_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
