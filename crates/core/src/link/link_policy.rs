//! Retry classification and backoff arithmetic for device link requests.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Retry policy classification for request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryClass {
    Retryable,
    Permanent,
    ReauthRequired,
}

/// Classify an HTTP status into retry behavior.
///
/// Unlike generic cloud clients, every 4xx other than 401 is permanent: the
/// control server only answers 4xx for malformed requests.
pub fn classify_http_status(status: u16) -> RetryClass {
    match status {
        401 => RetryClass::ReauthRequired,
        400..=499 => RetryClass::Permanent,
        500..=599 => RetryClass::Retryable,
        _ => RetryClass::Permanent,
    }
}

/// Per-call timeout and retry configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub retry_backoff_factor: f64,
    pub enable_retry: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
            retry_backoff_factor: 2.0,
            enable_retry: true,
        }
    }
}

impl RetryPolicy {
    /// Single attempt with the given timeout.
    pub fn no_retry(timeout: Duration) -> Self {
        Self {
            timeout,
            max_retries: 0,
            enable_retry: false,
            ..Self::default()
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.retry_backoff_factor = factor;
        self
    }

    /// Whether another attempt may follow the `attempt`-th (0-based) failure.
    pub fn allows_retry(&self, attempt: u32) -> bool {
        self.enable_retry && attempt < self.max_retries
    }

    /// Delay before the retry that follows the `attempt`-th (0-based) failure:
    /// `retry_delay * retry_backoff_factor^attempt`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = if self.retry_backoff_factor.is_finite() && self.retry_backoff_factor >= 0.0 {
            self.retry_backoff_factor
        } else {
            1.0
        };
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.retry_delay.as_secs_f64() * factor.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    /// Sum of every backoff wait a persistently failing call goes through.
    pub fn total_backoff(&self) -> Duration {
        if !self.enable_retry {
            return Duration::ZERO;
        }
        (0..self.max_retries)
            .map(|attempt| self.backoff_delay(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}
