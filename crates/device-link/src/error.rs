//! Error types for the device link crate.

use padlink_core::link::{classify_http_status, RetryClass};
use padlink_core::secrets::SecretStoreError;
use thiserror::Error;

/// Result type alias for device link operations.
pub type Result<T> = std::result::Result<T, DeviceLinkError>;

/// Errors that can occur while talking to the control server.
#[derive(Debug, Error)]
pub enum DeviceLinkError {
    /// No response arrived within the call's timeout
    #[error("Request timed out")]
    Timeout,

    /// The network monitor reports the link as offline
    #[error("Network unavailable")]
    NetworkUnavailable,

    /// Server rejected the bearer credential (or its absence)
    #[error("Authentication required")]
    Unauthenticated,

    /// Server rejected the request itself; never retried
    #[error("Request rejected ({status}): {detail}")]
    ClientError { status: u16, detail: String },

    /// Server failed while handling the request
    #[error("Server error ({status}): {detail}")]
    ServerError { status: u16, detail: String },

    /// Connection-level failure (refused, reset, DNS, TLS)
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid request (missing required data, etc.)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Local persistence failure
    #[error("Storage error: {0}")]
    Storage(#[from] SecretStoreError),
}

impl DeviceLinkError {
    /// Build the error matching a non-success HTTP status.
    pub fn from_status(status: u16, detail: impl Into<String>) -> Self {
        match classify_http_status(status) {
            RetryClass::ReauthRequired => Self::Unauthenticated,
            RetryClass::Retryable => Self::ServerError {
                status,
                detail: detail.into(),
            },
            RetryClass::Permanent => Self::ClientError {
                status,
                detail: detail.into(),
            },
        }
    }

    /// Create a client error from status and detail
    pub fn client(status: u16, detail: impl Into<String>) -> Self {
        Self::ClientError {
            status,
            detail: detail.into(),
        }
    }

    /// Create an invalid request error
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// HTTP status if the server answered.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ClientError { status, .. } | Self::ServerError { status, .. } => Some(*status),
            Self::Unauthenticated => Some(401),
            _ => None,
        }
    }

    /// Classify error for retry policy.
    pub fn retry_class(&self) -> RetryClass {
        match self {
            Self::Timeout | Self::ServerError { .. } | Self::NetworkUnavailable => {
                RetryClass::Retryable
            }
            Self::Transport(err) => {
                if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
                    RetryClass::Retryable
                } else {
                    RetryClass::Permanent
                }
            }
            Self::Unauthenticated => RetryClass::ReauthRequired,
            Self::ClientError { .. }
            | Self::Serialization(_)
            | Self::InvalidRequest(_)
            | Self::Storage(_) => RetryClass::Permanent,
        }
    }

    /// Short human-readable reason for display next to a failed action.
    pub fn user_message(&self) -> String {
        match self {
            Self::Timeout => "The desktop did not answer in time".to_string(),
            Self::NetworkUnavailable => "No network connection".to_string(),
            Self::Unauthenticated => "Token is invalid or expired".to_string(),
            Self::ClientError { detail, .. } | Self::ServerError { detail, .. }
                if !detail.is_empty() =>
            {
                detail.clone()
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_follows_classification() {
        assert!(matches!(
            DeviceLinkError::from_status(401, "nope"),
            DeviceLinkError::Unauthenticated
        ));
        assert!(matches!(
            DeviceLinkError::from_status(404, "missing"),
            DeviceLinkError::ClientError { status: 404, .. }
        ));
        assert!(matches!(
            DeviceLinkError::from_status(502, "bad gateway"),
            DeviceLinkError::ServerError { status: 502, .. }
        ));
    }

    #[test]
    fn retry_class_for_auth_error_is_reauth() {
        let err = DeviceLinkError::from_status(401, "unauthorized");
        assert_eq!(err.retry_class(), RetryClass::ReauthRequired);
    }

    #[test]
    fn client_errors_are_permanent_and_keep_detail() {
        let err = DeviceLinkError::client(422, "shortcut not supported");
        assert_eq!(err.retry_class(), RetryClass::Permanent);
        assert_eq!(err.status_code(), Some(422));
        assert_eq!(err.user_message(), "shortcut not supported");
    }

    #[test]
    fn timeouts_and_server_errors_are_retryable() {
        assert_eq!(DeviceLinkError::Timeout.retry_class(), RetryClass::Retryable);
        assert_eq!(
            DeviceLinkError::from_status(500, "").retry_class(),
            RetryClass::Retryable
        );
    }
}
