//! Provider error types and handling

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Result type for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Classification of a failed provider attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad or expired credential
    Auth,
    /// Provider-side throttling
    RateLimited,
    /// Attempt exceeded its time budget
    Timeout,
    /// Malformed request or response
    Invalid,
    /// Network or infrastructure failure
    Unavailable,
}

impl ErrorKind {
    /// Whether a later attempt against the same provider could succeed
    pub fn is_transient(self) -> bool {
        match self {
            ErrorKind::RateLimited | ErrorKind::Timeout | ErrorKind::Unavailable => true,
            ErrorKind::Auth | ErrorKind::Invalid => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Auth => "auth",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Invalid => "invalid",
            ErrorKind::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by a provider adapter
#[derive(Debug, Clone, Error)]
#[error("{kind}: {message}")]
pub struct ProviderError {
    pub kind: ErrorKind,
    pub message: String,
    /// Provider-suggested wait before retrying
    pub retry_after: Option<Duration>,
}

impl ProviderError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Auth, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invalid, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::timeout(err.to_string())
        } else if err.is_connect() {
            ProviderError::unavailable(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            ProviderError::invalid(format!("Failed to decode response: {}", err))
        } else if let Some(status) = err.status() {
            crate::http::error::kind_for_status(status)
                .map(|kind| ProviderError::new(kind, err.to_string()))
                .unwrap_or_else(|| ProviderError::unavailable(err.to_string()))
        } else {
            ProviderError::unavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ProviderError {
    fn from(err: serde_json::Error) -> Self {
        ProviderError::invalid(format!("Failed to parse response: {}", err))
    }
}
