//! Errors surfaced to callers of the relay

use crate::config::ConfigError;
use crate::providers::error::ErrorKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result type for relay operations
pub type RelayResult<T> = Result<T, RelayError>;

/// One failed provider attempt within a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub provider: String,
    pub kind: ErrorKind,
    pub message: String,
    pub latency_ms: u64,
}

impl fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}): {}", self.provider, self.kind, self.message)
    }
}

/// Every candidate was tried and none succeeded
#[derive(Debug, Clone, PartialEq, Error)]
pub struct AllProvidersFailed {
    /// Failures in the order the candidates were tried
    pub attempts: Vec<AttemptFailure>,
}

impl AllProvidersFailed {
    /// Error kinds in attempt order
    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.attempts.iter().map(|a| a.kind).collect()
    }

    /// Providers in attempt order
    pub fn providers(&self) -> Vec<&str> {
        self.attempts.iter().map(|a| a.provider.as_str()).collect()
    }
}

impl fmt::Display for AllProvidersFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "All {} provider attempts failed", self.attempts.len())?;
        for (i, attempt) in self.attempts.iter().enumerate() {
            let sep = if i == 0 { ": " } else { "; " };
            write!(f, "{}{}", sep, attempt)?;
        }
        Ok(())
    }
}

/// Crate-level error type
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid request field '{field}': {message}")]
    InvalidRequest { field: String, message: String },

    #[error("Unknown task type '{0}'")]
    UnknownTaskType(String),

    #[error("Unknown provider '{0}'")]
    UnknownProvider(String),

    #[error("No enabled provider is available")]
    NoProviderAvailable,

    #[error(transparent)]
    AllProvidersFailed(#[from] AllProvidersFailed),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl RelayError {
    pub fn invalid_request(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            field: field.into(),
            message: message.into(),
        }
    }
}
