//! Credential handling that keeps secrets out of logs and debug output

use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider API key; `Debug` and `Display` never print the value
#[derive(Clone, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SecretString {
    value: String,
}

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
        }
    }

    /// The raw key, for building request headers
    pub fn expose_secret(&self) -> &str {
        &self.value
    }

    pub fn is_empty(&self) -> bool {
        self.value.trim().is_empty()
    }

    /// Partially redacted form for logs.
    ///
    /// Keeps a vendor prefix such as `sk-ant-` or `gsk_` and the last four
    /// characters, which is enough to tell keys apart.
    pub fn partial_redact(&self) -> String {
        let value = self.value.trim();
        if value.is_empty() {
            return "[EMPTY]".to_string();
        }
        if value.len() < 12 || !value.is_ascii() {
            return "[REDACTED]".to_string();
        }

        let prefix_end = value[..8]
            .rfind(|c| c == '-' || c == '_')
            .map_or(0, |i| i + 1);
        format!("{}...{}", &value[..prefix_end], &value[value.len() - 4..])
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl PartialEq for SecretString {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_string_redaction() {
        let secret = SecretString::new("sk-1234567890abcdef");
        assert_eq!(format!("{}", secret), "[REDACTED]");
        assert_eq!(format!("{:?}", secret), "[REDACTED]");
        assert_eq!(secret.expose_secret(), "sk-1234567890abcdef");
    }

    #[test]
    fn test_partial_redaction() {
        assert_eq!(SecretString::new("sk-1234567890abcdef").partial_redact(), "sk-...cdef");
        assert_eq!(SecretString::new("sk-ant-api03-xyzw9876").partial_redact(), "sk-ant-...9876");
        assert_eq!(SecretString::new("gsk_abcdefgh1234").partial_redact(), "gsk_...1234");
        assert_eq!(SecretString::new("AIzaSyD0123456789").partial_redact(), "...6789");
        assert_eq!(SecretString::new("short").partial_redact(), "[REDACTED]");
        assert_eq!(SecretString::new("").partial_redact(), "[EMPTY]");
    }

    #[test]
    fn test_whitespace_secret_is_empty() {
        assert!(SecretString::new("   ").is_empty());
        assert!(!SecretString::new("key").is_empty());
    }

    #[test]
    fn test_serde_is_transparent() {
        let secret: SecretString = serde_json::from_str("\"abc\"").unwrap();
        assert_eq!(secret.expose_secret(), "abc");
        assert_eq!(serde_json::to_string(&secret).unwrap(), "\"abc\"");
    }
}
