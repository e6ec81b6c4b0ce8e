//! HTTP plumbing shared by the provider adapters
//!
//! Connection pooling, request correlation, response size limits and the
//! mapping from HTTP failures to provider error kinds live here so every
//! adapter classifies failures the same way.

pub mod client;
pub mod error;

use crate::providers::error::{ProviderError, ProviderResult};
use reqwest::header::{HeaderMap, HeaderValue};
use std::time::Duration;
use uuid::Uuid;

pub use client::HttpClient;

/// Options for an HTTP request
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Unique request ID for correlation
    pub request_id: Uuid,

    /// Per-call timeout; the client's defaults apply when unset
    pub timeout: Option<Duration>,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            timeout: None,
        }
    }
}

impl RequestOptions {
    pub fn new(request_id: Uuid) -> Self {
        Self {
            request_id,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Header value for a credential, marked sensitive so it never shows in debug output
pub fn secret_header(value: &str) -> ProviderResult<HeaderValue> {
    let mut header = HeaderValue::from_str(value)
        .map_err(|_| ProviderError::auth("Credential contains characters not allowed in a header"))?;
    header.set_sensitive(true);
    Ok(header)
}

/// Headers carrying `Authorization: Bearer <key>` when a key is present
pub fn bearer_headers(api_key: Option<&str>) -> ProviderResult<HeaderMap> {
    let mut headers = HeaderMap::new();
    if let Some(key) = api_key {
        headers.insert(
            reqwest::header::AUTHORIZATION,
            secret_header(&format!("Bearer {}", key))?,
        );
    }
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::error::ErrorKind;

    #[test]
    fn test_bearer_headers() {
        let headers = bearer_headers(Some("sk-test")).unwrap();
        let value = headers.get(reqwest::header::AUTHORIZATION).unwrap();
        assert_eq!(value.to_str().unwrap(), "Bearer sk-test");
        assert!(value.is_sensitive());

        assert!(bearer_headers(None).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_credential_is_auth_error() {
        let err = secret_header("bad\nkey").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Auth);
    }
}
