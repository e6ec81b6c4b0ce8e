//! HTTP client implementation using reqwest

use crate::config::{ConfigError, ConnectionConfig};
use crate::http::error::map_http_error;
use crate::http::RequestOptions;
use crate::providers::error::{ProviderError, ProviderResult};
use reqwest::header::HeaderMap;
use reqwest::{Client, ClientBuilder, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// Default user agent
const USER_AGENT: &str = concat!("relay/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client with connection pooling
#[derive(Clone)]
pub struct HttpClient {
    client: Arc<Client>,

    /// Maximum response size to prevent OOM
    max_response_size: usize,
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("max_response_size", &self.max_response_size)
            .finish_non_exhaustive()
    }
}

impl HttpClient {
    /// Create a new HTTP client with default settings
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_config(&ConnectionConfig::default())
    }

    /// Create a new HTTP client from connection settings
    pub fn from_config(config: &ConnectionConfig) -> Result<Self, ConfigError> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(config.max_idle_per_host)
            .pool_idle_timeout(config.keepalive())
            .connect_timeout(config.connect_timeout())
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .map_err(|e| ConfigError::Invalid {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client: Arc::new(client),
            max_response_size: config.max_response_bytes,
        })
    }

    /// POST a JSON body; non-success statuses come back as mapped errors
    pub async fn post_json<B>(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &B,
        options: &RequestOptions,
    ) -> ProviderResult<Response>
    where
        B: Serialize + ?Sized,
    {
        let builder = self.client.post(url).headers(headers).json(body);
        self.send(builder, url, options).await
    }

    /// GET a resource; non-success statuses come back as mapped errors
    pub async fn get(
        &self,
        url: &str,
        headers: HeaderMap,
        options: &RequestOptions,
    ) -> ProviderResult<Response> {
        let builder = self.client.get(url).headers(headers);
        self.send(builder, url, options).await
    }

    async fn send(
        &self,
        mut builder: RequestBuilder,
        url: &str,
        options: &RequestOptions,
    ) -> ProviderResult<Response> {
        let request_id = options.request_id;
        builder = builder.header("X-Request-ID", request_id.to_string());
        if let Some(timeout) = options.timeout {
            builder = builder.timeout(timeout);
        }

        debug!(%request_id, url, "Sending provider request");

        let response = builder.send().await.map_err(|e| {
            warn!(%request_id, url, error = %e, "Provider request failed");
            ProviderError::from(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.ok();
            warn!(%request_id, url, status = status.as_u16(), "Provider returned error status");
            return Err(map_http_error(status, Some(&headers), body, request_id));
        }

        self.check_content_length(&response)?;
        Ok(response)
    }

    /// Read and decode a JSON response body within the size limit
    pub async fn read_json<T: DeserializeOwned>(&self, response: Response) -> ProviderResult<T> {
        Self::validate_content_type(&response)?;
        self.check_content_length(&response)?;

        let bytes = response.bytes().await?;
        if bytes.len() > self.max_response_size {
            return Err(self.too_large(bytes.len()));
        }

        Ok(serde_json::from_slice(&bytes)?)
    }

    fn validate_content_type(response: &Response) -> ProviderResult<()> {
        if let Some(content_type) = response.headers().get(reqwest::header::CONTENT_TYPE) {
            let content_type = content_type.to_str().unwrap_or("").to_lowercase();
            if !content_type.contains("json") {
                return Err(ProviderError::invalid(format!(
                    "Expected a JSON response, got: {}",
                    content_type
                )));
            }
        }
        Ok(())
    }

    fn check_content_length(&self, response: &Response) -> ProviderResult<()> {
        match response.content_length() {
            Some(length) if length as usize > self.max_response_size => {
                Err(self.too_large(length as usize))
            }
            _ => Ok(()),
        }
    }

    fn too_large(&self, size: usize) -> ProviderError {
        ProviderError::invalid(format!(
            "Response size {} exceeds maximum {}",
            size, self.max_response_size
        ))
    }
}
