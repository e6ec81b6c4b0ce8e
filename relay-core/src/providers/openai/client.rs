//! OpenAI-compatible client implementation

use super::converter::{from_chat_response, to_chat_request};
use super::streaming::parse_stream;
use super::types::ChatCompletionResponse;
use crate::http::{bearer_headers, HttpClient, RequestOptions};
use crate::protocol::types::{Completion, GenerationRequest};
use crate::providers::adapter::{ProviderAdapter, ProviderConfig, TextStream};
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::rate_limit::{RateLimitInfo, RateLimitTracker};
use async_trait::async_trait;
use reqwest::Response;
use tracing::debug;

/// Adapter for every backend speaking the OpenAI chat completions API
pub struct OpenAICompatibleProvider {
    config: ProviderConfig,
    http: HttpClient,
    rate_limiter: RateLimitTracker,
}

impl OpenAICompatibleProvider {
    pub fn new(config: ProviderConfig, http: HttpClient) -> Self {
        Self {
            config,
            http,
            rate_limiter: RateLimitTracker::new(),
        }
    }

    /// Latest rate limit information reported by the backend
    pub fn rate_limits(&self) -> RateLimitInfo {
        self.rate_limiter.info()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }

    async fn send(&self, request: &GenerationRequest, stream: bool) -> ProviderResult<Response> {
        if let Some(wait) = self.rate_limiter.should_wait() {
            return Err(ProviderError::rate_limited(format!(
                "Request budget exhausted for {}",
                self.config.name
            ))
            .with_retry_after(wait));
        }

        let body = to_chat_request(request, &self.config.model, stream);
        let response = self
            .http
            .post_json(
                &self.url("/chat/completions"),
                bearer_headers(self.config.api_key())?,
                &body,
                &RequestOptions::new(request.request_id),
            )
            .await?;

        self.rate_limiter.update_from_headers(response.headers());
        Ok(response)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAICompatibleProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn generate(&self, request: &GenerationRequest) -> ProviderResult<Completion> {
        let response = self.send(request, false).await?;
        let body: ChatCompletionResponse = self.http.read_json(response).await?;
        let completion = from_chat_response(body, &self.config.model)?;

        self.rate_limiter
            .record_request(completion.usage.map_or(0, |u| u.total()));
        Ok(completion)
    }

    async fn stream(&self, request: &GenerationRequest) -> ProviderResult<TextStream> {
        let response = self.send(request, true).await?;
        self.rate_limiter.record_request(0);
        Ok(parse_stream(response.bytes_stream()))
    }

    async fn health_check(&self) -> bool {
        let headers = match bearer_headers(self.config.api_key()) {
            Ok(headers) => headers,
            Err(_) => return false,
        };
        let options = RequestOptions::default().with_timeout(self.config.health.probe_timeout());

        match self.http.get(&self.url("/models"), headers, &options).await {
            Ok(_) => true,
            Err(e) => {
                debug!(provider = %self.config.name, error = %e, "Health check failed");
                false
            }
        }
    }
}
