//! Azure OpenAI deployments
//!
//! Same body as OpenAI chat completions, but the deployment lives in the
//! URL, the key travels in an `api-key` header and every call carries an
//! `api-version` query parameter.

use crate::http::{secret_header, HttpClient, RequestOptions};
use crate::protocol::types::{Completion, GenerationRequest};
use crate::providers::adapter::{ProviderAdapter, ProviderConfig, TextStream};
use crate::providers::error::ProviderResult;
use crate::providers::openai::converter::{from_chat_response, to_chat_request};
use crate::providers::openai::streaming::parse_stream;
use crate::providers::openai::ChatCompletionResponse;
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::Response;
use tracing::debug;

/// Default `api-version` query parameter
pub const DEFAULT_API_VERSION: &str = "2024-06-01";

pub struct AzureProvider {
    config: ProviderConfig,
    http: HttpClient,
}

impl AzureProvider {
    pub fn new(config: ProviderConfig, http: HttpClient) -> Self {
        Self { config, http }
    }

    /// Chat completions URL of the configured deployment
    pub fn completions_url(&self) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.config.base_url(),
            self.config.model,
            self.config.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION)
        )
    }

    fn headers(&self) -> ProviderResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = self.config.api_key() {
            headers.insert("api-key", secret_header(key)?);
        }
        Ok(headers)
    }

    async fn send(
        &self,
        request: &GenerationRequest,
        stream: bool,
        options: &RequestOptions,
    ) -> ProviderResult<Response> {
        let body = to_chat_request(request, &self.config.model, stream);
        self.http
            .post_json(&self.completions_url(), self.headers()?, &body, options)
            .await
    }
}

#[async_trait]
impl ProviderAdapter for AzureProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn generate(&self, request: &GenerationRequest) -> ProviderResult<Completion> {
        let response = self
            .send(request, false, &RequestOptions::new(request.request_id))
            .await?;
        let body: ChatCompletionResponse = self.http.read_json(response).await?;
        from_chat_response(body, &self.config.model)
    }

    async fn stream(&self, request: &GenerationRequest) -> ProviderResult<TextStream> {
        let response = self
            .send(request, true, &RequestOptions::new(request.request_id))
            .await?;
        Ok(parse_stream(response.bytes_stream()))
    }

    /// Azure has no cheap listing endpoint per deployment, so probe with a
    /// one-token completion
    async fn health_check(&self) -> bool {
        let probe = GenerationRequest::new("ping").with_max_tokens(1);
        let options =
            RequestOptions::new(probe.request_id).with_timeout(self.config.health.probe_timeout());

        match self.send(&probe, false, &options).await {
            Ok(_) => true,
            Err(e) => {
                debug!(provider = %self.config.name, error = %e, "Health check failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::adapter::ProviderKind;

    #[test]
    fn test_completions_url() {
        let config = ProviderConfig::new("azure", ProviderKind::Azure)
            .with_base_url("https://acme.openai.azure.com/")
            .with_model("gpt4o-prod");
        let provider = AzureProvider::new(config, HttpClient::new().unwrap());
        assert_eq!(
            provider.completions_url(),
            "https://acme.openai.azure.com/openai/deployments/gpt4o-prod/chat/completions?api-version=2024-06-01"
        );
    }
}
