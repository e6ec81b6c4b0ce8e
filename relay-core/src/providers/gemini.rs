//! Google Gemini `generateContent`

use crate::http::{secret_header, HttpClient, RequestOptions};
use crate::protocol::types::{Completion, GenerationRequest, TokenUsage};
use crate::providers::adapter::{ProviderAdapter, ProviderConfig};
use crate::providers::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub struct GeminiProvider {
    config: ProviderConfig,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Content,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

fn text_content(role: Option<&str>, text: &str) -> Content {
    Content {
        role: role.map(str::to_string),
        parts: vec![Part {
            text: Some(text.to_string()),
        }],
    }
}

fn build_request(request: &GenerationRequest) -> GenerateContentRequest {
    let params = &request.params;
    let generation_config = (params.max_tokens.is_some() || params.temperature.is_some())
        .then_some(GenerationConfig {
            max_output_tokens: params.max_tokens,
            temperature: params.temperature,
        });

    GenerateContentRequest {
        contents: vec![text_content(Some("user"), &request.prompt)],
        system_instruction: params.system.as_deref().map(|s| text_content(None, s)),
        generation_config,
    }
}

fn into_completion(response: GenerateContentResponse, model: &str) -> ProviderResult<Completion> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::invalid("Response contained no candidates"))?;

    if candidate.content.parts.is_empty() {
        if let Some(reason) = candidate.finish_reason {
            return Err(ProviderError::invalid(format!(
                "Generation stopped without output: {}",
                reason
            )));
        }
    }

    let text = candidate
        .content
        .parts
        .into_iter()
        .filter_map(|part| part.text)
        .collect();

    Ok(Completion {
        text,
        model: response.model_version.unwrap_or_else(|| model.to_string()),
        usage: response
            .usage_metadata
            .map(|u| TokenUsage::new(u.prompt_token_count, u.candidates_token_count)),
    })
}

impl GeminiProvider {
    pub fn new(config: ProviderConfig, http: HttpClient) -> Self {
        Self { config, http }
    }

    fn headers(&self) -> ProviderResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        if let Some(key) = self.config.api_key() {
            headers.insert("x-goog-api-key", secret_header(key)?);
        }
        Ok(headers)
    }
}

#[async_trait]
impl ProviderAdapter for GeminiProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn generate(&self, request: &GenerationRequest) -> ProviderResult<Completion> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.config.base_url(),
            self.config.model
        );
        let response = self
            .http
            .post_json(
                &url,
                self.headers()?,
                &build_request(request),
                &RequestOptions::new(request.request_id),
            )
            .await?;

        let body: GenerateContentResponse = self.http.read_json(response).await?;
        into_completion(body, &self.config.model)
    }

    async fn health_check(&self) -> bool {
        let headers = match self.headers() {
            Ok(headers) => headers,
            Err(_) => return false,
        };
        let options = RequestOptions::default().with_timeout(self.config.health.probe_timeout());
        let url = format!("{}/models", self.config.base_url());

        match self.http.get(&url, headers, &options).await {
            Ok(_) => true,
            Err(e) => {
                debug!(provider = %self.config.name, error = %e, "Health check failed");
                false
            }
        }
    }
}
