//! Anthropic Messages API

use crate::http::{secret_header, HttpClient, RequestOptions};
use crate::protocol::types::{Completion, GenerationRequest, TokenUsage};
use crate::providers::adapter::{ProviderAdapter, ProviderConfig, TextStream};
use crate::providers::error::{ProviderError, ProviderResult};
use crate::providers::openai::streaming::sse_text_stream;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Response;
use serde::{Deserialize, Serialize};
use tracing::debug;

const API_VERSION: &str = "2023-06-01";

/// The Messages API requires an explicit output budget
const DEFAULT_MAX_TOKENS: u32 = 1024;

pub struct AnthropicProvider {
    config: ProviderConfig,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    model: Option<String>,
    content: Vec<ContentBlock>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// Streamed event payloads that carry text or an error
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEvent {
    ContentBlockDelta { delta: StreamDelta },
    Error { error: StreamError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamDelta {
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(rename = "type", default)]
    error_type: String,
    #[serde(default)]
    message: String,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig, http: HttpClient) -> Self {
        Self { config, http }
    }

    fn headers(&self) -> ProviderResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert("anthropic-version", HeaderValue::from_static(API_VERSION));
        if let Some(key) = self.config.api_key() {
            headers.insert("x-api-key", secret_header(key)?);
        }
        Ok(headers)
    }

    async fn send(&self, request: &GenerationRequest, stream: bool) -> ProviderResult<Response> {
        let body = MessagesRequest {
            model: &self.config.model,
            max_tokens: request.params.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            messages: vec![Message {
                role: "user",
                content: &request.prompt,
            }],
            system: request.params.system.as_deref(),
            temperature: request.params.temperature,
            stream,
        };

        self.http
            .post_json(
                &format!("{}/messages", self.config.base_url()),
                self.headers()?,
                &body,
                &RequestOptions::new(request.request_id),
            )
            .await
    }
}

fn stream_event_text(data: &str) -> Option<ProviderResult<String>> {
    match serde_json::from_str::<StreamEvent>(data) {
        Ok(StreamEvent::ContentBlockDelta {
            delta: StreamDelta::TextDelta { text },
        }) if !text.is_empty() => Some(Ok(text)),
        Ok(StreamEvent::Error { error }) => {
            let kind = crate::http::error::classify_message(&error.error_type)
                .unwrap_or(crate::providers::error::ErrorKind::Unavailable);
            Some(Err(ProviderError::new(kind, error.message)))
        }
        Ok(_) => None,
        Err(e) => {
            tracing::warn!("Failed to parse stream event: {}", e);
            None
        }
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn generate(&self, request: &GenerationRequest) -> ProviderResult<Completion> {
        let response = self.send(request, false).await?;
        let body: MessagesResponse = self.http.read_json(response).await?;

        let text: String = body
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect();

        Ok(Completion {
            text,
            model: body.model.unwrap_or_else(|| self.config.model.clone()),
            usage: body
                .usage
                .map(|u| TokenUsage::new(u.input_tokens, u.output_tokens)),
        })
    }

    async fn stream(&self, request: &GenerationRequest) -> ProviderResult<TextStream> {
        let response = self.send(request, true).await?;
        Ok(sse_text_stream(response.bytes_stream(), |event| {
            stream_event_text(&event.data)
        }))
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
