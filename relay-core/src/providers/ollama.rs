//! Ollama local inference server (`/api/chat`)

use crate::http::{HttpClient, RequestOptions};
use crate::protocol::types::{Completion, GenerationRequest, TokenUsage};
use crate::providers::adapter::{ProviderAdapter, ProviderConfig, TextStream};
use crate::providers::error::{ProviderError, ProviderResult};
use async_trait::async_trait;
use bytes::BytesMut;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::HeaderMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

pub struct OllamaProvider {
    config: ProviderConfig,
    http: HttpClient,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<ChatOptions>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

/// Response body, and also each line of a streamed response
#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<ResponseMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

fn build_request<'a>(request: &'a GenerationRequest, model: &'a str, stream: bool) -> ChatRequest<'a> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = request.params.system.as_deref() {
        messages.push(ChatMessage {
            role: "system",
            content: system,
        });
    }
    messages.push(ChatMessage {
        role: "user",
        content: &request.prompt,
    });

    let params = &request.params;
    let options = (params.temperature.is_some() || params.max_tokens.is_some()).then_some(ChatOptions {
        temperature: params.temperature,
        num_predict: params.max_tokens,
    });

    ChatRequest {
        model,
        messages,
        stream,
        options,
    }
}

/// Decode one NDJSON line into text, an error, or nothing
fn parse_line(line: &[u8]) -> Option<ProviderResult<String>> {
    let line = std::str::from_utf8(line).ok()?.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str::<ChatResponse>(line) {
        Ok(ChatResponse {
            error: Some(error), ..
        }) => Some(Err(ProviderError::unavailable(error))),
        Ok(chunk) => chunk
            .message
            .map(|m| m.content)
            .filter(|text| !text.is_empty())
            .map(Ok),
        Err(e) => Some(Err(ProviderError::from(e))),
    }
}

/// Split a byte stream into newline-delimited JSON chunks
fn ndjson_text_stream<S>(bytes: S) -> TextStream
where
    S: futures::Stream<Item = Result<bytes::Bytes, reqwest::Error>> + Send + 'static,
{
    let lines = bytes
        .map_err(ProviderError::from)
        .scan(BytesMut::new(), |buffer, chunk| {
            let items: Vec<ProviderResult<String>> = match chunk {
                Ok(chunk) => {
                    buffer.extend_from_slice(&chunk);
                    let mut items = Vec::new();
                    while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                        let line = buffer.split_to(pos + 1);
                        items.extend(parse_line(&line));
                    }
                    items
                }
                Err(e) => vec![Err(e)],
            };
            futures::future::ready(Some(items))
        })
        .flat_map(futures::stream::iter);

    Box::pin(lines)
}

impl OllamaProvider {
    pub fn new(config: ProviderConfig, http: HttpClient) -> Self {
        Self { config, http }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url(), path)
    }
}

#[async_trait]
impl ProviderAdapter for OllamaProvider {
    fn config(&self) -> &ProviderConfig {
        &self.config
    }

    async fn generate(&self, request: &GenerationRequest) -> ProviderResult<Completion> {
        let response = self
            .http
            .post_json(
                &self.url("/api/chat"),
                HeaderMap::new(),
                &build_request(request, &self.config.model, false),
                &RequestOptions::new(request.request_id),
            )
            .await?;

        let body: ChatResponse = self.http.read_json(response).await?;
        if let Some(error) = body.error {
            return Err(ProviderError::unavailable(error));
        }
        if !body.done {
            debug!(provider = %self.config.name, "Response not marked done");
        }

        let usage = match (body.prompt_eval_count, body.eval_count) {
            (None, None) => None,
            (prompt, eval) => Some(TokenUsage::new(prompt.unwrap_or(0), eval.unwrap_or(0))),
        };

        Ok(Completion {
            text: body.message.map(|m| m.content).unwrap_or_default(),
            model: body.model.unwrap_or_else(|| self.config.model.clone()),
            usage,
        })
    }

    async fn stream(&self, request: &GenerationRequest) -> ProviderResult<TextStream> {
        let response = self
            .http
            .post_json(
                &self.url("/api/chat"),
                HeaderMap::new(),
                &build_request(request, &self.config.model, true),
                &RequestOptions::new(request.request_id),
            )
            .await?;
        Ok(ndjson_text_stream(response.bytes_stream()))
    }

    async fn health_check(&self) -> bool {
        let options = RequestOptions::default().with_timeout(self.config.health.probe_timeout());
        match self.http.get(&self.url("/api/tags"), HeaderMap::new(), &options).await {
            Ok(_) => true,
            Err(e) => {
                debug!(provider = %self.config.name, error = %e, "Health check failed");
                false
            }
        }
    }
}
