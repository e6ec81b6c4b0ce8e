//! Conversion between relay requests and the OpenAI chat format

use super::types::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage};
use crate::protocol::types::{Completion, GenerationRequest, TokenUsage};
use crate::providers::error::{ProviderError, ProviderResult};

/// Build a chat completion request for `model`
pub fn to_chat_request(request: &GenerationRequest, model: &str, stream: bool) -> ChatCompletionRequest {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = &request.params.system {
        messages.push(ChatMessage::new("system", system.clone()));
    }
    messages.push(ChatMessage::new("user", request.prompt.clone()));

    ChatCompletionRequest {
        model: model.to_string(),
        messages,
        temperature: request.params.temperature,
        max_tokens: request.params.max_tokens,
        stream: stream.then_some(true),
    }
}

/// Extract the first choice; a response without choices is invalid
pub fn from_chat_response(response: ChatCompletionResponse, model: &str) -> ProviderResult<Completion> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::invalid("Response contained no choices"))?;

    Ok(Completion {
        text: choice.message.content.unwrap_or_default(),
        model: response.model.unwrap_or_else(|| model.to_string()),
        usage: response
            .usage
            .map(|u| TokenUsage::new(u.prompt_tokens, u.completion_tokens)),
    })
}

/// Text carried by one streamed chunk, if any
pub fn chunk_text(chunk: ChatCompletionChunk) -> Option<String> {
    chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .filter(|text| !text.is_empty())
}
