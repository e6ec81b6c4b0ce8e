//! Server-sent event streams

use super::converter::chunk_text;
use super::types::ChatCompletionChunk;
use crate::providers::adapter::TextStream;
use crate::providers::error::{ProviderError, ProviderResult};
use bytes::Bytes;
use eventsource_stream::{Event, Eventsource};
use futures::{Stream, StreamExt};

/// Turn an SSE byte stream into text chunks.
///
/// `extract` maps each event to text, an error, or nothing (keep-alives,
/// role-only deltas, `[DONE]`).
pub fn sse_text_stream<S, F>(bytes: S, extract: F) -> TextStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    F: Fn(&Event) -> Option<ProviderResult<String>> + Send + Sync + 'static,
{
    Box::pin(bytes.eventsource().filter_map(move |result| {
        let item = match result {
            Ok(event) => extract(&event),
            Err(e) => Some(Err(ProviderError::unavailable(format!("Stream error: {}", e)))),
        };
        async move { item }
    }))
}

/// Parse an OpenAI-style completion stream
pub fn parse_stream<S>(bytes: S) -> TextStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
{
    sse_text_stream(bytes, |event| {
        // The last message is "data: [DONE]"
        if event.data == "[DONE]" {
            return None;
        }
        match serde_json::from_str::<ChatCompletionChunk>(&event.data) {
            Ok(chunk) => chunk_text(chunk).map(Ok),
            Err(e) => {
                tracing::warn!("Failed to parse stream chunk: {}", e);
                None
            }
        }
    })
}
