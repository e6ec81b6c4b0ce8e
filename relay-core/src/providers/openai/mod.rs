//! OpenAI-compatible chat completions
//!
//! Most hosted backends (OpenAI, Mistral, Groq, DeepSeek, Together, xAI,
//! OpenRouter, ...) and the local LM Studio / vLLM servers speak this wire
//! format and share one adapter.

mod client;
pub mod converter;
pub mod streaming;
pub mod types;

pub use client::OpenAICompatibleProvider;
pub use types::{ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse};
