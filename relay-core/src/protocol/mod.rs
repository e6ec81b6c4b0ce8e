//! Provider-agnostic request and result types
//!
//! Callers describe a generation once; adapters translate it to their own
//! wire format and the orchestrator reports back a [`GenerationResult`].

pub mod types;

pub use types::{
    Completion, GenerationParams, GenerationRequest, GenerationResult, StreamingGeneration,
    TokenUsage,
};
