//! Provider adapters
//!
//! One [`ProviderAdapter`] per wire family, plus the error taxonomy, pricing,
//! retry backoff and rate limit tracking they share.

pub mod adapter;
pub mod anthropic;
pub mod azure;
pub mod error;
pub mod gemini;
pub mod ollama;
pub mod openai;
pub mod pricing;
pub mod rate_limit;
pub mod retry;

pub use adapter::{
    create_adapter, Capabilities, Capability, KindDefaults, ProviderAdapter, ProviderConfig,
    ProviderKind, TextStream, WireFamily,
};
pub use error::{ErrorKind, ProviderError, ProviderResult};
pub use pricing::Pricing;
pub use rate_limit::{RateLimitInfo, RateLimitTracker};
pub use retry::RetryPolicy;
