//! Rate limit tracking from `x-ratelimit-*` response headers
//!
//! OpenAI-compatible backends advertise their remaining request budget. When
//! it is exhausted the adapter fails fast with `RateLimited` instead of
//! spending a round trip on a request that will be rejected.

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Information about current rate limits
#[derive(Debug, Clone, Default)]
pub struct RateLimitInfo {
    /// Requests limit per window
    pub request_limit: Option<u32>,

    /// Requests remaining in current window
    pub requests_remaining: Option<u32>,

    /// Tokens remaining in current window
    pub tokens_remaining: Option<u32>,

    /// When the request window resets
    pub reset_at: Option<DateTime<Utc>>,

    /// Requests sent since tracking started
    pub requests_sent: u64,

    /// Tokens consumed since tracking started
    pub tokens_used: u64,
}

/// Tracks rate limit information for a provider
#[derive(Debug, Clone, Default)]
pub struct RateLimitTracker {
    info: Arc<Mutex<RateLimitInfo>>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RateLimitInfo> {
        self.info.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Update rate limit information from response headers
    pub fn update_from_headers(&self, headers: &HeaderMap) {
        self.update_at(headers, Utc::now());
    }

    fn update_at(&self, headers: &HeaderMap, now: DateTime<Utc>) {
        let mut info = self.lock();

        if let Some(limit) = header_u32(headers, "x-ratelimit-limit-requests") {
            info.request_limit = Some(limit);
        }
        if let Some(remaining) = header_u32(headers, "x-ratelimit-remaining-requests") {
            info.requests_remaining = Some(remaining);
        }
        if let Some(remaining) = header_u32(headers, "x-ratelimit-remaining-tokens") {
            info.tokens_remaining = Some(remaining);
        }
        if let Some(reset) = headers
            .get("x-ratelimit-reset-requests")
            .and_then(|v| v.to_str().ok())
        {
            info.reset_at = parse_reset(reset, now);
        }
    }

    /// Record a completed request
    pub fn record_request(&self, tokens_used: u32) {
        let mut info = self.lock();
        info.requests_sent += 1;
        info.tokens_used += u64::from(tokens_used);
    }

    /// Current snapshot
    pub fn info(&self) -> RateLimitInfo {
        self.lock().clone()
    }

    /// How long to wait before the window reopens, if the budget is exhausted
    pub fn should_wait(&self) -> Option<Duration> {
        self.wait_at(Utc::now())
    }

    fn wait_at(&self, now: DateTime<Utc>) -> Option<Duration> {
        let info = self.lock();
        if info.requests_remaining != Some(0) {
            return None;
        }
        let reset = info.reset_at?;
        (reset > now)
            .then(|| reset.signed_duration_since(now).to_std().ok())
            .flatten()
    }
}

fn header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Parse a reset hint: either a duration such as `1s`, `250ms`, `6m0s`, or
/// unix epoch seconds.
fn parse_reset(value: &str, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(epoch) = value.parse::<i64>() {
        return DateTime::from_timestamp(epoch, 0);
    }
    let duration = parse_duration(value)?;
    let delta = chrono::Duration::from_std(duration).ok()?;
    Some(now + delta)
}

fn parse_duration(value: &str) -> Option<Duration> {
    let mut total = Duration::ZERO;
    let mut number = String::new();
    let mut chars = value.chars().peekable();
    let mut parsed_any = false;

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
            continue;
        }
        let amount: f64 = number.parse().ok()?;
        number.clear();
        let secs = match c {
            'h' => amount * 3600.0,
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                amount / 1000.0
            }
            'm' => amount * 60.0,
            's' => amount,
            _ => return None,
        };
        total += Duration::from_secs_f64(secs);
        parsed_any = true;
    }

    (parsed_any && number.is_empty()).then_some(total)
}
