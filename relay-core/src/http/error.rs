//! HTTP error mapping utilities

use crate::providers::error::{ErrorKind, ProviderError};
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

/// Error kind implied by an HTTP status alone
pub fn kind_for_status(status: StatusCode) -> Option<ErrorKind> {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Some(ErrorKind::Auth),
        StatusCode::TOO_MANY_REQUESTS => Some(ErrorKind::RateLimited),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => Some(ErrorKind::Timeout),
        status if status.is_server_error() => Some(ErrorKind::Unavailable),
        status if status.is_client_error() => Some(ErrorKind::Invalid),
        _ => None,
    }
}

/// Map HTTP status code, headers and response body to a ProviderError.
///
/// Status decides the kind. Recognised body patterns override the ambiguous
/// kinds (`Invalid`, `Unavailable`), e.g. a 400 whose body says
/// `invalid_api_key` becomes `Auth`.
pub fn map_http_error(
    status: StatusCode,
    headers: Option<&HeaderMap>,
    body: Option<String>,
    request_id: Uuid,
) -> ProviderError {
    let details = body
        .as_deref()
        .and_then(|b| serde_json::from_str::<Value>(b).ok())
        .and_then(|v| extract_error_details(&v));

    let message = details
        .as_ref()
        .map(|d| d.message.clone())
        .or_else(|| body.clone().filter(|b| !b.trim().is_empty()))
        .unwrap_or_else(|| format!("HTTP error {}", status.as_u16()));

    let status_kind = kind_for_status(status).unwrap_or(ErrorKind::Unavailable);
    let pattern_kind = details
        .as_ref()
        .and_then(|d| d.code.as_deref())
        .and_then(classify_message)
        .or_else(|| classify_message(&message));

    let kind = match (status_kind, pattern_kind) {
        (ErrorKind::Invalid | ErrorKind::Unavailable, Some(refined)) => refined,
        (kind, _) => kind,
    };

    let mut error = ProviderError::new(
        kind,
        format!("{} (HTTP {}) [request_id: {}]", message, status.as_u16(), request_id),
    );

    if matches!(kind, ErrorKind::RateLimited | ErrorKind::Unavailable) {
        let retry_after = headers
            .and_then(|h| h.get(RETRY_AFTER))
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after)
            .or_else(|| {
                details
                    .as_ref()
                    .and_then(|d| d.retry_after_seconds)
                    .map(Duration::from_secs_f64)
            });
        if let Some(retry_after) = retry_after {
            error = error.with_retry_after(retry_after);
        }
    }

    error
}

/// Error kind suggested by well-known provider error messages or codes
pub fn classify_message(message: &str) -> Option<ErrorKind> {
    let lower = message.to_lowercase();

    if lower.contains("invalid_api_key")
        || lower.contains("invalid api key")
        || lower.contains("authentication")
        || lower.contains("unauthorized")
    {
        Some(ErrorKind::Auth)
    } else if lower.contains("rate limit")
        || lower.contains("rate_limit")
        || lower.contains("insufficient_quota")
        || lower.contains("quota exceeded")
        || lower.contains("too many requests")
    {
        Some(ErrorKind::RateLimited)
    } else if lower.contains("overloaded") || lower.contains("service unavailable") {
        Some(ErrorKind::Unavailable)
    } else if lower.contains("timed out") || lower.contains("timeout") {
        Some(ErrorKind::Timeout)
    } else {
        None
    }
}

/// Error details extracted from response body
struct ErrorDetails {
    message: String,
    code: Option<String>,
    retry_after_seconds: Option<f64>,
}

/// Extract error details from the common provider error envelopes
fn extract_error_details(json: &Value) -> Option<ErrorDetails> {
    // OpenAI / Anthropic: { "error": { "message": "...", "type": "...", "code": "..." } }
    // Gemini: { "error": { "code": 429, "message": "...", "status": "RESOURCE_EXHAUSTED" } }
    if let Some(error) = json.get("error").filter(|e| e.is_object()) {
        if let Some(message) = error.get("message").and_then(Value::as_str) {
            let code = ["code", "type", "status"]
                .iter()
                .filter_map(|key| error.get(*key).and_then(Value::as_str))
                .next()
                .map(str::to_string);
            return Some(ErrorDetails {
                message: message.to_string(),
                code,
                retry_after_seconds: error.get("retry_after").and_then(Value::as_f64),
            });
        }
    }

    // Ollama: { "error": "..." }
    if let Some(error) = json.get("error").and_then(Value::as_str) {
        return Some(ErrorDetails {
            message: error.to_string(),
            code: None,
            retry_after_seconds: None,
        });
    }

    if let Some(message) = json.get("message").and_then(Value::as_str) {
        return Some(ErrorDetails {
            message: message.to_string(),
            code: None,
            retry_after_seconds: json.get("retry_after").and_then(Value::as_f64),
        });
    }

    None
}

/// Parse a Retry-After header value: delay seconds or an HTTP date
pub fn parse_retry_after(header_value: &str) -> Option<Duration> {
    let value = header_value.trim();
    if let Ok(seconds) = value.parse::<f64>() {
        return (seconds.is_finite() && seconds >= 0.0).then(|| Duration::from_secs_f64(seconds));
    }

    let at = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some(
        at.signed_duration_since(Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;
    use test_case::test_case;

    #[test_case(401, ErrorKind::Auth ; "unauthorized")]
    #[test_case(403, ErrorKind::Auth ; "forbidden")]
    #[test_case(429, ErrorKind::RateLimited ; "too many requests")]
    #[test_case(408, ErrorKind::Timeout ; "request timeout")]
    #[test_case(504, ErrorKind::Timeout ; "gateway timeout")]
    #[test_case(500, ErrorKind::Unavailable ; "internal error")]
    #[test_case(503, ErrorKind::Unavailable ; "service unavailable")]
    #[test_case(400, ErrorKind::Invalid ; "bad request")]
    #[test_case(404, ErrorKind::Invalid ; "not found")]
    fn test_status_mapping(status: u16, expected: ErrorKind) {
        let status = StatusCode::from_u16(status).unwrap();
        let err = map_http_error(status, None, None, Uuid::new_v4());
        assert_eq!(err.kind, expected);
    }

    #[test_case("Rate limit reached for requests", Some(ErrorKind::RateLimited) ; "rate limit")]
    #[test_case("insufficient_quota", Some(ErrorKind::RateLimited) ; "quota")]
    #[test_case("Overloaded", Some(ErrorKind::Unavailable) ; "overloaded")]
    #[test_case("Incorrect API key provided: invalid_api_key", Some(ErrorKind::Auth) ; "bad key")]
    #[test_case("model not found", None ; "unrecognised")]
    fn test_classify_message(message: &str, expected: Option<ErrorKind>) {
        assert_eq!(classify_message(message), expected);
    }

    #[test]
    fn test_body_code_refines_bad_request() {
        let body = r#"{"error":{"message":"Incorrect API key","type":"invalid_request_error","code":"invalid_api_key"}}"#;
        let err = map_http_error(
            StatusCode::BAD_REQUEST,
            None,
            Some(body.to_string()),
            Uuid::new_v4(),
        );
        assert_eq!(err.kind, ErrorKind::Auth);
        assert!(err.message.contains("Incorrect API key"));
    }

    #[test]
    fn test_status_wins_over_body_for_auth() {
        let body = r#"{"error":{"message":"rate limit exceeded"}}"#;
        let err = map_http_error(
            StatusCode::UNAUTHORIZED,
            None,
            Some(body.to_string()),
            Uuid::new_v4(),
        );
        assert_eq!(err.kind, ErrorKind::Auth);
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));
        let err = map_http_error(
            StatusCode::TOO_MANY_REQUESTS,
            Some(&headers),
            None,
            Uuid::new_v4(),
        );
        assert_eq!(err.kind, ErrorKind::RateLimited);
        assert_eq!(err.retry_after, Some(Duration::from_secs(7)));
    }

    #[test]
    fn test_retry_after_from_body() {
        let body = r#"{"error":{"message":"slow down","retry_after":2}}"#;
        let err = map_http_error(
            StatusCode::TOO_MANY_REQUESTS,
            None,
            Some(body.to_string()),
            Uuid::new_v4(),
        );
        assert_eq!(err.retry_after, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_request_id_in_message() {
        let id = Uuid::new_v4();
        let err = map_http_error(StatusCode::BAD_GATEWAY, None, None, id);
        assert!(err.message.contains(&id.to_string()));
    }

    #[test]
    fn test_parse_retry_after_forms() {
        assert_eq!(parse_retry_after("3"), Some(Duration::from_secs(3)));
        assert_eq!(parse_retry_after("0.5"), Some(Duration::from_millis(500)));
        assert_eq!(
            parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"),
            Some(Duration::ZERO)
        );
        assert_eq!(parse_retry_after("soon"), None);
    }
}
