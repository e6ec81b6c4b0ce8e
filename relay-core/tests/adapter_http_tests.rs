//! Provider adapters against mocked HTTP backends

use futures::StreamExt;
use relay_core::config::RelayConfig;
use relay_core::http::HttpClient;
use relay_core::providers::{create_adapter, ErrorKind, ProviderAdapter, ProviderConfig, ProviderKind};
use relay_core::{GenerationRequest, ProviderRegistry, RequestDispatcher};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter(config: ProviderConfig) -> Arc<dyn ProviderAdapter> {
    create_adapter(config, HttpClient::new().unwrap())
}

fn openai(server: &MockServer) -> Arc<dyn ProviderAdapter> {
    adapter(
        ProviderConfig::new("openai", ProviderKind::OpenAI)
            .with_base_url(server.uri())
            .with_model("gpt-test")
            .with_api_key("sk-test"),
    )
}

fn chat_response(text: &str) -> serde_json::Value {
    json!({
        "model": "gpt-test",
        "choices": [{"message": {"role": "assistant", "content": text}, "finish_reason": "stop"}],
        "usage": {"prompt_tokens": 12, "completion_tokens": 3}
    })
}

#[tokio::test]
async fn test_openai_compatible_generate() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(header_exists("x-request-id"))
        .and(body_partial_json(json!({"model": "gpt-test"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("Hello there")))
        .expect(1)
        .mount(&server)
        .await;

    let completion = openai(&server)
        .generate(&GenerationRequest::new("hi"))
        .await
        .unwrap();
    assert_eq!(completion.text, "Hello there");
    assert_eq!(completion.model, "gpt-test");
    assert_eq!(completion.usage.unwrap().total(), 15);
}

#[tokio::test]
async fn test_rate_limit_carries_retry_after() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(429)
                .insert_header("retry-after", "7")
                .set_body_json(json!({"error": {"message": "Rate limit reached", "type": "requests"}})),
        )
        .mount(&server)
        .await;

    let err = openai(&server)
        .generate(&GenerationRequest::new("hi"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::RateLimited);
    assert_eq!(err.retry_after, Some(Duration::from_secs(7)));
}

#[tokio::test]
async fn test_unauthorized_is_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({"error": {"message": "Incorrect API key provided", "code": "invalid_api_key"}})),
        )
        .mount(&server)
        .await;

    let err = openai(&server)
        .generate(&GenerationRequest::new("hi"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Auth);
    assert!(!err.is_transient());
    assert!(err.message.contains("Incorrect API key"));
}

#[tokio::test]
async fn test_server_error_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("upstream down"))
        .mount(&server)
        .await;

    let err = openai(&server)
        .generate(&GenerationRequest::new("hi"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unavailable);
    assert!(err.is_transient());
}

#[tokio::test]
async fn test_openai_health_check_lists_models() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    assert!(openai(&server).health_check().await);
}

#[tokio::test]
async fn test_health_check_fails_on_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    assert!(!openai(&server).health_check().await);
}

#[tokio::test]
async fn test_openai_stream_yields_deltas() {
    let server = MockServer::start().await;
    let events = "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n\
                  data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n\
                  data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n\
                  data: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(events, "text/event-stream"))
        .mount(&server)
        .await;

    let stream = openai(&server)
        .stream(&GenerationRequest::new("hi"))
        .await
        .unwrap();
    let chunks: Vec<String> = stream.map(|chunk| chunk.unwrap()).collect().await;
    assert_eq!(chunks, vec!["Hel".to_string(), "lo".to_string()]);
}

#[tokio::test]
async fn test_azure_deployment_url_and_key_header() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/openai/deployments/gpt4o-prod/chat/completions"))
        .and(query_param("api-version", "2024-06-01"))
        .and(header("api-key", "azure-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("from azure")))
        .expect(1)
        .mount(&server)
        .await;

    let azure = adapter(
        ProviderConfig::new("azure", ProviderKind::Azure)
            .with_base_url(server.uri())
            .with_model("gpt4o-prod")
            .with_api_key("azure-key"),
    );
    let completion = azure.generate(&GenerationRequest::new("hi")).await.unwrap();
    assert_eq!(completion.text, "from azure");
}

#[tokio::test]
async fn test_anthropic_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/messages"))
        .and(header("x-api-key", "ant-key"))
        .and(header("anthropic-version", "2023-06-01"))
        .and(body_partial_json(json!({"max_tokens": 1024, "system": "be brief"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "claude-test",
            "content": [{"type": "text", "text": "Brief."}],
            "usage": {"input_tokens": 9, "output_tokens": 2}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let anthropic = adapter(
        ProviderConfig::new("anthropic", ProviderKind::Anthropic)
            .with_base_url(server.uri())
            .with_api_key("ant-key"),
    );
    let completion = anthropic
        .generate(&GenerationRequest::new("hi").with_system("be brief"))
        .await
        .unwrap();
    assert_eq!(completion.text, "Brief.");
    assert_eq!(completion.model, "claude-test");
    assert_eq!(completion.usage.unwrap().prompt_tokens, 9);
}

#[tokio::test]
async fn test_anthropic_overload_is_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(529).set_body_json(json!({
            "type": "error",
            "error": {"type": "overloaded_error", "message": "Overloaded"}
        })))
        .mount(&server)
        .await;

    let anthropic = adapter(
        ProviderConfig::new("anthropic", ProviderKind::Anthropic)
            .with_base_url(server.uri())
            .with_api_key("ant-key"),
    );
    let err = anthropic
        .generate(&GenerationRequest::new("hi"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unavailable);
}

#[tokio::test]
async fn test_gemini_generate_content() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/models/gemini-test:generateContent"))
        .and(header("x-goog-api-key", "g-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Bonjour"}]}, "finishReason": "STOP"}],
            "usageMetadata": {"promptTokenCount": 5, "candidatesTokenCount": 1}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gemini = adapter(
        ProviderConfig::new("gemini", ProviderKind::Gemini)
            .with_base_url(server.uri())
            .with_model("gemini-test")
            .with_api_key("g-key"),
    );
    let completion = gemini.generate(&GenerationRequest::new("hi")).await.unwrap();
    assert_eq!(completion.text, "Bonjour");
    assert_eq!(completion.usage.unwrap().completion_tokens, 1);
}

#[tokio::test]
async fn test_ollama_chat_and_tags() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(body_partial_json(json!({"model": "llama-test", "stream": false})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "llama-test",
            "message": {"role": "assistant", "content": "local answer"},
            "done": true,
            "prompt_eval_count": 7,
            "eval_count": 4
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/tags"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .mount(&server)
        .await;

    let ollama = adapter(
        ProviderConfig::new("ollama", ProviderKind::Ollama)
            .with_base_url(server.uri())
            .with_model("llama-test"),
    );
    let completion = ollama.generate(&GenerationRequest::new("hi")).await.unwrap();
    assert_eq!(completion.text, "local answer");
    assert_eq!(completion.usage.unwrap().total(), 11);
    assert_eq!(ollama.estimate_cost(&completion.usage.unwrap()), 0.0);
    assert!(ollama.health_check().await);
}

#[tokio::test]
async fn test_ollama_stream_reads_ndjson() {
    let server = MockServer::start().await;
    let lines = "{\"message\":{\"content\":\"a\"},\"done\":false}\n\
                 {\"message\":{\"content\":\"b\"},\"done\":false}\n\
                 {\"message\":{\"content\":\"\"},\"done\":true}\n";
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(lines, "application/x-ndjson"))
        .mount(&server)
        .await;

    let ollama = adapter(ProviderConfig::new("ollama", ProviderKind::Ollama).with_base_url(server.uri()));
    let chunks: Vec<String> = ollama
        .stream(&GenerationRequest::new("hi"))
        .await
        .unwrap()
        .map(|chunk| chunk.unwrap())
        .collect()
        .await;
    assert_eq!(chunks.concat(), "ab");
}

#[tokio::test]
async fn test_dispatcher_fails_over_between_http_backends() {
    let primary = MockServer::start().await;
    let backup = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&primary)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(chat_response("backup says hi")))
        .expect(1)
        .mount(&backup)
        .await;

    let yaml = format!(
        r#"
version: "0.1"
default_provider: primary
providers:
  - name: primary
    type: vllm
    base_url: "{}"
  - name: backup
    type: openai
    base_url: "{}"
    api_key: sk-backup
failover:
  retry:
    initial_delay_ms: 0
    max_delay_ms: 0
    jitter_factor: 0.0
"#,
        primary.uri(),
        backup.uri()
    );
    let config: RelayConfig = serde_yaml::from_str(&yaml).unwrap();
    config.validate().unwrap();

    let http = HttpClient::from_config(&config.connection).unwrap();
    let registry = ProviderRegistry::from_config_with(&config, http, |_| None).unwrap();
    let dispatcher = RequestDispatcher::new(Arc::new(registry), &config);

    let result = dispatcher.generate("hello", "general", None).await.unwrap();
    assert_eq!(result.provider, "backup");
    assert_eq!(result.text, "backup says hi");
    assert_eq!(result.recovered_failures.len(), 1);
    assert_eq!(result.recovered_failures[0].kind, ErrorKind::Unavailable);

    let usage = dispatcher.usage_summary();
    assert_eq!(usage["primary"].failed_requests, 1);
    assert_eq!(usage["backup"].requests, 1);
}
