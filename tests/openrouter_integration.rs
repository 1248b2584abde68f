//! OpenRouter client against a mock completion API

use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use horizon::config::ProviderConfig;
use horizon::providers::{
    ChatContext, CompletionClient, Message, OpenRouterClient, ProviderErrorKind, ReplySource,
};

fn client_for(server: &MockServer) -> OpenRouterClient {
    let config = ProviderConfig {
        api_key: Some("sk-test".to_string()),
        base_url: server.uri(),
        model: "test/physics-model".to_string(),
        timeout_seconds: 1,
        ..Default::default()
    };
    OpenRouterClient::new(config).expect("failed to create client")
}

fn completion_body(content: &str) -> Value {
    json!({
        "id": "gen-1",
        "model": "test/physics-model",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}],
        "usage": {"prompt_tokens": 120, "completion_tokens": 40, "total_tokens": 160}
    })
}

async fn mount_status(server: &MockServer, status: u16) {
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(status).set_body_string("upstream says no"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_successful_completion() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(header("x-title", "Horizon Physics AI Assistant"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Photons are massless.")))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server);
    let reply = client
        .generate("Do photons have mass?", &[], &ChatContext::for_user("ada"))
        .await
        .expect("completion failed");

    assert_eq!(reply.content, "Photons are massless.");
    assert_eq!(reply.model, "test/physics-model");
    assert_eq!(reply.usage.map(|u| u.total_tokens), Some(160));
    assert_eq!(reply.source, ReplySource::Primary);
}

#[tokio::test]
async fn test_request_body_shape() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("ok")))
        .mount(&server)
        .await;

    let history: Vec<Message> = (0..25)
        .map(|i| {
            if i % 2 == 0 {
                Message::user(format!("q{}", i))
            } else {
                Message::assistant(format!("a{}", i))
            }
        })
        .collect();

    let client = client_for(&server);
    client
        .generate("Derive the formula", &history, &ChatContext::for_user("ada"))
        .await
        .expect("completion failed");

    let requests = server.received_requests().await.expect("recording enabled");
    assert_eq!(requests.len(), 1);
    let body: Value = serde_json::from_slice(&requests[0].body).unwrap();

    assert_eq!(body["model"], "test/physics-model");
    assert_eq!(body["max_tokens"], 2000);
    assert_eq!(body["stream"], false);
    assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);

    let messages = body["messages"].as_array().unwrap();
    // system + 20 most recent history entries + current message
    assert_eq!(messages.len(), 22);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages[1]["content"], "a5");
    assert_eq!(messages[20]["content"], "q24");
    let last = messages[21]["content"].as_str().unwrap();
    assert!(last.starts_with("User ada asks: Derive the formula"));
    assert!(last.contains("derivation step by step"));
    assert!(last.contains("mathematical equations"));
}

#[tokio::test]
async fn test_service_unavailable_is_classified() {
    let server = MockServer::start().await;
    mount_status(&server, 503).await;

    let error = client_for(&server)
        .generate("black holes", &[], &ChatContext::default())
        .await
        .unwrap_err();
    assert_eq!(error.kind, ProviderErrorKind::ServiceUnavailable);
}

#[tokio::test]
async fn test_rate_limited_is_classified() {
    let server = MockServer::start().await;
    mount_status(&server, 429).await;

    let error = client_for(&server)
        .generate("black holes", &[], &ChatContext::default())
        .await
        .unwrap_err();
    assert_eq!(error.kind, ProviderErrorKind::RateLimited);
}

#[tokio::test]
async fn test_auth_failure_is_classified() {
    let server = MockServer::start().await;
    mount_status(&server, 401).await;

    let error = client_for(&server)
        .generate("black holes", &[], &ChatContext::default())
        .await
        .unwrap_err();
    assert_eq!(error.kind, ProviderErrorKind::AuthFailed);
}

#[tokio::test]
async fn test_server_error_keeps_detail() {
    let server = MockServer::start().await;
    mount_status(&server, 500).await;

    let error = client_for(&server)
        .generate("black holes", &[], &ChatContext::default())
        .await
        .unwrap_err();
    assert_eq!(error.kind, ProviderErrorKind::Unknown);
    assert!(error.message.contains("upstream says no"));
}

#[tokio::test]
async fn test_slow_provider_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("too late"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let error = client_for(&server)
        .generate("relativity", &[], &ChatContext::default())
        .await
        .unwrap_err();
    assert_eq!(error.kind, ProviderErrorKind::Timeout);
}

#[tokio::test]
async fn test_empty_content_is_a_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let error = client_for(&server)
        .generate("relativity", &[], &ChatContext::default())
        .await
        .unwrap_err();
    assert_eq!(error.kind, ProviderErrorKind::Unknown);
}

#[tokio::test]
async fn test_connection_check_reports_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Physics is...")))
        .mount(&server)
        .await;

    let report = client_for(&server).test_connection().await;
    assert!(report.success);
    assert_eq!(report.model.as_deref(), Some("test/physics-model"));
    assert_eq!(report.response_length, Some("Physics is...".len()));
    assert!(report.error_kind.is_none());
    assert!(report.into_error().is_none());
}

#[tokio::test]
async fn test_unreachable_provider_is_service_unavailable() {
    let config = ProviderConfig {
        api_key: Some("sk-test".to_string()),
        // nothing listens on the discard port
        base_url: "http://127.0.0.1:9".to_string(),
        timeout_seconds: 2,
        ..Default::default()
    };
    let error = OpenRouterClient::new(config)
        .unwrap()
        .generate("hi", &[], &ChatContext::default())
        .await
        .unwrap_err();
    assert!(matches!(
        error.kind,
        ProviderErrorKind::ServiceUnavailable | ProviderErrorKind::Timeout
    ));
}

/// Serve one connection: headers announcing a long body, a fragment of it,
/// then silence
async fn stalling_server(status_line: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buffer = vec![0u8; 16 * 1024];
        let _ = socket.read(&mut buffer).await;
        let head = format!(
            "{}\r\ncontent-type: application/json\r\ncontent-length: 500\r\n\r\n{{\"choices\": [",
            status_line
        );
        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.flush().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
    });
    format!("http://{}", address)
}

fn client_for_url(base_url: String) -> OpenRouterClient {
    let config = ProviderConfig {
        api_key: Some("sk-test".to_string()),
        base_url,
        timeout_seconds: 1,
        ..Default::default()
    };
    OpenRouterClient::new(config).expect("failed to create client")
}

#[tokio::test]
async fn test_body_stalling_after_headers_is_a_timeout() {
    let base_url = stalling_server("HTTP/1.1 200 OK").await;

    let error = client_for_url(base_url)
        .generate("relativity", &[], &ChatContext::default())
        .await
        .unwrap_err();
    assert_eq!(error.kind, ProviderErrorKind::Timeout);
}

#[tokio::test]
async fn test_error_body_stalling_is_a_timeout() {
    let base_url = stalling_server("HTTP/1.1 500 Internal Server Error").await;

    let error = client_for_url(base_url)
        .generate("relativity", &[], &ChatContext::default())
        .await
        .unwrap_err();
    assert_eq!(error.kind, ProviderErrorKind::Timeout);
}
