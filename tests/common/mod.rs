use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::Value;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use horizon::assistant::{ChatService, FallbackResponder, Statistics};
use horizon::providers::{
    AssistantReply, ChatContext, CompletionClient, Message, ProviderError, ProviderErrorKind,
    ProviderResult, ReplySource, TokenUsage,
};
use horizon::server::{self, AppState, IdentityHeaders};
use horizon::storage::{ConversationStore, SqliteConversationStore};

#[allow(dead_code)]
pub fn create_temp_store() -> (Arc<dyn ConversationStore>, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let db_path = tmp.path().join("conversations.db");
    let store = SqliteConversationStore::new_with_path(db_path)
        .expect("failed to create sqlite store with path");
    (Arc::new(store), tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Completion client that always answers with the same text
#[allow(dead_code)]
pub struct ScriptedClient {
    pub answer: String,
    pub calls: AtomicUsize,
}

#[allow(dead_code)]
impl ScriptedClient {
    pub fn new(answer: &str) -> Self {
        Self {
            answer: answer.to_string(),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn generate(
        &self,
        _message: &str,
        _history: &[Message],
        _context: &ChatContext,
    ) -> ProviderResult<AssistantReply> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(AssistantReply {
            content: self.answer.clone(),
            model: "scripted/model".to_string(),
            usage: Some(TokenUsage::new(20, 5)),
            timestamp: Utc::now(),
            source: ReplySource::Primary,
        })
    }

    fn model(&self) -> String {
        "scripted/model".to_string()
    }

    fn is_configured(&self) -> bool {
        true
    }
}

/// Completion client that always fails with the given kind
#[allow(dead_code)]
pub struct FailingClient(pub ProviderErrorKind);

#[async_trait]
impl CompletionClient for FailingClient {
    async fn generate(
        &self,
        _message: &str,
        _history: &[Message],
        _context: &ChatContext,
    ) -> ProviderResult<AssistantReply> {
        Err(ProviderError::new(self.0, self.0.describe()))
    }

    fn model(&self) -> String {
        "failing/model".to_string()
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// Application under test with its store kept reachable
#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub store: Arc<dyn ConversationStore>,
    _dir: TempDir,
}

#[allow(dead_code)]
pub fn test_app(client: Arc<dyn CompletionClient>) -> TestApp {
    test_app_with(client, 0)
}

#[allow(dead_code)]
pub fn test_app_with(client: Arc<dyn CompletionClient>, rate_limit: u32) -> TestApp {
    let (store, dir) = create_temp_store();
    let chat = ChatService::new(
        Arc::clone(&store),
        client,
        Arc::new(Statistics::new()),
        2000,
    )
    .with_fallback(FallbackResponder::with_seed(11))
    .with_display_name("Test Model");
    let state = Arc::new(AppState::new(Arc::new(chat)).with_rate_limit(rate_limit));
    let router = server::app(Arc::clone(&state), "", IdentityHeaders::default());

    TestApp {
        router,
        state,
        store,
        _dir: dir,
    }
}

fn request_builder(method: &str, uri: &str, user: Option<&str>) -> axum::http::request::Builder {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder
            .header("x-user-id", user)
            .header("x-username", format!("{}-name", user));
    }
    builder
}

/// Send one request and decode the JSON body (Null when empty)
#[allow(dead_code)]
pub async fn send(
    router: &Router,
    method: &str,
    uri: &str,
    user: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let builder = request_builder(method, uri, user);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("failed to build request"),
        None => builder.body(Body::empty()).expect("failed to build request"),
    };
    dispatch(router, request).await
}

/// POST a raw body, with an optional content type, and decode the JSON answer
#[allow(dead_code)]
pub async fn post_raw(
    router: &Router,
    uri: &str,
    user: Option<&str>,
    content_type: Option<&str>,
    body: &str,
) -> (StatusCode, Value) {
    let mut builder = request_builder("POST", uri, user);
    if let Some(content_type) = content_type {
        builder = builder.header("content-type", content_type);
    }
    let request = builder
        .body(Body::from(body.to_string()))
        .expect("failed to build request");
    dispatch(router, request).await
}

async fn dispatch(router: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = router
        .clone()
        .oneshot(request)
        .await
        .expect("router failed");
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("failed to read body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("response body is not JSON")
    };
    (status, value)
}
