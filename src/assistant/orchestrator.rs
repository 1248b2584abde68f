//! Chat request orchestration
//!
//! [`ChatService`] sequences one chat request: authorize, validate, resolve
//! or create the conversation, persist the user turn, ask the completion
//! client, fall back to a canned answer on any provider failure, persist the
//! assistant turn, and record exactly one statistics outcome.

use crate::assistant::fallback::FallbackResponder;
use crate::assistant::stats::{Outcome, Statistics};
use crate::assistant::topic::detect_topic;
use crate::error::HorizonError;
use crate::providers::{ChatContext, CompletionClient, Message, ReplySource};
use crate::storage::{run_blocking, ChatMessage, Conversation, ConversationStore, NewMessage};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use std::time::Instant;

/// Words kept when deriving a title from the first message
const TITLE_WORDS: usize = 6;

/// Longest derived title, in characters
const TITLE_MAX_CHARS: usize = 50;

/// Topic recorded for requests rejected before reaching the provider
const REJECTED_TOPIC: &str = "error";

/// Model recorded on fallback answers
const FALLBACK_MODEL: &str = "fallback";

/// Display name reported for fallback answers
const FALLBACK_DISPLAY_NAME: &str = "Local Fallback";

/// Authenticated caller, established by the session layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub user_id: String,
    pub username: Option<String>,
}

impl SessionUser {
    pub fn new(user_id: impl Into<String>, username: Option<String>) -> Self {
        Self {
            user_id: user_id.into(),
            username,
        }
    }
}

/// Body of a chat request
///
/// A missing or null `message` is kept as `None` and rejected as empty by
/// [`ChatService::handle`], after the caller has been authorized.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    /// Client-supplied attributes, stored as the user message's metadata
    #[serde(default)]
    pub context: Map<String, Value>,
}

impl ChatRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Build a request from a raw request body without ever failing
    ///
    /// Fields of the wrong type are treated as absent, and a body that is not
    /// a JSON object yields an empty request.
    ///
    /// # Arguments
    ///
    /// * `body` - Raw bytes as received from the client
    ///
    /// # Returns
    ///
    /// Returns the fields that could be read
    ///
    /// # Examples
    ///
    /// ```
    /// use horizon::assistant::ChatRequest;
    ///
    /// let request = ChatRequest::from_body(br#"{"message": "Why is the sky blue?"}"#);
    /// assert_eq!(request.message.as_deref(), Some("Why is the sky blue?"));
    ///
    /// assert!(ChatRequest::from_body(b"not json").message.is_none());
    /// assert!(ChatRequest::from_body(br#"{"message": null}"#).message.is_none());
    /// ```
    pub fn from_body(body: &[u8]) -> Self {
        let value: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(e) => {
                if !body.is_empty() {
                    tracing::debug!("Chat body is not valid JSON: {}", e);
                }
                return Self::default();
            }
        };

        let text = |key: &str| value.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            message: text("message"),
            conversation_id: text("conversationId"),
            context: value
                .get("context")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        }
    }

    pub fn in_conversation(mut self, conversation_id: impl Into<String>) -> Self {
        self.conversation_id = Some(conversation_id.into());
        self
    }
}

/// Summary attached to every chat answer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseContext {
    pub category: &'static str,
    /// Display name of whatever produced the answer
    pub model: String,
    pub topic: &'static str,
}

/// Successful chat answer
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub response: String,
    pub conversation_id: String,
    pub timestamp: DateTime<Utc>,
    /// Handling time formatted as `<n>ms`
    pub response_time: String,
    /// Same metadata that was stored with the assistant message
    pub metadata: Value,
    pub context: ResponseContext,
}

/// Derive a conversation title from its first message
///
/// # Examples
///
/// ```
/// use horizon::assistant::generate_title;
///
/// assert_eq!(generate_title("What is spin?"), "What is spin?");
/// assert_eq!(
///     generate_title("Why do clocks run slow near massive objects?"),
///     "Why do clocks run slow near..."
/// );
/// ```
pub fn generate_title(message: &str) -> String {
    let words: Vec<&str> = message.split_whitespace().collect();
    let mut title = words
        .iter()
        .take(TITLE_WORDS)
        .copied()
        .collect::<Vec<_>>()
        .join(" ");

    if words.len() > TITLE_WORDS {
        title.push_str("...");
    }

    if title.chars().count() > TITLE_MAX_CHARS {
        let mut cut: String = title.chars().take(TITLE_MAX_CHARS - 3).collect();
        cut.push_str("...");
        cut
    } else {
        title
    }
}

/// Chat request coordinator
pub struct ChatService {
    store: Arc<dyn ConversationStore>,
    client: Arc<dyn CompletionClient>,
    fallback: FallbackResponder,
    stats: Arc<Statistics>,
    max_message_length: usize,
    display_name: String,
}

impl ChatService {
    /// Create a service with an OS-seeded fallback responder
    ///
    /// The display name defaults to the client's model identifier.
    ///
    /// # Arguments
    ///
    /// * `store` - Conversation store shared with the HTTP handlers
    /// * `client` - Completion client asked for every answer
    /// * `stats` - Aggregator receiving one outcome per request
    /// * `max_message_length` - Longest accepted message, in characters
    ///
    /// # Returns
    ///
    /// Returns a ready chat service
    pub fn new(
        store: Arc<dyn ConversationStore>,
        client: Arc<dyn CompletionClient>,
        stats: Arc<Statistics>,
        max_message_length: usize,
    ) -> Self {
        let display_name = client.model();
        Self {
            store,
            client,
            fallback: FallbackResponder::new(),
            stats,
            max_message_length,
            display_name,
        }
    }

    /// Replace the fallback responder, e.g. with a seeded one
    pub fn with_fallback(mut self, fallback: FallbackResponder) -> Self {
        self.fallback = fallback;
        self
    }

    /// Name reported in `context.model` for primary answers
    pub fn with_display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = display_name.into();
        self
    }

    pub fn store(&self) -> &Arc<dyn ConversationStore> {
        &self.store
    }

    pub fn client(&self) -> &Arc<dyn CompletionClient> {
        &self.client
    }

    pub fn statistics(&self) -> &Arc<Statistics> {
        &self.stats
    }

    pub fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Handle one chat request
    ///
    /// Provider failures never surface here; they turn into a fallback
    /// answer.
    ///
    /// # Errors
    ///
    /// Returns [`HorizonError::Unauthorized`] without a caller,
    /// [`HorizonError::EmptyMessage`] or [`HorizonError::MessageTooLong`] for
    /// invalid input (nothing is persisted), [`HorizonError::NotFound`] for a
    /// missing or foreign conversation, and [`HorizonError::Storage`] when a
    /// read or write fails.
    pub async fn handle(
        &self,
        caller: Option<&SessionUser>,
        request: ChatRequest,
    ) -> Result<ChatResponse, HorizonError> {
        let started = Instant::now();
        let result = self.process(caller, request, started).await;
        let elapsed = elapsed_ms(started);

        match result {
            Ok((response, outcome)) => {
                self.stats.record(outcome);
                Ok(response)
            }
            Err(e) => {
                match &e {
                    HorizonError::Storage(detail) => {
                        tracing::error!("Chat request failed in storage: {}", detail)
                    }
                    other => tracing::debug!("Chat request rejected: {}", other),
                }
                self.stats
                    .record(Outcome::failure(elapsed, REJECTED_TOPIC, e.code()));
                Err(e)
            }
        }
    }

    async fn process(
        &self,
        caller: Option<&SessionUser>,
        request: ChatRequest,
        started: Instant,
    ) -> Result<(ChatResponse, Outcome), HorizonError> {
        let caller = caller.ok_or(HorizonError::Unauthorized)?;

        let raw = request.message.as_deref().unwrap_or_default();
        let message = raw.trim().to_string();
        if message.is_empty() {
            return Err(HorizonError::EmptyMessage);
        }
        let length = raw.chars().count();
        if length > self.max_message_length {
            return Err(HorizonError::MessageTooLong {
                length,
                max: self.max_message_length,
            });
        }

        let conversation_id = request
            .conversation_id
            .filter(|id| !id.trim().is_empty());
        let (conversation, history) = self
            .resolve_conversation(&caller.user_id, conversation_id, &message)
            .await?;

        let user_turn = NewMessage::user(message.clone(), Value::Object(request.context.clone()));
        let conversation_key = conversation.id.clone();
        run_blocking(&self.store, move |s| {
            s.append_message(&conversation_key, user_turn)
        })
        .await?;

        let context = ChatContext {
            username: caller.username.clone(),
            user_id: Some(caller.user_id.clone()),
            conversation_id: Some(conversation.id.clone()),
            extra: request.context,
        };
        let history: Vec<Message> = history
            .into_iter()
            .map(|turn| Message {
                role: turn.role.as_str().to_string(),
                content: turn.content,
            })
            .collect();

        tracing::debug!(
            "Chat request: conversation={}, history={} messages",
            conversation.id,
            history.len()
        );

        let topic = detect_topic(&message);
        let (text, metadata, tokens, model, display_name, outcome_reason) =
            match self.client.generate(&message, &history, &context).await {
                Ok(reply) => {
                    let tokens = reply.usage.map(|u| u.total_tokens).unwrap_or(0);
                    let metadata = json!({
                        "source": ReplySource::Primary,
                        "model": reply.model,
                        "usage": reply.usage,
                        "timestamp": reply.timestamp,
                    });
                    (
                        reply.content,
                        metadata,
                        tokens,
                        reply.model,
                        self.display_name.clone(),
                        None,
                    )
                }
                Err(e) => {
                    tracing::warn!(
                        "Completion failed ({}), answering from local fallback: {}",
                        e.kind,
                        e.message
                    );
                    let reply = self.fallback.generate(&message, &context);
                    let metadata = json!({
                        "source": ReplySource::LocalFallback,
                        "fallbackReason": e.message,
                        "errorKind": e.kind,
                        "timestamp": Utc::now(),
                    });
                    (
                        reply.text,
                        metadata,
                        0,
                        FALLBACK_MODEL.to_string(),
                        FALLBACK_DISPLAY_NAME.to_string(),
                        Some(e.kind.as_str()),
                    )
                }
            };

        let assistant_turn = NewMessage::assistant(text.clone(), metadata.clone(), tokens, model);
        let conversation_key = conversation.id.clone();
        run_blocking(&self.store, move |s| {
            s.append_message(&conversation_key, assistant_turn)
        })
        .await?;

        let elapsed = elapsed_ms(started);
        let outcome = match outcome_reason {
            None => Outcome::success(elapsed, tokens, topic),
            Some(reason) => Outcome::failure(elapsed, topic, reason),
        };

        tracing::info!(
            "Chat answered in {}ms: conversation={}, topic={}, source={}",
            elapsed,
            conversation.id,
            topic,
            metadata["source"].as_str().unwrap_or_default()
        );

        let response = ChatResponse {
            response: text,
            conversation_id: conversation.id,
            timestamp: Utc::now(),
            response_time: format!("{}ms", elapsed),
            metadata,
            context: ResponseContext {
                category: "physics",
                model: display_name,
                topic,
            },
        };

        Ok((response, outcome))
    }

    async fn resolve_conversation(
        &self,
        user_id: &str,
        conversation_id: Option<String>,
        message: &str,
    ) -> Result<(Conversation, Vec<ChatMessage>), HorizonError> {
        let user_id = user_id.to_string();
        match conversation_id {
            Some(id) => Ok(run_blocking(&self.store, move |s| {
                let conversation = s.get_conversation(&id, &user_id)?;
                let messages = s.get_messages(&id, &user_id)?;
                Ok((conversation, messages))
            })
            .await?),
            None => {
                let title = generate_title(message);
                let conversation = run_blocking(&self.store, move |s| {
                    s.create_conversation(&user_id, Some(&title))
                })
                .await?;
                tracing::info!("Created conversation {}", conversation.id);
                Ok((conversation, Vec::new()))
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{MockCompletionClient, ProviderError, ProviderErrorKind, TokenUsage};
    use crate::storage::{ConversationSummary, Role, StoreError, StoreResult};
    use crate::test_utils::{primary_reply, temp_store};

    fn answering_client(answer: &'static str) -> MockCompletionClient {
        let mut client = MockCompletionClient::new();
        client
            .expect_model()
            .returning(|| "test/model".to_string());
        client.expect_generate().returning(move |_, _, _| {
            Ok(primary_reply(
                answer,
                "test/model",
                Some(TokenUsage::new(30, 12)),
            ))
        });
        client
    }

    fn failing_client(kind: ProviderErrorKind) -> MockCompletionClient {
        let mut client = MockCompletionClient::new();
        client
            .expect_model()
            .returning(|| "test/model".to_string());
        client
            .expect_generate()
            .returning(move |_, _, _| Err(ProviderError::new(kind, kind.describe())));
        client
    }

    fn service(store: Arc<dyn ConversationStore>, client: MockCompletionClient) -> ChatService {
        ChatService::new(store, Arc::new(client), Arc::new(Statistics::new()), 2000)
            .with_fallback(FallbackResponder::with_seed(7))
    }

    fn alice() -> SessionUser {
        SessionUser::new("alice", Some("Alice".to_string()))
    }

    #[test]
    fn test_generate_title_short_message() {
        assert_eq!(generate_title("Hello there"), "Hello there");
    }

    #[test]
    fn test_generate_title_truncates_words() {
        assert_eq!(
            generate_title("one two three four five six seven"),
            "one two three four five six..."
        );
    }

    #[test]
    fn test_generate_title_collapses_whitespace() {
        assert_eq!(generate_title("  spin   of  electrons "), "spin of electrons");
    }

    #[test]
    fn test_generate_title_caps_length() {
        let title = generate_title(
            "Supercalifragilistic electromagnetohydrodynamics interdisciplinary \
             thermodynamical considerations matter",
        );
        assert_eq!(title.chars().count(), 50);
        assert!(title.ends_with("..."));
    }

    #[test]
    fn test_request_from_body_ignores_wrong_types() {
        let request = ChatRequest::from_body(
            br#"{"message": 5, "conversationId": "c-1", "context": {"page": "optics"}}"#,
        );
        assert!(request.message.is_none());
        assert_eq!(request.conversation_id.as_deref(), Some("c-1"));
        assert_eq!(request.context["page"], "optics");

        let request = ChatRequest::from_body(br#"["message"]"#);
        assert!(request.message.is_none());
        assert!(request.context.is_empty());
    }

    #[tokio::test]
    async fn test_missing_message_is_empty() {
        let (store, _dir) = temp_store();
        let mut client = MockCompletionClient::new();
        client.expect_model().returning(|| "m".to_string());
        client.expect_generate().never();
        let service = service(Arc::clone(&store), client);

        let error = service
            .handle(Some(&alice()), ChatRequest::from_body(br#"{"message": null}"#))
            .await
            .unwrap_err();
        assert!(matches!(error, HorizonError::EmptyMessage));
        assert_eq!(service.statistics().snapshot().error_counts["EMPTY_MESSAGE"], 1);
    }

    #[tokio::test]
    async fn test_primary_answer_is_persisted_with_metadata() {
        let (store, _dir) = temp_store();
        let service = service(Arc::clone(&store), answering_client("Spin is intrinsic."))
            .with_display_name("Test Model");

        let response = service
            .handle(Some(&alice()), ChatRequest::new("  What is spin?  "))
            .await
            .unwrap();

        assert_eq!(response.response, "Spin is intrinsic.");
        assert_eq!(response.metadata["source"], "primary");
        assert_eq!(response.metadata["usage"]["total_tokens"], 42);
        assert_eq!(response.context.model, "Test Model");
        assert_eq!(response.context.topic, "general_physics");
        assert!(response.response_time.ends_with("ms"));

        let messages = store
            .get_messages(&response.conversation_id, "alice")
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "What is spin?");
        assert_eq!(messages[1].role, Role::Assistant);
        assert_eq!(messages[1].tokens_used, 42);
        assert_eq!(messages[1].model_used.as_deref(), Some("test/model"));

        let conversation = store
            .get_conversation(&response.conversation_id, "alice")
            .unwrap();
        assert_eq!(conversation.title, "What is spin?");

        let snapshot = service.statistics().snapshot();
        assert_eq!(snapshot.successful_requests, 1);
        assert_eq!(snapshot.total_tokens_used, 42);
    }

    #[tokio::test]
    async fn test_provider_failure_falls_back() {
        let (store, _dir) = temp_store();
        let service = service(
            Arc::clone(&store),
            failing_client(ProviderErrorKind::ServiceUnavailable),
        );

        let response = service
            .handle(Some(&alice()), ChatRequest::new("Explain black holes"))
            .await
            .unwrap();

        assert!(response.response.contains("event horizon"));
        assert_eq!(response.metadata["source"], "local-fallback");
        assert_eq!(response.metadata["errorKind"], "service_unavailable");
        assert_eq!(response.context.model, "Local Fallback");
        assert_eq!(response.context.topic, "black_holes");

        let messages = store
            .get_messages(&response.conversation_id, "alice")
            .unwrap();
        assert_eq!(messages[1].tokens_used, 0);
        assert_eq!(messages[1].model_used.as_deref(), Some("fallback"));

        let snapshot = service.statistics().snapshot();
        assert_eq!(snapshot.failed_requests, 1);
        assert_eq!(snapshot.error_counts["service_unavailable"], 1);
    }

    #[tokio::test]
    async fn test_history_is_passed_to_client() {
        let (store, _dir) = temp_store();
        let mut client = MockCompletionClient::new();
        client.expect_model().returning(|| "m".to_string());
        client
            .expect_generate()
            .withf(|message, history, context| {
                message.to_string() == "second"
                    && history.len() == 2
                    && history[0].role == "user"
                    && history[1].role == "assistant"
                    && context.username.as_deref() == Some("Alice")
            })
            .times(1)
            .returning(|_, _, _| Ok(primary_reply("again", "m", None)));

        let conversation = store.create_conversation("alice", None).unwrap();
        store
            .append_message(&conversation.id, NewMessage::user("first", json!({})))
            .unwrap();
        store
            .append_message(
                &conversation.id,
                NewMessage::assistant("answer", json!({}), 0, "m"),
            )
            .unwrap();

        let service = service(Arc::clone(&store), client);
        let response = service
            .handle(
                Some(&alice()),
                ChatRequest::new("second").in_conversation(conversation.id.clone()),
            )
            .await
            .unwrap();
        assert_eq!(response.conversation_id, conversation.id);
        assert_eq!(store.get_messages(&conversation.id, "alice").unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_unauthorized_precedes_validation() {
        let (store, _dir) = temp_store();
        let mut client = MockCompletionClient::new();
        client.expect_model().returning(|| "m".to_string());
        client.expect_generate().never();
        let service = service(Arc::clone(&store), client);

        let error = service.handle(None, ChatRequest::new("")).await.unwrap_err();
        assert!(matches!(error, HorizonError::Unauthorized));

        let snapshot = service.statistics().snapshot();
        assert_eq!(snapshot.total_requests, 1);
        assert_eq!(snapshot.error_counts["UNAUTHORIZED"], 1);
    }

    #[tokio::test]
    async fn test_invalid_messages_persist_nothing() {
        let (store, _dir) = temp_store();
        let mut client = MockCompletionClient::new();
        client.expect_model().returning(|| "m".to_string());
        client.expect_generate().never();
        let service = service(Arc::clone(&store), client);

        let error = service
            .handle(Some(&alice()), ChatRequest::new("   "))
            .await
            .unwrap_err();
        assert!(matches!(error, HorizonError::EmptyMessage));

        let error = service
            .handle(Some(&alice()), ChatRequest::new("x".repeat(2001)))
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            HorizonError::MessageTooLong {
                length: 2001,
                max: 2000
            }
        ));

        assert!(store.list_conversations("alice").unwrap().is_empty());
        let snapshot = service.statistics().snapshot();
        assert_eq!(snapshot.failed_requests, 2);
        assert_eq!(snapshot.error_counts["MESSAGE_TOO_LONG"], 1);
    }

    #[tokio::test]
    async fn test_length_limit_counts_characters() {
        let (store, _dir) = temp_store();
        let service = service(store, answering_client("ok"));
        let message = "é".repeat(2000);
        assert!(service
            .handle(Some(&alice()), ChatRequest::new(message))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_foreign_conversation_is_not_found() {
        let (store, _dir) = temp_store();
        let conversation = store.create_conversation("bob", None).unwrap();
        let mut client = MockCompletionClient::new();
        client.expect_model().returning(|| "m".to_string());
        client.expect_generate().never();
        let service = service(Arc::clone(&store), client);

        let error = service
            .handle(
                Some(&alice()),
                ChatRequest::new("hi").in_conversation(conversation.id.clone()),
            )
            .await
            .unwrap_err();
        assert!(matches!(error, HorizonError::NotFound(_)));
        assert!(store.get_messages(&conversation.id, "bob").unwrap().is_empty());
    }

    struct BrokenStore;

    impl ConversationStore for BrokenStore {
        fn create_conversation(&self, _: &str, _: Option<&str>) -> StoreResult<Conversation> {
            Err(StoreError::Storage("disk I/O error".into()))
        }
        fn list_conversations(&self, _: &str) -> StoreResult<Vec<ConversationSummary>> {
            Err(StoreError::Storage("disk I/O error".into()))
        }
        fn get_conversation(&self, _: &str, _: &str) -> StoreResult<Conversation> {
            Err(StoreError::Storage("disk I/O error".into()))
        }
        fn get_messages(&self, _: &str, _: &str) -> StoreResult<Vec<ChatMessage>> {
            Err(StoreError::Storage("disk I/O error".into()))
        }
        fn append_message(&self, _: &str, _: NewMessage) -> StoreResult<ChatMessage> {
            Err(StoreError::Storage("disk I/O error".into()))
        }
        fn rename_conversation(&self, _: &str, _: &str, _: &str) -> StoreResult<Conversation> {
            Err(StoreError::Storage("disk I/O error".into()))
        }
        fn delete_conversation(&self, _: &str, _: &str) -> StoreResult<Conversation> {
            Err(StoreError::Storage("disk I/O error".into()))
        }
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces_as_storage_error() {
        let mut client = MockCompletionClient::new();
        client.expect_model().returning(|| "m".to_string());
        client.expect_generate().never();
        let service = service(Arc::new(BrokenStore), client);

        let error = service
            .handle(Some(&alice()), ChatRequest::new("quantum?"))
            .await
            .unwrap_err();
        assert!(matches!(error, HorizonError::Storage(_)));
        assert_eq!(
            service.statistics().snapshot().error_counts["INTERNAL_ERROR"],
            1
        );
    }
}
