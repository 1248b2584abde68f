//! Base completion-client trait and common types for Horizon
//!
//! This module defines the [`CompletionClient`] trait that every completion
//! backend implements, the wire-level message and usage types, and the typed
//! failure classification used by the chat service to decide on a fallback.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Message structure for a completion request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (system, user, assistant)
    pub role: String,
    /// Content of the message
    pub content: String,
}

impl Message {
    /// Creates a new user message
    ///
    /// # Examples
    ///
    /// ```
    /// use horizon::providers::Message;
    ///
    /// let msg = Message::user("What is spin?");
    /// assert_eq!(msg.role, "user");
    /// ```
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Creates a new assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }

    /// Creates a new system message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }
}

/// Token usage information from a completion
///
/// Tracks the number of tokens used in prompts and completions,
/// as reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Number of tokens in the prompt
    #[serde(default)]
    pub prompt_tokens: u64,
    /// Number of tokens in the completion
    #[serde(default)]
    pub completion_tokens: u64,
    /// Total tokens used (prompt + completion)
    #[serde(default)]
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Create a new TokenUsage instance
    ///
    /// # Examples
    ///
    /// ```
    /// use horizon::providers::TokenUsage;
    ///
    /// let usage = TokenUsage::new(100, 50);
    /// assert_eq!(usage.total_tokens, 150);
    /// ```
    pub fn new(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
        }
    }
}

/// Where an assistant answer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplySource {
    /// The external completion API
    #[serde(rename = "primary")]
    Primary,
    /// The local canned-answer generator
    #[serde(rename = "local-fallback")]
    LocalFallback,
}

impl ReplySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::LocalFallback => "local-fallback",
        }
    }
}

/// A successful completion
#[derive(Debug, Clone, PartialEq)]
pub struct AssistantReply {
    /// Answer text
    pub content: String,
    /// Model that produced the answer
    pub model: String,
    /// Token usage, when reported by the provider
    pub usage: Option<TokenUsage>,
    /// When the answer was received
    pub timestamp: DateTime<Utc>,
    pub source: ReplySource,
}

/// Caller context passed alongside a chat message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatContext {
    /// Display name used to personalise prompts and greetings
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    /// Free-form attributes supplied by the client
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChatContext {
    /// Context carrying only a username
    pub fn for_user(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            ..Default::default()
        }
    }
}

/// Classification of a failed completion call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    RateLimited,
    AuthFailed,
    BadRequest,
    ServiceUnavailable,
    Timeout,
    Unknown,
}

impl ProviderErrorKind {
    /// Stable snake_case label, used as a statistics and metrics key
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLimited => "rate_limited",
            Self::AuthFailed => "auth_failed",
            Self::BadRequest => "bad_request",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }

    /// Human-readable explanation suitable for logs and message metadata
    pub fn describe(&self) -> &'static str {
        match self {
            Self::RateLimited => "Rate limit exceeded. Please wait a moment before asking again.",
            Self::AuthFailed => "API authentication failed. Please check your API key.",
            Self::BadRequest => "Invalid request format. Please try rephrasing your question.",
            Self::ServiceUnavailable => {
                "Completion service temporarily unavailable. Please try again in a moment."
            }
            Self::Timeout => "Request timeout. The AI is taking too long to respond.",
            Self::Unknown => "Unexpected completion service failure.",
        }
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Client-independent description of what went wrong on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportFailure {
    /// The hard request deadline elapsed
    Timeout,
    /// No connection could be established
    Connect,
    /// The server answered with a non-success status
    Status(u16),
    /// The response body could not be decoded
    Decode,
    /// Anything else
    Other,
}

/// Classify an HTTP status code returned by the completion API
///
/// # Examples
///
/// ```
/// use horizon::providers::{classify_status, ProviderErrorKind};
///
/// assert_eq!(classify_status(429), ProviderErrorKind::RateLimited);
/// assert_eq!(classify_status(503), ProviderErrorKind::ServiceUnavailable);
/// assert_eq!(classify_status(418), ProviderErrorKind::Unknown);
/// ```
pub fn classify_status(status: u16) -> ProviderErrorKind {
    match status {
        429 => ProviderErrorKind::RateLimited,
        401 | 403 => ProviderErrorKind::AuthFailed,
        400 | 422 => ProviderErrorKind::BadRequest,
        502 | 503 => ProviderErrorKind::ServiceUnavailable,
        408 | 504 => ProviderErrorKind::Timeout,
        _ => ProviderErrorKind::Unknown,
    }
}

/// Classify a transport failure
pub fn classify_transport(failure: TransportFailure) -> ProviderErrorKind {
    match failure {
        TransportFailure::Timeout => ProviderErrorKind::Timeout,
        TransportFailure::Connect => ProviderErrorKind::ServiceUnavailable,
        TransportFailure::Status(status) => classify_status(status),
        TransportFailure::Decode | TransportFailure::Other => ProviderErrorKind::Unknown,
    }
}

/// A failed completion call
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("AI provider error ({kind}): {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Build an error from a transport failure, keeping `detail` only for
    /// failures without a canned explanation
    pub fn from_transport(failure: TransportFailure, detail: impl Into<String>) -> Self {
        let kind = classify_transport(failure);
        let message = match kind {
            ProviderErrorKind::Unknown => detail.into(),
            known => known.describe().to_string(),
        };
        Self { kind, message }
    }
}

/// Result type for completion calls
pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Outcome of a live connectivity check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ProviderErrorKind>,
}

impl ConnectionReport {
    /// The failure behind an unsuccessful check, `None` when it succeeded
    pub fn into_error(self) -> Option<ProviderError> {
        if self.success {
            return None;
        }
        Some(ProviderError::new(
            self.error_kind.unwrap_or(ProviderErrorKind::Unknown),
            self.error.unwrap_or_default(),
        ))
    }
}

/// Completion client trait
///
/// Implementations make exactly one outbound call per [`generate`] and never
/// retry; the chat service owns the fallback policy.
///
/// [`generate`]: CompletionClient::generate
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Produce an answer to `message` given earlier turns (oldest first)
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] classified by [`classify_transport`].
    async fn generate(
        &self,
        message: &str,
        history: &[Message],
        context: &ChatContext,
    ) -> ProviderResult<AssistantReply>;

    /// Identifier of the configured model
    fn model(&self) -> String;

    /// Whether credentials are present
    fn is_configured(&self) -> bool;

    /// Send a canned question and report whether an answer came back
    async fn test_connection(&self) -> ConnectionReport {
        match self
            .generate("What is physics?", &[], &ChatContext::default())
            .await
        {
            Ok(reply) => ConnectionReport {
                success: true,
                model: Some(reply.model),
                response_length: Some(reply.content.chars().count()),
                error: None,
                error_kind: None,
            },
            Err(e) => ConnectionReport {
                success: false,
                model: None,
                response_length: None,
                error: Some(e.message),
                error_kind: Some(e.kind),
            },
        }
    }
}
