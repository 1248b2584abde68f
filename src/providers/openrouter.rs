//! OpenRouter completion client for Horizon
//!
//! Talks to any OpenAI-compatible `/chat/completions` endpoint. One request
//! per call, no streaming and no retries; failures are classified into
//! [`ProviderErrorKind`] so the chat service can decide on a fallback.

use crate::config::ProviderConfig;
use crate::error::{HorizonError, Result};
use crate::providers::{
    classify_status, AssistantReply, ChatContext, CompletionClient, Message, ProviderError,
    ProviderErrorKind, ProviderResult, ReplySource, TokenUsage, TransportFailure,
};

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Hints appended to the user's message, keyed on words it contains
const MESSAGE_HINTS: &[(&[&str], &str)] = &[
    (
        &["equation", "formula"],
        "\n\nPlease include relevant mathematical equations and explain their significance using proper mathematical notation.",
    ),
    (
        &["explain", "what is"],
        "\n\nPlease provide a clear, detailed explanation suitable for someone learning physics.",
    ),
    (
        &["example", "demonstrate"],
        "\n\nPlease include concrete examples to illustrate the concepts.",
    ),
    (
        &["derive", "derivation"],
        "\n\nPlease show the mathematical derivation step by step.",
    ),
];

/// OpenAI-compatible completion client
///
/// # Examples
///
/// ```
/// use horizon::config::ProviderConfig;
/// use horizon::providers::{CompletionClient, OpenRouterClient};
///
/// let client = OpenRouterClient::new(ProviderConfig::default()).unwrap();
/// assert!(!client.is_configured());
/// ```
pub struct OpenRouterClient {
    client: Client,
    config: ProviderConfig,
}

/// Request body for `/chat/completions`
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<TokenUsage>,
    #[serde(default)]
    model: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

impl OpenRouterClient {
    /// Create a client from provider configuration
    ///
    /// # Arguments
    ///
    /// * `config` - Endpoint, credentials, model and sampling settings
    ///
    /// # Returns
    ///
    /// Returns a client whose requests time out after
    /// `config.timeout_seconds`
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("horizon/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(HorizonError::Http)?;

        tracing::info!(
            "Initialized completion client: base_url={}, model={}",
            config.base_url,
            config.model
        );

        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    /// Assemble the outbound message list
    ///
    /// System prompt first, then the most recent `history_limit` turns, then
    /// the enhanced user message.
    fn build_messages(
        &self,
        message: &str,
        history: &[Message],
        context: &ChatContext,
    ) -> Vec<Message> {
        let skip = history.len().saturating_sub(self.config.history_limit);
        let mut messages = Vec::with_capacity(history.len() - skip + 2);
        messages.push(Message::system(self.config.system_prompt.clone()));
        messages.extend(history[skip..].iter().map(|turn| {
            if turn.role == "assistant" {
                Message::assistant(turn.content.clone())
            } else {
                Message::user(turn.content.clone())
            }
        }));
        messages.push(Message::user(enhance_message(message, context)));
        messages
    }
}

/// Personalise a message and append guidance hints
///
/// # Examples
///
/// ```
/// use horizon::providers::{enhance_message, ChatContext};
///
/// let text = enhance_message("Derive E=mc^2", &ChatContext::for_user("ada"));
/// assert!(text.starts_with("User ada asks: Derive E=mc^2"));
/// assert!(text.ends_with("step by step."));
/// ```
pub fn enhance_message(message: &str, context: &ChatContext) -> String {
    let mut enhanced = match context.username.as_deref() {
        Some(username) if !username.is_empty() => format!("User {} asks: {}", username, message),
        _ => message.to_string(),
    };

    let lower = message.to_lowercase();
    for (keywords, hint) in MESSAGE_HINTS {
        if keywords.iter().any(|keyword| lower.contains(keyword)) {
            enhanced.push_str(hint);
        }
    }

    enhanced
}

/// Describe a reqwest error, checking the deadline first:
/// a body cut short by the timeout also reports as a body error
fn transport_failure(error: &reqwest::Error) -> TransportFailure {
    if error.is_timeout() {
        TransportFailure::Timeout
    } else if error.is_connect() {
        TransportFailure::Connect
    } else if let Some(status) = error.status() {
        TransportFailure::Status(status.as_u16())
    } else if error.is_decode() {
        TransportFailure::Decode
    } else {
        TransportFailure::Other
    }
}

#[async_trait]
impl CompletionClient for OpenRouterClient {
    async fn generate(
        &self,
        message: &str,
        history: &[Message],
        context: &ChatContext,
    ) -> ProviderResult<AssistantReply> {
        let api_key = match self.config.api_key.as_deref() {
            Some(key) if !key.is_empty() => key,
            _ => {
                return Err(ProviderError::new(
                    ProviderErrorKind::AuthFailed,
                    "API key not configured",
                ))
            }
        };

        let sampling = &self.config.sampling;
        let request = CompletionRequest {
            model: &self.config.model,
            messages: self.build_messages(message, history, context),
            max_tokens: sampling.max_tokens,
            temperature: sampling.temperature,
            top_p: sampling.top_p,
            frequency_penalty: sampling.frequency_penalty,
            presence_penalty: sampling.presence_penalty,
            stream: false,
        };

        tracing::debug!(
            "Sending completion request: model={}, {} messages",
            request.model,
            request.messages.len()
        );

        let started = Instant::now();
        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(api_key)
            .header("HTTP-Referer", &self.config.referer)
            .header("X-Title", &self.config.app_title)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Completion request failed: {}", e);
                ProviderError::from_transport(transport_failure(&e), e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = match response.text().await {
                Ok(text) => text,
                Err(e) if e.is_timeout() => {
                    tracing::error!("Completion API returned {} and then stalled: {}", status, e);
                    return Err(ProviderError::from_transport(
                        TransportFailure::Timeout,
                        e.to_string(),
                    ));
                }
                Err(e) => {
                    tracing::warn!("Failed to read error body: {}", e);
                    String::new()
                }
            };
            tracing::error!(
                "Completion API returned {} ({}): {}",
                status,
                classify_status(status.as_u16()),
                error_text
            );
            return Err(ProviderError::from_transport(
                TransportFailure::Status(status.as_u16()),
                format!("Completion API returned {}: {}", status, error_text),
            ));
        }

        let body: CompletionResponse = response.json().await.map_err(|e| {
            tracing::error!("Failed to parse completion response: {}", e);
            ProviderError::from_transport(
                transport_failure(&e),
                format!("Failed to parse completion response: {}", e),
            )
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                tracing::error!("Completion response contained no answer text");
                ProviderError::new(
                    ProviderErrorKind::Unknown,
                    "Empty response from completion API",
                )
            })?;

        tracing::info!(
            "Completion received in {}ms: {} chars, {} tokens",
            started.elapsed().as_millis(),
            content.chars().count(),
            body.usage.map(|u| u.total_tokens).unwrap_or(0)
        );

        Ok(AssistantReply {
            content,
            model: body.model.unwrap_or_else(|| self.config.model.clone()),
            usage: body.usage,
            timestamp: Utc::now(),
            source: ReplySource::Primary,
        })
    }

    fn model(&self) -> String {
        self.config.model.clone()
    }

    fn is_configured(&self) -> bool {
        self.config
            .api_key
            .as_deref()
            .is_some_and(|key| !key.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_with_history_limit(limit: usize) -> OpenRouterClient {
        let config = ProviderConfig {
            api_key: Some("sk-test".to_string()),
            history_limit: limit,
            system_prompt: "be precise".to_string(),
            ..Default::default()
        };
        OpenRouterClient::new(config).unwrap()
    }

    #[test]
    fn test_enhance_message_without_username() {
        let text = enhance_message("Tell me about muons", &ChatContext::default());
        assert_eq!(text, "Tell me about muons");
    }

    #[test]
    fn test_enhance_message_adds_matching_hints_in_order() {
        let text = enhance_message(
            "Explain the formula with an example",
            &ChatContext::for_user("grace"),
        );
        assert!(text.starts_with("User grace asks: Explain the formula"));
        let equations = text.find("mathematical equations").unwrap();
        let explanation = text.find("someone learning physics").unwrap();
        let examples = text.find("concrete examples").unwrap();
        assert!(equations < explanation && explanation < examples);
        assert!(!text.contains("derivation step by step"));
    }

    #[test]
    fn test_enhance_message_is_case_insensitive() {
        let text = enhance_message("WHAT IS spin?", &ChatContext::default());
        assert!(text.contains("someone learning physics"));
    }

    #[test]
    fn test_build_messages_order_and_roles() {
        let client = client_with_history_limit(20);
        let history = vec![
            Message::user("first"),
            Message::assistant("second"),
            Message::system("odd"),
        ];
        let messages = client.build_messages("latest", &history, &ChatContext::default());

        assert_eq!(messages.len(), 5);
        assert_eq!(messages[0], Message::system("be precise"));
        assert_eq!(messages[1], Message::user("first"));
        assert_eq!(messages[2], Message::assistant("second"));
        assert_eq!(messages[3], Message::user("odd"));
        assert_eq!(messages[4], Message::user("latest"));
    }

    #[test]
    fn test_build_messages_keeps_most_recent_history() {
        let client = client_with_history_limit(2);
        let history: Vec<Message> = (0..5).map(|i| Message::user(format!("m{}", i))).collect();
        let messages = client.build_messages("now", &history, &ChatContext::default());

        assert_eq!(messages.len(), 4);
        assert_eq!(messages[1].content, "m3");
        assert_eq!(messages[2].content, "m4");
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let config = ProviderConfig {
            base_url: "http://localhost:9000/v1/".to_string(),
            ..Default::default()
        };
        let client = OpenRouterClient::new(config).unwrap();
        assert_eq!(client.endpoint(), "http://localhost:9000/v1/chat/completions");
    }

    #[tokio::test]
    async fn test_generate_without_api_key_fails_fast() {
        let config = ProviderConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let client = OpenRouterClient::new(config).unwrap();
        assert!(!client.is_configured());

        let error = client
            .generate("hi", &[], &ChatContext::default())
            .await
            .unwrap_err();
        assert_eq!(error.kind, ProviderErrorKind::AuthFailed);
    }
}
