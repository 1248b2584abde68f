//! Completion provider module for Horizon
//!
//! This module contains the completion-client abstraction and the
//! OpenAI-compatible implementation used to reach OpenRouter.

pub mod base;
pub mod openrouter;

pub use base::{
    classify_status, classify_transport, AssistantReply, ChatContext, CompletionClient, ConnectionReport,
    Message, ProviderError, ProviderErrorKind, ProviderResult, ReplySource, TokenUsage,
    TransportFailure,
};
pub use openrouter::{enhance_message, OpenRouterClient};

#[cfg(test)]
pub use base::MockCompletionClient;

use crate::config::ProviderConfig;
use crate::error::Result;
use std::sync::Arc;

/// Create the completion client described by configuration
///
/// # Errors
///
/// Returns error if the HTTP client cannot be initialized
///
/// # Examples
///
/// ```
/// use horizon::config::ProviderConfig;
/// use horizon::providers::create_client;
///
/// let client = create_client(&ProviderConfig::default()).unwrap();
/// assert_eq!(client.model(), "deepseek/deepseek-r1-distill-llama-70b");
/// ```
pub fn create_client(config: &ProviderConfig) -> Result<Arc<dyn CompletionClient>> {
    Ok(Arc::new(OpenRouterClient::new(config.clone())?))
}
