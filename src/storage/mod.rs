//! Conversation storage
//!
//! Defines the [`ConversationStore`] repository contract used by the chat
//! service and HTTP handlers, and a SQLite implementation. Every operation
//! that takes a `user_id` enforces ownership: a conversation belonging to a
//! different user is reported as [`StoreError::AccessDenied`], a missing one
//! as [`StoreError::NotFound`].

use std::sync::Arc;
use thiserror::Error;

pub mod sqlite;
pub mod types;

pub use sqlite::SqliteConversationStore;
pub use types::{ChatMessage, Conversation, ConversationSummary, NewMessage, Role, DEFAULT_TITLE};

/// Tagged outcome of a failed store operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The record exists but belongs to another user
    #[error("Access denied: {0}")]
    AccessDenied(String),

    /// The underlying read or write failed
    #[error("Storage error: {0}")]
    Storage(String),
}

/// Result type for store operations
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Repository for user-owned conversations and their messages
///
/// Implementations are synchronous; async callers go through
/// [`run_blocking`] so that a write, once started, finishes even if the
/// calling future is dropped.
pub trait ConversationStore: Send + Sync {
    /// Create a conversation owned by `user_id`
    ///
    /// A missing or blank title becomes [`DEFAULT_TITLE`].
    fn create_conversation(&self, user_id: &str, title: Option<&str>) -> StoreResult<Conversation>;

    /// Non-archived conversations of `user_id`, most recently updated first
    fn list_conversations(&self, user_id: &str) -> StoreResult<Vec<ConversationSummary>>;

    /// Fetch one conversation, checking ownership
    fn get_conversation(&self, conversation_id: &str, user_id: &str) -> StoreResult<Conversation>;

    /// Messages of an owned conversation in creation order
    fn get_messages(&self, conversation_id: &str, user_id: &str) -> StoreResult<Vec<ChatMessage>>;

    /// Append a message and bump the conversation's `updated_at`
    fn append_message(&self, conversation_id: &str, message: NewMessage)
        -> StoreResult<ChatMessage>;

    /// Replace the title of an owned conversation
    fn rename_conversation(
        &self,
        conversation_id: &str,
        user_id: &str,
        title: &str,
    ) -> StoreResult<Conversation>;

    /// Delete an owned conversation and its messages, returning the deleted record
    fn delete_conversation(&self, conversation_id: &str, user_id: &str)
        -> StoreResult<Conversation>;
}

/// Run a store operation on the blocking thread pool
///
/// # Errors
///
/// Returns the operation's own error, or [`StoreError::Storage`] if the
/// blocking task panicked.
pub async fn run_blocking<T, F>(store: &Arc<dyn ConversationStore>, op: F) -> StoreResult<T>
where
    T: Send + 'static,
    F: FnOnce(&dyn ConversationStore) -> StoreResult<T> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || op(store.as_ref()))
        .await
        .map_err(|e| StoreError::Storage(format!("Storage task failed: {}", e)))?
}
