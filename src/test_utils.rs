//! Test utilities for Horizon
//!
//! Shared fixtures for unit tests: temporary conversation stores and canned
//! completion replies.

use crate::providers::{AssistantReply, ReplySource, TokenUsage};
use crate::storage::{ConversationStore, SqliteConversationStore};
use chrono::Utc;
use std::sync::Arc;
use tempfile::TempDir;

/// Create a SQLite store in a temporary directory
///
/// Keep the returned `TempDir` alive for as long as the store is used.
pub fn temp_store() -> (Arc<dyn ConversationStore>, TempDir) {
    let dir = TempDir::new().expect("Failed to create temporary directory");
    let store = SqliteConversationStore::new_with_path(dir.path().join("conversations.db"))
        .expect("Failed to create conversation store");
    (Arc::new(store), dir)
}

/// A successful primary reply with the given usage
pub fn primary_reply(content: &str, model: &str, usage: Option<TokenUsage>) -> AssistantReply {
    AssistantReply {
        content: content.to_string(),
        model: model.to_string(),
        usage,
        timestamp: Utc::now(),
        source: ReplySource::Primary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_temp_store_is_usable() {
        let (store, _dir) = temp_store();
        let conversation = store.create_conversation("tester", None).unwrap();
        assert_eq!(store.list_conversations("tester").unwrap().len(), 1);
        assert_eq!(conversation.user_id, "tester");
    }

    #[test]
    fn test_primary_reply() {
        let reply = primary_reply("hi", "m", Some(TokenUsage::new(1, 2)));
        assert_eq!(reply.source, ReplySource::Primary);
        assert_eq!(reply.usage.map(|u| u.total_tokens), Some(3));
    }
}
