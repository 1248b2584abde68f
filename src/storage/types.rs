use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Title given to conversations created without one
pub const DEFAULT_TITLE: &str = "New Chat";

/// A titled, user-owned conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conversation {
    /// Unique identifier (UUID v4)
    pub id: String,
    /// Identity of the owning user
    pub user_id: String,
    /// User-assigned or generated title
    pub title: String,
    /// When the conversation was created
    pub created_at: DateTime<Utc>,
    /// When the conversation last changed (title update or new message)
    pub updated_at: DateTime<Utc>,
    /// Archived conversations are hidden from listings
    pub is_archived: bool,
}

/// Listing view of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    /// Number of messages in the conversation
    pub message_count: usize,
    /// Creation time of the newest message, if any
    pub last_message_at: Option<DateTime<Utc>>,
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            other => Err(format!("unknown message role: {}", other)),
        }
    }
}

/// One immutable turn of a conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    /// Opaque attributes such as the answer source or token usage
    pub metadata: serde_json::Value,
    pub tokens_used: u64,
    pub model_used: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied when appending a message
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub role: Role,
    pub content: String,
    pub metadata: serde_json::Value,
    pub tokens_used: u64,
    pub model_used: Option<String>,
}

impl NewMessage {
    /// A user turn with the request context as metadata
    pub fn user(content: impl Into<String>, metadata: serde_json::Value) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            metadata,
            tokens_used: 0,
            model_used: None,
        }
    }

    /// An assistant turn
    pub fn assistant(
        content: impl Into<String>,
        metadata: serde_json::Value,
        tokens_used: u64,
        model_used: impl Into<String>,
    ) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            metadata,
            tokens_used,
            model_used: Some(model_used.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_round_trips_through_str() {
        assert_eq!("user".parse::<Role>().unwrap(), Role::User);
        assert_eq!("assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert!("system".parse::<Role>().is_err());
    }

    #[test]
    fn test_summary_serializes_flat_camel_case() {
        let now = Utc::now();
        let summary = ConversationSummary {
            conversation: Conversation {
                id: "c1".into(),
                user_id: "u1".into(),
                title: "Black holes".into(),
                created_at: now,
                updated_at: now,
                is_archived: false,
            },
            message_count: 4,
            last_message_at: Some(now),
        };
        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["id"], "c1");
        assert_eq!(value["userId"], "u1");
        assert_eq!(value["messageCount"], 4);
        assert_eq!(value["isArchived"], false);
    }
}
