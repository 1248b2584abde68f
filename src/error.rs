//! Error types for Horizon
//!
//! This module defines the top-level error taxonomy used by the chat service
//! and the HTTP layer, using `thiserror` for ergonomic error handling.
//! Storage and provider layers carry their own narrower error types
//! ([`StoreError`] and [`ProviderError`]) which convert into [`HorizonError`].

use crate::providers::ProviderError;
use crate::storage::StoreError;
use thiserror::Error;

/// Main error type for Horizon operations
///
/// Validation and authorization variants are raised before any side effect.
/// Provider failures are absorbed by the chat service; `Provider` is raised
/// by the `ping` command when the connection check fails. `Io` and `Yaml`
/// come from reading the config file and binding the listener.
#[derive(Error, Debug)]
pub enum HorizonError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Chat message was empty or whitespace only
    #[error("Message is required")]
    EmptyMessage,

    /// Chat message exceeded the configured maximum length
    #[error("Message too long: {length} characters (max {max})")]
    MessageTooLong {
        /// Length of the rejected message in characters
        length: usize,
        /// Configured maximum length
        max: usize,
    },

    /// Conversation title was empty or whitespace only
    #[error("Title is required")]
    InvalidTitle,

    /// No authenticated caller identity
    #[error("Authentication required")]
    Unauthorized,

    /// Resource absent or not owned by the caller
    #[error("Not found: {0}")]
    NotFound(String),

    /// Conversation storage errors (database operations)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Completion provider errors
    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl HorizonError {
    /// Stable machine-readable code, used in API bodies and statistics keys
    pub fn code(&self) -> &'static str {
        match self {
            Self::EmptyMessage => "EMPTY_MESSAGE",
            Self::MessageTooLong { .. } => "MESSAGE_TOO_LONG",
            Self::InvalidTitle => "INVALID_TITLE",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::NotFound(_) => "NOT_FOUND",
            _ => "INTERNAL_ERROR",
        }
    }
}

impl From<StoreError> for HorizonError {
    fn from(err: StoreError) -> Self {
        match err {
            // Foreign conversations are reported exactly like missing ones
            StoreError::NotFound(what) | StoreError::AccessDenied(what) => Self::NotFound(what),
            StoreError::Storage(detail) => Self::Storage(detail),
        }
    }
}

/// Result type alias for Horizon application plumbing
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
