//! Horizon - physics assistant backend library
//!
//! This library provides the conversational-assistant backend of a physics
//! learning site: per-user chat conversations stored in SQLite, answers from
//! an OpenAI-compatible completion API, a deterministic offline fallback, and
//! process-lifetime statistics.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `storage`: Conversation store contract and SQLite implementation
//! - `providers`: Completion-client abstraction and the OpenRouter client
//! - `assistant`: Chat orchestration, fallback answers, topics, statistics
//! - `server`: axum routes, session identity, rate limiting, error mapping
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//!
//! # Example
//!
//! ```no_run
//! use horizon::cli::Cli;
//! use horizon::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config/config.yaml", &Cli::default())?;
//!     config.validate()?;
//!     horizon::server::serve(&config).await
//! }
//! ```

pub mod assistant;
pub mod cli;
pub mod config;
pub mod error;
pub mod providers;
pub mod server;
pub mod storage;

// Re-export commonly used types
pub use assistant::{ChatRequest, ChatResponse, ChatService, SessionUser, Statistics};
pub use config::Config;
pub use error::{HorizonError, Result};
pub use storage::{ConversationStore, SqliteConversationStore};

#[cfg(test)]
pub mod test_utils;
