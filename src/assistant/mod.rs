//! Physics assistant core
//!
//! Chat orchestration, the offline fallback responder, topic detection and
//! the statistics aggregator.

pub mod fallback;
pub mod orchestrator;
pub mod stats;
pub mod topic;

pub use fallback::{FallbackReply, FallbackResponder, FallbackTopic};
pub use orchestrator::{
    generate_title, ChatRequest, ChatResponse, ChatService, ResponseContext, SessionUser,
};
pub use stats::{init_metrics_exporter, Outcome, Statistics, StatisticsSnapshot};
pub use topic::{detect_topic, GENERAL_TOPIC};
