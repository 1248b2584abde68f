//! Route handlers

use crate::assistant::{ChatRequest, ChatResponse, SessionUser};
use crate::error::HorizonError;
use crate::server::error::{ApiError, ApiResult};
use crate::server::AppState;
use crate::storage::{run_blocking, ChatMessage, Conversation, ConversationSummary};

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Default, Deserialize)]
pub struct CreateConversationBody {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateConversationBody {
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversationEnvelope {
    pub conversation: Conversation,
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ConversationList {
    pub conversations: Vec<ConversationSummary>,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct ConversationDetail {
    pub conversation: Conversation,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct StatusMessage {
    pub message: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthConfig {
    pub model: String,
    pub api_configured: bool,
    pub rate_limit_enabled: bool,
    pub max_message_length: usize,
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub config: HealthConfig,
    /// Live check result, `null` when the check is disabled
    pub connection: Option<crate::providers::ConnectionReport>,
    pub statistics: crate::assistant::StatisticsSnapshot,
}

#[derive(Debug, Serialize)]
pub struct ModelInfo {
    pub model: String,
    pub provider: &'static str,
    pub description: String,
    pub capabilities: Vec<&'static str>,
    pub configured: bool,
    pub status: &'static str,
}

const CAPABILITIES: &[&str] = &[
    "Advanced physics reasoning",
    "Mathematical problem solving",
    "Equation derivation and explanation",
    "Scientific concept explanation",
    "Quantum mechanics expertise",
    "Relativity theory knowledge",
    "Black hole physics",
    "Particle physics understanding",
    "Conversation memory and context",
];

/// `POST /conversations`
pub async fn create_conversation(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
    body: Option<Json<CreateConversationBody>>,
) -> ApiResult<(StatusCode, Json<ConversationEnvelope>)> {
    let title = body.and_then(|Json(body)| body.title);
    let conversation = run_blocking(state.chat.store(), move |s| {
        s.create_conversation(&user.user_id, title.as_deref())
    })
    .await
    .map_err(HorizonError::from)?;

    tracing::info!("Created conversation {}", conversation.id);
    Ok((
        StatusCode::CREATED,
        Json(ConversationEnvelope {
            conversation,
            message: "Conversation created successfully",
        }),
    ))
}

/// `GET /conversations`
pub async fn list_conversations(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
) -> ApiResult<Json<ConversationList>> {
    let conversations = run_blocking(state.chat.store(), move |s| {
        s.list_conversations(&user.user_id)
    })
    .await
    .map_err(HorizonError::from)?;

    Ok(Json(ConversationList {
        count: conversations.len(),
        conversations,
    }))
}

/// `GET /conversations/:id`
pub async fn get_conversation(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<ConversationDetail>> {
    let (conversation, messages) = run_blocking(state.chat.store(), move |s| {
        let conversation = s.get_conversation(&conversation_id, &user.user_id)?;
        let messages = s.get_messages(&conversation_id, &user.user_id)?;
        Ok((conversation, messages))
    })
    .await
    .map_err(HorizonError::from)?;

    Ok(Json(ConversationDetail {
        conversation,
        messages,
    }))
}

/// `PUT /conversations/:id`
pub async fn update_conversation(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
    Path(conversation_id): Path<String>,
    body: Option<Json<UpdateConversationBody>>,
) -> ApiResult<Json<ConversationEnvelope>> {
    let title = body
        .and_then(|Json(body)| body.title)
        .map(|title| title.trim().to_string())
        .filter(|title| !title.is_empty())
        .ok_or(HorizonError::InvalidTitle)?;

    let conversation = run_blocking(state.chat.store(), move |s| {
        s.rename_conversation(&conversation_id, &user.user_id, &title)
    })
    .await
    .map_err(HorizonError::from)?;

    Ok(Json(ConversationEnvelope {
        conversation,
        message: "Conversation updated successfully",
    }))
}

/// `DELETE /conversations/:id`
pub async fn delete_conversation(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
    Path(conversation_id): Path<String>,
) -> ApiResult<Json<StatusMessage>> {
    let deleted = run_blocking(state.chat.store(), move |s| {
        s.delete_conversation(&conversation_id, &user.user_id)
    })
    .await
    .map_err(HorizonError::from)?;

    tracing::info!("Deleted conversation {}", deleted.id);
    Ok(Json(StatusMessage {
        message: "Conversation deleted successfully",
    }))
}

/// `POST /chat`
///
/// The body is read as raw bytes so that a malformed payload still goes
/// through authorization, validation and statistics in the chat service.
pub async fn chat(
    State(state): State<Arc<AppState>>,
    user: Option<SessionUser>,
    body: Bytes,
) -> ApiResult<Json<ChatResponse>> {
    if let (Some(limiter), Some(user)) = (&state.rate_limiter, &user) {
        if !limiter.check_and_record(&user.user_id).await {
            return Err(ApiError::rate_limited());
        }
    }

    let request = ChatRequest::from_body(&body);
    let response = state.chat.handle(user.as_ref(), request).await?;
    Ok(Json(response))
}

/// `GET /health`
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthReport> {
    let client = state.chat.client();
    let connection = if state.check_on_health {
        Some(client.test_connection().await)
    } else {
        None
    };

    Json(HealthReport {
        status: "ok",
        timestamp: Utc::now(),
        config: HealthConfig {
            model: client.model(),
            api_configured: client.is_configured(),
            rate_limit_enabled: state.rate_limiter.is_some(),
            max_message_length: state.chat.max_message_length(),
        },
        connection,
        statistics: state.chat.statistics().snapshot(),
    })
}

/// `GET /model-info`
pub async fn model_info(State(state): State<Arc<AppState>>) -> Json<ModelInfo> {
    let client = state.chat.client();
    let configured = client.is_configured();

    Json(ModelInfo {
        model: client.model(),
        provider: "OpenRouter",
        description: format!(
            "{} - Advanced reasoning AI model for physics and mathematics",
            state.chat.display_name()
        ),
        capabilities: CAPABILITIES.to_vec(),
        configured,
        status: if configured { "active" } else { "inactive" },
    })
}
