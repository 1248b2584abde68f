//! HTTP error responses
//!
//! Every handler failure is turned into an [`ApiError`], which renders as
//! `{error, code, timestamp}` plus a few route-specific fields. Internal
//! failures are logged in full and answered with a generic message only.

use crate::error::HorizonError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::fmt;

/// Seconds a rate-limited caller is told to wait
pub const RETRY_AFTER_SECONDS: u64 = 60;

const INTERNAL_MESSAGE: &str = "I apologize, but I encountered an error while processing your \
question. Please try again in a moment.";

/// Standard API error response
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub code: &'static str,
    pub error: String,
    /// Longer explanation, shown only for internal errors
    pub message: Option<String>,
    pub max_length: Option<usize>,
    pub retry_after: Option<u64>,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, error: impl Into<String>) -> Self {
        Self {
            status,
            code,
            error: error.into(),
            message: None,
            max_length: None,
            retry_after: None,
        }
    }

    pub fn unauthorized() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "UNAUTHORIZED",
            "Authentication required",
        )
    }

    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Conversation not found")
    }

    pub fn rate_limited() -> Self {
        let mut error = Self::new(
            StatusCode::TOO_MANY_REQUESTS,
            "RATE_LIMITED",
            "Too many AI requests. Please wait a moment before asking again.",
        );
        error.retry_after = Some(RETRY_AFTER_SECONDS);
        error
    }

    pub fn internal(error: impl Into<String>) -> Self {
        let mut api_error = Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            error,
        );
        api_error.message = Some(INTERNAL_MESSAGE.to_string());
        api_error
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.status.as_u16(), self.code, self.error)
    }
}

impl std::error::Error for ApiError {}

impl From<HorizonError> for ApiError {
    fn from(err: HorizonError) -> Self {
        match err {
            HorizonError::Unauthorized => Self::unauthorized(),
            HorizonError::EmptyMessage => {
                Self::new(StatusCode::BAD_REQUEST, err.code(), "Message is required")
            }
            HorizonError::MessageTooLong { max, .. } => {
                let mut error = Self::new(
                    StatusCode::BAD_REQUEST,
                    err.code(),
                    format!(
                        "Message too long. Please keep it under {} characters.",
                        max
                    ),
                );
                error.max_length = Some(max);
                error
            }
            HorizonError::InvalidTitle => {
                Self::new(StatusCode::BAD_REQUEST, err.code(), "Title is required")
            }
            HorizonError::NotFound(what) => {
                tracing::debug!("Not found: {}", what);
                Self::not_found()
            }
            other => {
                tracing::error!("Request failed: {}", other);
                Self::internal("Request failed")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.error,
            "code": self.code,
            "timestamp": Utc::now(),
        });

        if let Some(message) = self.message {
            body["message"] = json!(message);
        }
        if let Some(max_length) = self.max_length {
            body["maxLength"] = json!(max_length);
        }
        if let Some(retry_after) = self.retry_after {
            body["retryAfter"] = json!(retry_after);
        }

        (self.status, Json(body)).into_response()
    }
}

/// Result type for handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;
