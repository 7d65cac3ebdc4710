use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::services::completion::CompletionError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Rate limit exceeded")]
    RateLimitExceeded,

    #[error("Completion service error: {0}")]
    Completion(#[from] CompletionError),

    #[error("Session limit reached")]
    SessionLimitReached,

    #[error("Internal server error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            AppError::Completion(_) => StatusCode::BAD_GATEWAY,
            AppError::SessionLimitReached => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        // Upstream and internal failures never leak detail to the client.
        let (code, message) = match self {
            AppError::Validation(ref msg) => ("VALIDATION_ERROR", msg.clone()),
            AppError::RateLimitExceeded => (
                "RATE_LIMIT_EXCEEDED",
                "Too many requests. Please try again later.".to_string(),
            ),
            AppError::Completion(ref e) => {
                tracing::error!("Completion service failure: {}", e);
                (
                    "UPSTREAM_ERROR",
                    "Error communicating with the assistant. Please try again.".to_string(),
                )
            }
            AppError::SessionLimitReached => {
                tracing::warn!("Session store is full");
                (
                    "SESSION_LIMIT_REACHED",
                    "Too many active conversations. Please try again later.".to_string(),
                )
            }
            AppError::Internal(ref msg) => {
                tracing::error!("Internal failure: {}", msg);
                ("INTERNAL_ERROR", "Something went wrong. Please try again.".to_string())
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            error: ErrorDetail {
                code: code.to_string(),
                message,
                details: None,
            },
        });

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
