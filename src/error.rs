//! Error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::storage::StorageError;

pub type AppResult<T> = Result<T, AppError>;

/// Errors surfaced to HTTP callers. Each variant maps to a stable
/// machine-readable code; free-text detail never replaces the code.
#[derive(Debug)]
pub enum AppError {
    /// Missing or malformed required request fields
    InvalidRequest(String),

    /// Analyst operation against an unknown transaction
    NotFound(String),

    /// Analyst decision already recorded for this transaction
    AlreadyReviewed(String),

    /// Storage stayed unreachable after retries
    StorageUnavailable(String),

    /// Generic errors
    InternalError(String),
}

impl AppError {
    fn code(&self) -> &'static str {
        match self {
            AppError::InvalidRequest(_) => "invalid_request",
            AppError::NotFound(_) => "not_found",
            AppError::AlreadyReviewed(_) => "already_reviewed",
            AppError::StorageUnavailable(_) => "storage_unavailable",
            AppError::InternalError(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::InvalidRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::AlreadyReviewed(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::StorageUnavailable(msg) => {
                tracing::error!("storage unavailable: {}", msg);
                (StatusCode::SERVICE_UNAVAILABLE, "Storage unavailable".to_string())
            }
            AppError::InternalError(msg) => {
                tracing::error!("internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": self.code(),
            "message": message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(id) => {
                AppError::NotFound(format!("Transaction {} not found in review queue", id))
            }
            StorageError::AlreadyReviewed(id) => {
                AppError::AlreadyReviewed(format!("Transaction {} is already reviewed", id))
            }
            StorageError::Transient(msg) | StorageError::Unavailable(msg) => {
                AppError::StorageUnavailable(msg)
            }
        }
    }
}
