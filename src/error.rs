//! Error types for the application
//!
//! Conflicts (`AlreadyRequested`, `NotPending`, `AlreadyResponded`,
//! `AlreadyHost`) are expected outcomes of concurrent pollers and map to
//! 409 so callers can tell "someone else already acted" from a failure.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Media provider error: {0}")]
    Media(String),

    #[error("Meeting {0} not found")]
    MeetingNotFound(String),

    /// Soft not-found: the user has no record yet ("not yet admitted")
    #[error("Participant not found: {0}")]
    ParticipantNotFound(String),

    #[error("Role request {0} not found")]
    RequestNotFound(uuid::Uuid),

    #[error("User {0} already requested to join")]
    AlreadyRequested(String),

    #[error("Participant request is no longer pending")]
    NotPending,

    #[error("Role request has already been responded to")]
    AlreadyResponded,

    #[error("Participant {0} is already a host")]
    AlreadyHost(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::Media(e) => {
                tracing::error!("Media provider error: {}", e);
                (StatusCode::BAD_GATEWAY, format!("Media provider error: {}", e))
            }
            AppError::MeetingNotFound(_)
            | AppError::ParticipantNotFound(_)
            | AppError::RequestNotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            AppError::AlreadyRequested(_)
            | AppError::NotPending
            | AppError::AlreadyResponded
            | AppError::AlreadyHost(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::Forbidden(_) => (StatusCode::FORBIDDEN, self.to_string()),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.clone())
            }
        };

        (status, message).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
