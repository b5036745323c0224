use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Relay not found: {0}")]
    RelayNotFound(Uuid),
    #[error("Mail task not found: {0}")]
    MailTaskNotFound(Uuid),
    #[error("Mail task {0} is not in a resendable state")]
    NotResendable(Uuid),
    #[error("Invalid request: {0}")]
    Validation(String),
    #[error("Internal server error")]
    Internal,
}

impl AppError {
    /// Whether retrying the same operation later can succeed.
    ///
    /// Identity-resolution and validation failures are caused by the caller's
    /// input and will fail the same way every time.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Internal)
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::Database(e) => {
                tracing::error!(error = %e, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
            e @ (Self::RelayNotFound(_) | Self::MailTaskNotFound(_)) => {
                tracing::debug!(error = %e, "Resource not found");
                (StatusCode::NOT_FOUND, e.to_string())
            }
            e @ Self::NotResendable(_) => {
                tracing::debug!(error = %e, "Conflicting task state");
                (StatusCode::CONFLICT, e.to_string())
            }
            Self::Validation(msg) => {
                tracing::debug!(message = %msg, "Bad request");
                (StatusCode::BAD_REQUEST, msg)
            }
            Self::Internal => {
                tracing::error!("Internal server error occurred");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
