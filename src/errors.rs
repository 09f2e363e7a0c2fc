use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{message}")]
    Remote { status: Option<u16>, message: String },

    #[error("Job service unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("{0}")]
    QuotaExceeded(String),

    #[error("Not found")]
    NotFound,

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Forbidden")]
    Forbidden,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Malformed response: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    pub fn remote(status: Option<u16>, message: impl Into<String>) -> Self {
        AppError::Remote {
            status,
            message: message.into(),
        }
    }

    /// Failures the poll loop may retry: the job service answered badly or not at all.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Remote { .. } | AppError::Transport(_) | AppError::Serialization(_)
        )
    }

    /// Short label used for logging and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::Remote { .. } => "remote",
            AppError::Transport(_) => "transport",
            AppError::QuotaExceeded(_) => "quota_exceeded",
            AppError::NotFound => "not_found",
            AppError::Auth(_) => "auth",
            AppError::Forbidden => "forbidden",
            AppError::Database(_) => "database",
            AppError::Serialization(_) => "serialization",
            AppError::Config(_) => "config",
            AppError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Validation(ref msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Remote { ref message, .. } => {
                tracing::warn!("Job service error: {}", message);
                (StatusCode::BAD_GATEWAY, message.clone())
            }
            AppError::Transport(ref e) => {
                tracing::error!("Job service transport error: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "Job service is unavailable. Please try again.".to_string(),
                )
            }
            AppError::QuotaExceeded(ref msg) => (StatusCode::PAYMENT_REQUIRED, msg.clone()),
            AppError::NotFound => (StatusCode::NOT_FOUND, "Resource not found".to_string()),
            AppError::Auth(ref msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden => (StatusCode::FORBIDDEN, "Access forbidden".to_string()),
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::Serialization(ref e) => {
                tracing::warn!("Malformed job service response: {}", e);
                (
                    StatusCode::BAD_GATEWAY,
                    "Invalid response format from server".to_string(),
                )
            }
            AppError::Config(ref msg) => {
                tracing::error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::Internal(ref e) => {
                tracing::error!("Internal error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
