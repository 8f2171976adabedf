use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Script not found: {0}")]
    ScriptNotFound(String),

    #[error("Script is inactive: {0}")]
    ScriptInactive(String),

    #[error("Script already exists: {0}")]
    ScriptAlreadyExists(String),

    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
            AppError::Unauthorized(reason) => (StatusCode::UNAUTHORIZED, reason),
            AppError::Forbidden(reason) => (StatusCode::FORBIDDEN, reason),
            // Inactive scripts are reported exactly like missing ones.
            AppError::ScriptNotFound(id) | AppError::ScriptInactive(id) => {
                (StatusCode::NOT_FOUND, format!("Script '{}' not found", id))
            }
            AppError::ScriptAlreadyExists(slug) => (
                StatusCode::CONFLICT,
                format!("Script slug '{}' already exists", slug),
            ),
            AppError::ExecutionNotFound(id) => (
                StatusCode::NOT_FOUND,
                format!("Execution '{}' not found", id),
            ),
            AppError::InvalidRequest(e) => (StatusCode::BAD_REQUEST, e),
        };

        let body = json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
