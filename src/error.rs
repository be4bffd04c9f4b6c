use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::cache::CacheError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Forbidden")]
    Forbidden,

    #[error("CSRF token mismatch")]
    InvalidCsrf,

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Template error: {0}")]
    Template(#[from] askama::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        match &self {
            AppError::NotFound => StatusCode::NOT_FOUND.into_response(),
            AppError::Forbidden => StatusCode::FORBIDDEN.into_response(),
            AppError::InvalidCsrf => StatusCode::UNPROCESSABLE_ENTITY.into_response(),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()).into_response(),
            AppError::Database(_)
            | AppError::Pool(_)
            | AppError::Cache(_)
            | AppError::Template(_)
            | AppError::Io(_)
            | AppError::Json(_)
            | AppError::Internal(_) => {
                tracing::error!("{}", self);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error",
                )
                    .into_response()
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
