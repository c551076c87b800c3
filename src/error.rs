use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::engine::EngineError;
use crate::orchestration::{CustodyError, PoolError};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Internal server error: {0}")]
    Internal(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Unprocessable: {0}")]
    Unprocessable(String),
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<PoolError> for AppError {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Engine(EngineError::UnknownPosition) => AppError::NotFound(err.to_string()),
            PoolError::PoolNotFound(_) => AppError::NotFound(err.to_string()),
            PoolError::PoolExists(_) => AppError::Conflict(err.to_string()),
            PoolError::MaturityOutOfRange(_) => AppError::BadRequest(err.to_string()),
            PoolError::Engine(e) => AppError::Unprocessable(format!("{}: {}", e.code(), e)),
            PoolError::SlippageExceeded(_) => AppError::Unprocessable(err.to_string()),
            PoolError::Custody(CustodyError::InsufficientBalance { .. }) => {
                AppError::Unprocessable(err.to_string())
            }
            PoolError::Custody(_) | PoolError::Db(_) | PoolError::PoolUnavailable(_) => {
                AppError::Internal(err.to_string())
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
