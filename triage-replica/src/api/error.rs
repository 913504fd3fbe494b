//! API error type
//!
//! Every failure leaves the service as `{"error": {"code", "message"}}` with
//! a matching status code.

use crate::error::Error;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Remote source failure (502)
    #[error("Remote fetch failed: {0}")]
    RemoteFetch(String),

    /// Operation cancelled, e.g. during shutdown (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(id) => ApiError::NotFound(format!("Record {}", id)),
            Error::InvalidPosition { .. } | Error::ConflictingSelection(_) => {
                ApiError::BadRequest(err.to_string())
            }
            Error::Common(triage_common::Error::InvalidInput(msg)) => ApiError::BadRequest(msg),
            Error::Common(triage_common::Error::NotFound(msg)) => ApiError::NotFound(msg),
            Error::RemoteFetchFailed { .. } => ApiError::RemoteFetch(err.to_string()),
            Error::Cancelled => ApiError::Unavailable(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::RemoteFetch(msg) => (StatusCode::BAD_GATEWAY, "REMOTE_FETCH_FAILED", msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "CANCELLED", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
