//! Error types for tuneq-api
//!
//! `JobError` is the job lifecycle taxonomy. Errors raised before a claim
//! abort the request and leave the store untouched. `FetchFailed` and
//! `StorageFailed` happen after a claim and only ever reach a client through
//! a stored `error` status.
//!
//! `ApiError` is the HTTP-facing error, rendered as `{"error": message}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Job lifecycle error
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobError {
    /// Empty or whitespace-only query
    #[error("query required")]
    InvalidQuery,

    /// Query-to-search-term translation failed (surfaced synchronously)
    #[error("translation failed: {0}")]
    TranslationFailed(String),

    /// Audio acquisition failed (stored as job error)
    #[error("fetch failed: {0}")]
    FetchFailed(String),

    /// Upload to durable storage failed (stored as job error)
    #[error("storage failed: {0}")]
    StorageFailed(String),

    /// Job store could not be read or written
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
}

impl From<sqlx::Error> for JobError {
    fn from(err: sqlx::Error) -> Self {
        JobError::StoreUnavailable(err.to_string())
    }
}

impl From<tuneq_common::Error> for JobError {
    fn from(err: tuneq_common::Error) -> Self {
        JobError::StoreUnavailable(err.to_string())
    }
}

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Upstream collaborator failed (502)
    #[error("Bad gateway: {0}")]
    BadGateway(String),

    /// Backing store unavailable (503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        let message = err.to_string();
        match err {
            JobError::InvalidQuery => ApiError::BadRequest(message),
            JobError::TranslationFailed(_) => ApiError::BadGateway(message),
            JobError::StoreUnavailable(_) => ApiError::ServiceUnavailable(message),
            JobError::FetchFailed(_) | JobError::StorageFailed(_) => ApiError::Internal(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            tracing::warn!(status = %status, error = %message, "Request failed");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
