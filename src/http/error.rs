use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{core::store::StoreError, runtime::handle::RuntimeError};

/// Failures returned by route handlers, rendered as `{"error": message}`.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Request body lacked `name` or `number`.
    #[error("name or number missing")]
    MissingField,

    /// Request body was not the expected JSON shape.
    #[error("malformed payload")]
    MalformedPayload,

    /// Store rejected the fields (validation or duplicate name).
    #[error("{0}")]
    Rejected(String),

    /// Target contact does not exist.
    #[error("contact not found")]
    NotFound,

    /// No route matched.
    #[error("unknown endpoint")]
    UnknownEndpoint,

    /// Anything unanticipated. The detail is logged, never returned.
    #[error("internal server error")]
    Internal(String),
}

impl From<RuntimeError> for ApiError {
    fn from(value: RuntimeError) -> Self {
        match value {
            RuntimeError::Store(err @ (StoreError::Validation(_) | StoreError::DuplicateName(_))) => {
                ApiError::Rejected(err.to_string())
            }
            RuntimeError::Store(StoreError::NotFound(_)) => ApiError::NotFound,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::MissingField | ApiError::MalformedPayload | ApiError::Rejected(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::NotFound | ApiError::UnknownEndpoint => StatusCode::NOT_FOUND,
            ApiError::Internal(detail) => {
                error!(%detail, "request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
