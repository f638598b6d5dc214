use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::domain::errors::DomainError;

/// Errors a handler can return; rendered as `{"error", "code"}` JSON.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("bad request: {0}")]
    BadRequest(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            ApiError::Domain(DomainError::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "INVALID_INPUT", msg.clone())
            }
            ApiError::Domain(DomainError::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone())
            }
            ApiError::Domain(DomainError::OperationFailed(msg)) => {
                tracing::error!(error = %msg, "Processing failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "PROCESSING_FAILED", msg.clone())
            }
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
        };

        (status, axum::Json(json!({ "error": message, "code": code }))).into_response()
    }
}
