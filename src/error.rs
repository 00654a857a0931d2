//! Service-wide error type.
//!
//! Every handler returns `Result<_, ServiceError>`. Each variant maps to a
//! stable machine-readable code and an HTTP status; the JSON body is always
//! `{"code": "...", "msg": "..."}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

use crate::blob::BlobError;
use crate::store::StoreError;

pub mod error_code {
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const UNAUTHENTICATED: &str = "UNAUTHENTICATED";
    pub const PERMISSION_DENIED: &str = "PERMISSION_DENIED";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const ALREADY_EXISTS: &str = "ALREADY_EXISTS";
    pub const PAYLOAD_TOO_LARGE: &str = "PAYLOAD_TOO_LARGE";
    pub const STORAGE_INCONSISTENCY: &str = "STORAGE_INCONSISTENCY";
    pub const STORAGE_ERROR: &str = "STORAGE_ERROR";
    pub const INTERNAL: &str = "INTERNAL";
}

#[derive(Error, Debug)]
pub enum ServiceError {
    /// Malformed identifier, bad input, or an update with nothing to apply. HTTP 400.
    #[error("{0}")]
    Validation(String),

    /// Missing, invalid or revoked credential. HTTP 401.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated but not allowed to touch the resource. HTTP 403.
    #[error("{0}")]
    Forbidden(String),

    /// HTTP 404.
    #[error("{0}")]
    NotFound(String),

    /// HTTP 409.
    #[error("{0}")]
    Conflict(String),

    /// Request body over the configured upload limit. HTTP 413.
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Metadata points at a stored file that is gone. HTTP 500.
    #[error("{0}")]
    StorageInconsistency(String),

    /// Document store or file storage failure. HTTP 500.
    #[error("{0}")]
    Storage(String),

    /// HTTP 500.
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Validation(_) => error_code::VALIDATION_FAILED,
            ServiceError::Unauthorized(_) => error_code::UNAUTHENTICATED,
            ServiceError::Forbidden(_) => error_code::PERMISSION_DENIED,
            ServiceError::NotFound(_) => error_code::NOT_FOUND,
            ServiceError::Conflict(_) => error_code::ALREADY_EXISTS,
            ServiceError::PayloadTooLarge(_) => error_code::PAYLOAD_TOO_LARGE,
            ServiceError::StorageInconsistency(_) => error_code::STORAGE_INCONSISTENCY,
            ServiceError::Storage(_) => error_code::STORAGE_ERROR,
            ServiceError::Internal(_) => error_code::INTERNAL,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden(_) => StatusCode::FORBIDDEN,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ServiceError::StorageInconsistency(_)
            | ServiceError::Storage(_)
            | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = serde_json::json!({
            "code": self.error_code(),
            "msg": self.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        ServiceError::Storage(e.to_string())
    }
}

impl From<BlobError> for ServiceError {
    fn from(e: BlobError) -> Self {
        ServiceError::Storage(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(ServiceError::Validation("x".into()).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ServiceError::Unauthorized("x".into()).status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ServiceError::Forbidden("x".into()).status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ServiceError::NotFound("x".into()).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ServiceError::Conflict("x".into()).status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ServiceError::PayloadTooLarge("x".into()).status_code(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ServiceError::StorageInconsistency("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(ServiceError::Storage("x".into()).status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn not_found_and_forbidden_stay_distinct() {
        let nf = ServiceError::NotFound("Task not found".into());
        let fb = ServiceError::Forbidden("no".into());
        assert_ne!(nf.status_code(), fb.status_code());
        assert_ne!(nf.error_code(), fb.error_code());
    }

    #[test]
    fn display_is_just_the_message() {
        assert_eq!(
            ServiceError::Validation("Invalid Task ID format".into()).to_string(),
            "Invalid Task ID format"
        );
    }

    #[test]
    fn response_carries_status() {
        let resp = ServiceError::Forbidden("denied".into()).into_response();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
