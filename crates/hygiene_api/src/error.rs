//! The API boundary's error envelope: every typed error from the
//! crates beneath is classified via [`AsErrorKind`] and surfaced as
//! `{error, message}` with the matching HTTP status — never rewrapped into an
//! opaque string without its kind.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hygiene_protocol::http_types::ErrorResponse;
use hygiene_protocol::{AsErrorKind, ErrorKind};

#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    fn from_kind<E: AsErrorKind + std::fmt::Display>(err: E) -> Self {
        let kind = err.kind();
        Self::new(kind, err.to_string())
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ApiError {}

impl From<hygiene_db::DbError> for ApiError {
    fn from(e: hygiene_db::DbError) -> Self {
        Self::from_kind(e)
    }
}

impl From<hygiene_store::StoreError> for ApiError {
    fn from(e: hygiene_store::StoreError) -> Self {
        Self::from_kind(e)
    }
}

impl From<hygiene_queue::QueueError> for ApiError {
    fn from(e: hygiene_queue::QueueError) -> Self {
        Self::from_kind(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.kind.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorResponse {
            error: self.kind.to_string(),
            message: self.message,
        };
        (status, Json(body)).into_response()
    }
}
