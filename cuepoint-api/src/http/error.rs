// HTTP error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Result type for HTTP handlers
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub code: &'static str,
}

impl AppError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_input", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "not_found", message)
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.status, self.message)
    }
}

impl std::error::Error for AppError {}

/// Error response JSON structure
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
    pub status: u16,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status;
        let body = Json(ErrorResponse {
            error: self.message,
            code: self.code.to_string(),
            status: status.as_u16(),
        });

        (status, body).into_response()
    }
}

/// Convert cuepoint_core errors to HTTP errors
impl From<cuepoint_core::Error> for AppError {
    fn from(err: cuepoint_core::Error) -> Self {
        use cuepoint_core::Error;

        let code = err.code();
        let status = match &err {
            Error::InvalidCapability(_) | Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::StaleSession(_) => StatusCode::GONE,
            Error::IndexOutOfRange { .. } => StatusCode::RANGE_NOT_SATISFIABLE,
            Error::OptimisticLockConflict => StatusCode::CONFLICT,
            Error::Upstream(msg) => {
                tracing::warn!("Upstream error: {}", msg);
                StatusCode::BAD_GATEWAY
            }
            Error::Serialization(e) => {
                tracing::error!("Serialization error: {}", e);
                return Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    code,
                    "Data processing error",
                );
            }
            Error::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                return Self::internal_server_error("Internal server error");
            }
        };

        Self::new(status, code, err.to_string())
    }
}

/// Convert serde_json errors to HTTP errors
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::bad_request(format!("JSON error: {err}"))
    }
}
