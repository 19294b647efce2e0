//! Error types for the REST surface

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use canopy_core::RegistryError;
use serde::Serialize;
use thiserror::Error;
use tonic::{Code, Status};

const BAD_REQUEST_PREFIX: &str = "Bad Request";
const INTERNAL_SERVER_ERROR_PREFIX: &str = "Internal Server Error";
const NOT_FOUND_PREFIX: &str = "404 Not Found";
const UNPROCESSABLE_PREFIX: &str = "Unprocessable Entity";
const NOT_IMPLEMENTED_PREFIX: &str = "Not Implemented";
const UNAVAILABLE_PREFIX: &str = "Service Unavailable";
const CONFLICT_PREFIX: &str = "Conflict";
const GATEWAY_TIMEOUT_PREFIX: &str = "Gateway Timeout";

/// Body of every REST error response
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    Http { status: StatusCode, message: String },

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Http { status, .. } => *status,
            Self::Registry(err) => status_for_code(err.code()),
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Status> for ApiError {
    fn from(status: Status) -> Self {
        Self::Registry(RegistryError::Backend(status))
    }
}

/// HTTP status for an RPC status code
pub fn status_for_code(code: Code) -> StatusCode {
    match code {
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::AlreadyExists => StatusCode::CONFLICT,
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn prefix(status: StatusCode) -> &'static str {
    match status {
        StatusCode::INTERNAL_SERVER_ERROR => INTERNAL_SERVER_ERROR_PREFIX,
        StatusCode::BAD_REQUEST => BAD_REQUEST_PREFIX,
        StatusCode::NOT_FOUND => NOT_FOUND_PREFIX,
        StatusCode::UNPROCESSABLE_ENTITY => UNPROCESSABLE_PREFIX,
        StatusCode::NOT_IMPLEMENTED => NOT_IMPLEMENTED_PREFIX,
        StatusCode::SERVICE_UNAVAILABLE => UNAVAILABLE_PREFIX,
        StatusCode::CONFLICT => CONFLICT_PREFIX,
        StatusCode::GATEWAY_TIMEOUT => GATEWAY_TIMEOUT_PREFIX,
        _ => "",
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::warn!(status = %status.as_u16(), error = %self, "request failed");
        }

        let body = ErrorBody {
            code: status.as_u16(),
            message: format!("{} - {}", prefix(status), self),
        };
        (status, Json(body)).into_response()
    }
}
