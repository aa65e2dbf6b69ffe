/// Unified error types for VideoTube
use crate::db::StoreError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Concrete reason an authentication attempt was rejected.
///
/// Callers only ever see a generic 401; the cause stays available to
/// internal logic, logs and tests.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("no token presented")]
    MissingToken,

    #[error("token is malformed")]
    MalformedToken,

    #[error("token signature is invalid")]
    BadSignature,

    #[error("token has expired")]
    Expired,

    #[error("account referenced by token no longer exists")]
    AccountMissing,

    #[error("refresh token does not match the stored session")]
    TokenMismatch,

    #[error("session has been revoked")]
    Revoked,

    #[error("invalid credentials")]
    BadCredentials,
}

/// Main error type for the service
#[derive(Error, Debug)]
pub enum ApiError {
    /// Missing or malformed request fields
    #[error("{0}")]
    InvalidInput(String),

    /// Identifier that is not a 24-hex-character object id
    #[error("Invalid {0} id")]
    InvalidId(&'static str),

    /// Missing, invalid, expired or revoked credentials
    #[error("Unauthorized request")]
    Unauthorized(AuthFailure),

    /// Authenticated but not the owner
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Duplicate unique field
    #[error("{0}")]
    Conflict(String),

    /// Blob store could not produce a durable URL
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Storage error: {0}")]
    Store(#[from] StoreError),

    #[error("Internal error: {0}")]
    Internal(String),

    /// Rejected at startup by `ServerConfig::validate`
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InvalidInput(_) | ApiError::InvalidId(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::UploadFailed(_)
            | ApiError::Store(_)
            | ApiError::Internal(_)
            | ApiError::Config(_)
            | ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to the caller
    fn public_message(&self) -> String {
        match self {
            ApiError::UploadFailed(_) => "Upload failed, please retry".to_string(),
            ApiError::Store(_) | ApiError::Internal(_) | ApiError::Config(_) | ApiError::Io(_) => {
                "Internal server error".to_string() // Don't leak details
            }
            other => other.to_string(),
        }
    }
}

/// Error response envelope
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub status_code: u16,
    pub message: String,
    pub success: bool,
}

/// Convert ApiError to HTTP response
impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self {
            ApiError::Unauthorized(cause) => {
                tracing::warn!(%cause, "Rejected unauthenticated request");
            }
            ApiError::UploadFailed(cause) => {
                tracing::error!(%cause, "Blob upload failed");
            }
            ApiError::Store(_) | ApiError::Internal(_) | ApiError::Config(_) | ApiError::Io(_) => {
                tracing::error!(error = %self, "Request failed");
            }
            _ => {}
        }

        let body = Json(ErrorResponse {
            status_code: status.as_u16(),
            message: self.public_message(),
            success: false,
        });

        (status, body).into_response()
    }
}

/// Result type alias for service operations
pub type ApiResult<T> = Result<T, ApiError>;
