//! Error types for md2pptx-server
//!
//! Handlers return [`ApiResult`]; every variant maps to one HTTP status with
//! the message as a plain-text body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::converter::ConvertError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing, empty or unnamed upload (400)
    #[error("{0}")]
    BadRequest(String),

    /// Upload is not a Markdown file (415)
    #[error("{0}")]
    UnsupportedMediaType(String),

    /// Converter ran but produced no deck, or timed out (409)
    #[error("{0}")]
    Conflict(String),

    /// Request body exceeded the configured limit (413)
    #[error("Upload exceeds the maximum allowed size")]
    PayloadTooLarge,

    /// Staging or process failure (500)
    #[error("{0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) | ApiError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ConvertError> for ApiError {
    fn from(err: ConvertError) -> Self {
        match err {
            ConvertError::TimedOut(_) => {
                ApiError::Conflict(format!("PPTX file was not generated: {}", err))
            }
            ConvertError::Spawn { .. } | ConvertError::Wait(_) | ConvertError::NotFound(_) => {
                ApiError::Internal(format!("Error generating PPTX: {}", err))
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
