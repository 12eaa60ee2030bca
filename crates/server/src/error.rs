//! HTTP-facing errors for the resize server.
//!
//! Only request problems the caller can fix, and the domain gate, become
//! error statuses. Upstream failures are answered with a placeholder image
//! by the pipeline and never reach this type.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors returned to HTTP clients as plain text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ApiError {
    #[error("Missing src parameter")]
    MissingSource,

    #[error("Invalid src URL: {0}")]
    InvalidSource(String),

    #[error("Invalid parameters: {0}")]
    InvalidParams(String),

    #[error("Domain '{0}' is forbidden from using this resize service")]
    DomainForbidden(String),

    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::MissingSource | ApiError::InvalidSource(_) | ApiError::InvalidParams(_) => {
                StatusCode::BAD_REQUEST
            }
            ApiError::DomainForbidden(_) => StatusCode::FORBIDDEN,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<resizer_core::Error> for ApiError {
    fn from(err: resizer_core::Error) -> Self {
        match err {
            resizer_core::Error::InvalidParams(msg) => ApiError::InvalidParams(msg),
            resizer_core::Error::InvalidUrl(msg) => ApiError::InvalidSource(msg),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(msg) = &self {
            tracing::error!(error = %msg, "request failed");
        }
        (self.status(), self.to_string()).into_response()
    }
}
