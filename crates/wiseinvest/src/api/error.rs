//! Unified API error handling with structured responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, warn};

use crate::agent::UnknownAgent;
use crate::turn::TurnError;

/// API error type with structured responses.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    /// A failed turn, keeping the turn's own category as the code.
    #[error("{message}")]
    Turn {
        status: StatusCode,
        code: &'static str,
        message: String,
    },
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Turn { status, .. } => *status,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::Turn { code, .. } => *code,
        }
    }

    /// Categorize an anyhow error by its typed source or message.
    ///
    /// Patterns recognized:
    /// - an [`UnknownAgent`] anywhere in the chain -> BadRequest
    /// - "not found" -> NotFound
    /// - "invalid" / "must be" -> BadRequest
    /// - Default -> Internal
    pub fn from_anyhow(err: anyhow::Error) -> Self {
        if let Some(unknown) = err.downcast_ref::<UnknownAgent>() {
            return ApiError::BadRequest(unknown.to_string());
        }

        let msg = format!("{:#}", err);
        let msg_lower = msg.to_lowercase();

        if msg_lower.contains("not found") {
            ApiError::NotFound(msg)
        } else if msg_lower.contains("invalid") || msg_lower.contains("must be") {
            ApiError::BadRequest(msg)
        } else {
            ApiError::Internal(msg)
        }
    }

    /// Log at a level matching the severity.
    pub(crate) fn log(&self) {
        let code = self.error_code();
        match self {
            ApiError::Internal(msg) => {
                error!(error_code = code, message = %msg, "API error");
            }
            ApiError::Turn { status, message, .. } if status.is_server_error() => {
                error!(error_code = code, message = %message, "Turn failed");
            }
            ApiError::Turn { status, message, .. } if *status == StatusCode::REQUEST_TIMEOUT => {
                warn!(error_code = code, message = %message, "Turn canceled");
            }
            _ => {
                tracing::debug!(error_code = code, message = %self, "Client error");
            }
        }
    }

    pub(crate) fn body(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.to_string(),
            code: self.error_code(),
        }
    }
}

/// Structured error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.log();
        (self.status_code(), Json(self.body())).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        Self::from_anyhow(err)
    }
}

impl From<UnknownAgent> for ApiError {
    fn from(err: UnknownAgent) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<TurnError> for ApiError {
    fn from(err: TurnError) -> Self {
        let status = match err {
            TurnError::NotFound(_) => StatusCode::NOT_FOUND,
            TurnError::InvalidAgent(_) => StatusCode::BAD_REQUEST,
            TurnError::Busy(_) => StatusCode::CONFLICT,
            TurnError::Upstream(_) => StatusCode::BAD_GATEWAY,
            TurnError::Canceled(_) => StatusCode::REQUEST_TIMEOUT,
            TurnError::Persistence(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        ApiError::Turn {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
