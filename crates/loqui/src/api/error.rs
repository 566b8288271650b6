//! Unified API error handling with structured responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, error};

use crate::auth::AuthError;
use crate::chat::ChatError;
use crate::storage::StorageError;
use crate::store::StoreError;

/// API error type with structured responses.
///
/// Every domain error converts here by matching on its tagged variant; no
/// categorization ever inspects message text.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// Quota ceiling reached; carries the numbers for the client.
    #[error("{message}")]
    LimitReached {
        message: String,
        current: u64,
        limit: u64,
    },

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Gateway error: {0}")]
    BadGateway(String),
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::LimitReached { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "NOT_FOUND",
            Self::BadRequest(_) => "BAD_REQUEST",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Conflict(_) => "CONFLICT",
            Self::LimitReached { .. } => "LIMIT_REACHED",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::BadGateway(_) => "BAD_GATEWAY",
        }
    }
}

/// Structured error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code();
        let message = self.to_string();

        match &self {
            ApiError::Internal(msg) | ApiError::BadGateway(msg) => {
                error!(error_code = code, message = %msg, "API error");
            }
            _ => {
                debug!(error_code = code, message = %message, "Client error");
            }
        }

        let (current, limit) = match &self {
            ApiError::LimitReached { current, limit, .. } => (Some(*current), Some(*limit)),
            _ => (None, None),
        };

        let body = ErrorResponse {
            error: message,
            code,
            current,
            limit,
        };

        (status, Json(body)).into_response()
    }
}

impl From<ChatError> for ApiError {
    fn from(err: ChatError) -> Self {
        match err {
            ChatError::Validation(msg) => ApiError::BadRequest(msg),
            ChatError::QuotaExceeded {
                current,
                limit,
                message,
                ..
            } => ApiError::LimitReached {
                message,
                current,
                limit,
            },
            ChatError::AccessDenied(id) => {
                ApiError::Forbidden(format!("no access to conversation {}", id))
            }
            ChatError::NotFound(id) => {
                ApiError::NotFound(format!("conversation {} not found", id))
            }
            ChatError::TurnInFlight(id) => ApiError::Conflict(format!(
                "a response is already in progress for conversation {}",
                id
            )),
            ChatError::Upstream(msg) => ApiError::BadGateway(msg),
            ChatError::Store(err) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::from(ChatError::from(err))
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidDeviceKey => ApiError::BadRequest(err.to_string()),
            AuthError::MissingIdentity
            | AuthError::InvalidAuthHeader
            | AuthError::InvalidToken(_)
            | AuthError::TokenExpired => ApiError::Unauthorized(err.to_string()),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(key) => ApiError::NotFound(format!("file {} not found", key)),
            StorageError::InvalidKey(key) => ApiError::BadRequest(format!("invalid file key: {}", key)),
            StorageError::Io(err) => ApiError::Internal(err.to_string()),
            StorageError::Backend(msg) => ApiError::Internal(msg),
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::QuotaKind;

    #[test]
    fn test_status_codes() {
        assert_eq!(ApiError::not_found("").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::bad_request("").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::unauthorized("").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::internal("").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_quota_error_keeps_numbers() {
        let err = ApiError::from(ChatError::QuotaExceeded {
            kind: QuotaKind::Conversation,
            current: 3,
            limit: 3,
            message: "limit reached".into(),
        });

        match &err {
            ApiError::LimitReached { current, limit, .. } => {
                assert_eq!((*current, *limit), (3, 3));
            }
            other => panic!("expected LimitReached, got {other:?}"),
        }
        assert_eq!(err.status_code(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(err.error_code(), "LIMIT_REACHED");
    }

    #[test]
    fn test_access_denied_distinct_from_not_found() {
        let denied = ApiError::from(ChatError::AccessDenied("c1".into()));
        let missing = ApiError::from(ChatError::NotFound("c1".into()));
        assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(missing.status_code(), StatusCode::NOT_FOUND);
    }
}
