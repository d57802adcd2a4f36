//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::event_store::EventStoreError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid API key")]
    InvalidApiKey,

    #[error("Missing required header: {0}")]
    MissingHeader(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Server errors (5xx)
    #[error("Event store error: {0}")]
    Store(EventStoreError),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl From<EventStoreError> for AppError {
    fn from(err: EventStoreError) -> Self {
        if err.is_concurrency_conflict() {
            AppError::Domain(DomainError::PersistenceConflict(err.to_string()))
        } else {
            AppError::Store(err)
        }
    }
}

impl AppError {
    /// Whether retrying the whole operation may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::Domain(e) => e.is_retryable(),
            AppError::Store(e) => e.is_retryable(),
            _ => false,
        }
    }

    /// The domain error, if this is one
    pub fn as_domain(&self) -> Option<&DomainError> {
        match self {
            AppError::Domain(e) => Some(e),
            _ => None,
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::MissingHeader(header) => {
                (StatusCode::BAD_REQUEST, "missing_header", Some(header.clone()))
            }

            // 401 Unauthorized
            AppError::InvalidApiKey => (StatusCode::UNAUTHORIZED, "invalid_api_key", None),

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(domain_err) => match domain_err {
                DomainError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "validation_error", Some(msg.clone()))
                }
                DomainError::InvalidTransition { state, .. } => (
                    StatusCode::CONFLICT,
                    "invalid_transition",
                    Some(state.to_string()),
                ),
                DomainError::InsufficientFunds { account_id, .. } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "insufficient_funds",
                    Some(account_id.to_string()),
                ),
                DomainError::PolicyDenied(denial) => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "policy_denied",
                    Some(denial.to_string()),
                ),
                DomainError::PersistenceConflict(_) => {
                    (StatusCode::CONFLICT, "persistence_conflict", None)
                }
                DomainError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "not_found",
                    Some(format!("{} {}", entity, id)),
                ),
                DomainError::Unauthorized(msg) => {
                    (StatusCode::FORBIDDEN, "unauthorized", Some(msg.clone()))
                }
            },

            AppError::Store(EventStoreError::IdempotencyKeyExists(key)) => (
                StatusCode::CONFLICT,
                "idempotency_conflict",
                Some(key.to_string()),
            ),

            // 500 Internal Server Error
            AppError::Store(e) => {
                tracing::error!("Event store error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "store_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{PolicyDenial, TransferState};
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn status_of(err: AppError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_domain_error_statuses() {
        assert_eq!(
            status_of(DomainError::validation("bad").into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(
                DomainError::InvalidTransition {
                    transfer_id: Uuid::new_v4(),
                    state: TransferState::Completed,
                    action: "cancel",
                }
                .into()
            ),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(
                DomainError::PolicyDenied(PolicyDenial::CeilingExceeded {
                    amount: dec!(50),
                    ceiling: dec!(30),
                })
                .into()
            ),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            status_of(DomainError::not_found("Transfer", Uuid::new_v4()).into()),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_store_conflict_becomes_persistence_conflict() {
        let err: AppError = EventStoreError::ConcurrencyConflict {
            aggregate_id: Uuid::new_v4(),
            expected: 1,
            actual: 2,
        }
        .into();

        assert!(matches!(
            err,
            AppError::Domain(DomainError::PersistenceConflict(_))
        ));
        assert!(err.is_retryable());
        assert_eq!(status_of(err), StatusCode::CONFLICT);
    }
}
