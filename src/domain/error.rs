//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use super::types::TransferState;

/// Reason a transfer was refused by the policy guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDenial {
    /// Single transfer above the hard daily ceiling
    CeilingExceeded { amount: Decimal, ceiling: Decimal },

    /// Cumulative daily volume above the threshold without elevated approval
    ThresholdExceeded {
        cumulative: Decimal,
        amount: Decimal,
        threshold: Decimal,
    },
}

impl std::fmt::Display for PolicyDenial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyDenial::CeilingExceeded { amount, ceiling } => {
                write!(f, "amount {} exceeds daily ceiling {}", amount, ceiling)
            }
            PolicyDenial::ThresholdExceeded {
                cumulative,
                amount,
                threshold,
            } => write!(
                f,
                "daily volume {} + {} exceeds threshold {}",
                cumulative, amount, threshold
            ),
        }
    }
}

/// Ledger domain errors
///
/// Each variant is raised before any mutation is committed, so a caller
/// receiving one can rely on the ledger being unchanged.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Bad input shape, unknown reference or out-of-window promotion
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Illegal state machine transition
    #[error("Transfer {transfer_id} cannot {action} from state {state}")]
    InvalidTransition {
        transfer_id: Uuid,
        state: TransferState,
        action: &'static str,
    },

    /// Debit would take an account below zero
    #[error("Insufficient funds on account {account_id}: required {required}, available {available}")]
    InsufficientFunds {
        account_id: Uuid,
        required: Decimal,
        available: Decimal,
    },

    /// Ceiling or threshold breach
    #[error("Policy denied: {0}")]
    PolicyDenied(PolicyDenial),

    /// Transaction contention, safe to retry
    #[error("Persistence conflict: {0}")]
    PersistenceConflict(String),

    /// Entity missing or soft-deleted
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    /// Actor lacks the role for the operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound { entity, id }
    }

    pub fn insufficient_funds(account_id: Uuid, required: Decimal, available: Decimal) -> Self {
        Self::InsufficientFunds {
            account_id,
            required,
            available,
        }
    }

    /// Check if this is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation(_)
                | Self::InvalidTransition { .. }
                | Self::InsufficientFunds { .. }
                | Self::PolicyDenied(_)
                | Self::NotFound { .. }
                | Self::Unauthorized(_)
        )
    }

    /// Check if retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PersistenceConflict(_))
    }
}

impl From<super::AmountError> for DomainError {
    fn from(err: super::AmountError) -> Self {
        DomainError::Validation(err.to_string())
    }
}
