//! Aggregate module
//!
//! Aggregate Root pattern implementation for Event Sourcing.

pub mod account;
pub mod motif;
pub mod promotion;
pub mod transfer;
pub mod user;

pub use account::Account;
pub use motif::Motif;
pub use promotion::{NewPromotion, Promotion};
pub use transfer::{Transfer, TransferDraft};
pub use user::{NewUser, User};

use crate::domain::DomainError;

/// Aggregate trait that all aggregates must implement
pub trait Aggregate: Sized + Default {
    /// The type of events this aggregate handles
    type Event;

    /// Get the aggregate type name (for storage)
    fn aggregate_type() -> &'static str;

    /// Get the aggregate ID
    fn id(&self) -> uuid::Uuid;

    /// Get the current version (number of events applied)
    fn version(&self) -> i64;

    /// Apply an event to update the aggregate state
    fn apply(self, event: Self::Event) -> Self;
}

/// Trimmed, non-empty text of at most `max` characters.
pub(crate) fn require_text(field: &str, value: &str, max: usize) -> Result<String, DomainError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(DomainError::validation(format!("{} is required", field)));
    }
    if value.chars().count() > max {
        return Err(DomainError::validation(format!(
            "{} exceeds {} characters",
            field, max
        )));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_text() {
        assert_eq!(require_text("label", "  Famille ", 10).unwrap(), "Famille");
        assert!(require_text("label", "   ", 10).is_err());
        assert!(require_text("label", "abcdef", 5).is_err());
    }
}
