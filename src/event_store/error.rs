//! Event Store Errors
//!
//! Error types for event store operations.

use uuid::Uuid;

/// Errors that can occur in the event store
#[derive(Debug, thiserror::Error)]
pub enum EventStoreError {
    /// Optimistic concurrency conflict
    #[error("Concurrency conflict for aggregate {aggregate_id}: expected version {expected}, found {actual}")]
    ConcurrencyConflict {
        aggregate_id: Uuid,
        expected: i64,
        actual: i64,
    },

    /// Conflict detected by the database itself (unique version or
    /// serialization failure)
    #[error("Write conflict: {0}")]
    WriteConflict(String),

    /// The same aggregate appears twice in one atomic batch
    #[error("Aggregate {0} appears more than once in the batch")]
    DuplicateAggregate(Uuid),

    /// Idempotency key already exists
    #[error("Idempotency key already exists: {0}")]
    IdempotencyKeyExists(Uuid),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EventStoreError {
    /// Check if this error is a concurrency conflict
    pub fn is_concurrency_conflict(&self) -> bool {
        matches!(
            self,
            EventStoreError::ConcurrencyConflict { .. } | EventStoreError::WriteConflict(_)
        )
    }

    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        self.is_concurrency_conflict()
    }

    /// Classify a database error, surfacing conflicts as such
    pub(crate) fn from_database(err: sqlx::Error, idempotency_key: Option<Uuid>) -> Self {
        if let sqlx::Error::Database(db) = &err {
            match db.code().as_deref() {
                Some("23505") => {
                    if let (Some(key), Some("events_idempotency_key_idx")) =
                        (idempotency_key, db.constraint())
                    {
                        return EventStoreError::IdempotencyKeyExists(key);
                    }
                    return EventStoreError::WriteConflict(db.message().to_string());
                }
                Some("40001") => return EventStoreError::WriteConflict(db.message().to_string()),
                _ => {}
            }
        }
        EventStoreError::Database(err)
    }
}
