//! Event Store module
//!
//! Persistence layer for Event Sourcing. The [`EventStore`] trait is the
//! only seam the ledger talks to; PostgreSQL and in-memory implementations
//! live side by side.

mod error;
mod locks;
mod memory;
mod postgres;
mod retry;

pub use error::EventStoreError;
pub use locks::{AccountLocks, LockSet, DEFAULT_LOCK_WAIT};
pub use memory::InMemoryEventStore;
pub use postgres::PgEventStore;
pub use retry::{retry_on_conflict, MAX_ATTEMPTS};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use uuid::Uuid;

use crate::aggregate::Aggregate;
use crate::audit::{Audited, JournalEntry};
use crate::domain::OperationContext;

/// Stored event
#[derive(Debug, Clone)]
pub struct StoredEvent {
    pub id: Uuid,
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub version: i64,
    pub event_type: String,
    pub event_data: serde_json::Value,
    pub context: serde_json::Value,
    pub idempotency_key: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Operation to be performed on an aggregate
#[derive(Debug, Clone)]
pub struct AggregateOperation {
    pub aggregate_type: String,
    pub aggregate_id: Uuid,
    pub expected_version: i64,
    pub event_type: String,
    pub event_data: serde_json::Value,
}

impl AggregateOperation {
    /// Create a new aggregate operation
    pub fn new<E: Serialize>(
        aggregate_type: &str,
        aggregate_id: Uuid,
        expected_version: i64,
        event_type: &str,
        event: &E,
    ) -> Result<Self, EventStoreError> {
        let event_data = serde_json::to_value(event)?;
        Ok(Self {
            aggregate_type: aggregate_type.to_string(),
            aggregate_id,
            expected_version,
            event_type: event_type.to_string(),
            event_data,
        })
    }
}

/// Event persistence contract.
///
/// `append_atomic` is all-or-nothing: every operation's expected version is
/// checked, and either all events are written or none is.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Atomically append one event per operation (single attempt).
    ///
    /// Fails with `IdempotencyKeyExists` when the key was already used and
    /// with a concurrency conflict when any expected version is stale.
    async fn append_atomic(
        &self,
        operations: Vec<AggregateOperation>,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<Vec<Uuid>, EventStoreError>;

    /// All events of an aggregate in version order
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, EventStoreError>;

    /// Aggregate created by the batch that carried `key`, if any
    async fn find_by_idempotency_key(&self, key: Uuid) -> Result<Option<Uuid>, EventStoreError>;

    /// Ids of every aggregate of a type, oldest first
    async fn aggregate_ids(&self, aggregate_type: &str) -> Result<Vec<Uuid>, EventStoreError>;

    /// Transfers initiated by a sender account in `[from, to)`
    async fn transfers_by_sender(
        &self,
        sender_account_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, EventStoreError>;

    /// Transfers that are neither completed nor cancelled
    async fn open_transfers(&self) -> Result<Vec<Uuid>, EventStoreError>;

    /// Whether any stored transfer references the motif
    async fn motif_in_use(&self, motif_id: Uuid) -> Result<bool, EventStoreError>;

    async fn append_journal(&self, entry: &JournalEntry) -> Result<(), EventStoreError>;

    /// Journal entries about a resource, oldest first
    async fn journal_for(&self, resource_id: Uuid) -> Result<Vec<JournalEntry>, EventStoreError>;
}

/// Load an aggregate by replaying its events.
///
/// Returns `None` when the id is unknown or belongs to another aggregate
/// type.
pub async fn load_aggregate<A>(
    store: &dyn EventStore,
    aggregate_id: Uuid,
) -> Result<Option<A>, EventStoreError>
where
    A: Aggregate,
    A::Event: DeserializeOwned,
{
    let events = store.load_events(aggregate_id).await?;

    match events.first() {
        None => return Ok(None),
        Some(first) if first.aggregate_type != A::aggregate_type() => return Ok(None),
        Some(_) => {}
    }

    let mut aggregate = A::default();
    for stored_event in events {
        let event: A::Event = serde_json::from_value(stored_event.event_data)?;
        aggregate = aggregate.apply(event);
    }

    Ok(Some(aggregate))
}

/// Like [`load_aggregate`], but soft-deleted records read as absent
pub async fn load_active<A>(
    store: &dyn EventStore,
    aggregate_id: Uuid,
) -> Result<Option<A>, EventStoreError>
where
    A: Aggregate + Audited,
    A::Event: DeserializeOwned,
{
    Ok(load_aggregate::<A>(store, aggregate_id)
        .await?
        .filter(|aggregate| !aggregate.is_deleted()))
}

/// Every non-deleted aggregate of a type
pub async fn load_all_active<A>(store: &dyn EventStore) -> Result<Vec<A>, EventStoreError>
where
    A: Aggregate + Audited,
    A::Event: DeserializeOwned,
{
    let mut aggregates = Vec::new();
    for id in store.aggregate_ids(A::aggregate_type()).await? {
        if let Some(aggregate) = load_active::<A>(store, id).await? {
            aggregates.push(aggregate);
        }
    }
    Ok(aggregates)
}
