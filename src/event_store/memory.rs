//! In-memory event store
//!
//! Keeps every stream behind one `RwLock`; an atomic append validates the
//! whole batch before writing anything. Used by the test suites and by the
//! server when no database is configured.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::audit::JournalEntry;
use crate::domain::{OperationContext, TransferEvent};

use super::{AggregateOperation, EventStore, EventStoreError, StoredEvent};

const TRANSFER: &str = "Transfer";

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<Uuid, Vec<StoredEvent>>,
    /// Aggregate ids in creation order
    created: Vec<Uuid>,
    idempotency: HashMap<Uuid, Uuid>,
    journal: Vec<JournalEntry>,
}

impl Inner {
    fn current_version(&self, aggregate_id: Uuid) -> i64 {
        self.streams
            .get(&aggregate_id)
            .and_then(|events| events.last())
            .map(|event| event.version)
            .unwrap_or(0)
    }

    fn transfer_ids(&self) -> impl Iterator<Item = &Uuid> + '_ {
        self.created.iter().filter(move |id| {
            self.streams
                .get(*id)
                .and_then(|events| events.first())
                .map(|event| event.aggregate_type == TRANSFER)
                .unwrap_or(false)
        })
    }

    fn initiated(&self, transfer_id: Uuid) -> Option<TransferEvent> {
        let first = self.streams.get(&transfer_id)?.first()?;
        serde_json::from_value(first.event_data.clone()).ok()
    }

    fn has_event(&self, aggregate_id: Uuid, event_type: &str) -> bool {
        self.streams
            .get(&aggregate_id)
            .map(|events| events.iter().any(|event| event.event_type == event_type))
            .unwrap_or(false)
    }
}

/// Event store held entirely in process memory
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored events
    pub async fn event_count(&self) -> usize {
        self.inner.read().await.streams.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn append_atomic(
        &self,
        operations: Vec<AggregateOperation>,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<Vec<Uuid>, EventStoreError> {
        let context_json = serde_json::to_value(context)?;
        let mut inner = self.inner.write().await;

        if let Some(key) = idempotency_key {
            if inner.idempotency.contains_key(&key) {
                return Err(EventStoreError::IdempotencyKeyExists(key));
            }
        }

        // Validate the whole batch before touching any stream
        let mut seen = HashSet::with_capacity(operations.len());
        for op in &operations {
            if !seen.insert(op.aggregate_id) {
                return Err(EventStoreError::DuplicateAggregate(op.aggregate_id));
            }
            let current_version = inner.current_version(op.aggregate_id);
            if current_version != op.expected_version {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id: op.aggregate_id,
                    expected: op.expected_version,
                    actual: current_version,
                });
            }
        }

        let now = Utc::now();
        let mut event_ids = Vec::with_capacity(operations.len());

        for (idx, op) in operations.into_iter().enumerate() {
            let event_id = Uuid::new_v4();
            let stored = StoredEvent {
                id: event_id,
                aggregate_type: op.aggregate_type,
                aggregate_id: op.aggregate_id,
                version: op.expected_version + 1,
                event_type: op.event_type,
                event_data: op.event_data,
                context: context_json.clone(),
                idempotency_key: if idx == 0 { idempotency_key } else { None },
                created_at: now,
            };

            if op.expected_version == 0 {
                inner.created.push(op.aggregate_id);
            }
            if let (0, Some(key)) = (idx, idempotency_key) {
                inner.idempotency.insert(key, op.aggregate_id);
            }
            inner.streams.entry(op.aggregate_id).or_default().push(stored);
            event_ids.push(event_id);
        }

        Ok(event_ids)
    }

    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self.inner.read().await;
        Ok(inner.streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    async fn find_by_idempotency_key(&self, key: Uuid) -> Result<Option<Uuid>, EventStoreError> {
        Ok(self.inner.read().await.idempotency.get(&key).copied())
    }

    async fn aggregate_ids(&self, aggregate_type: &str) -> Result<Vec<Uuid>, EventStoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .created
            .iter()
            .filter(|id| {
                inner
                    .streams
                    .get(*id)
                    .and_then(|events| events.first())
                    .map(|event| event.aggregate_type == aggregate_type)
                    .unwrap_or(false)
            })
            .copied()
            .collect())
    }

    async fn transfers_by_sender(
        &self,
        sender_account_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, EventStoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .transfer_ids()
            .filter(|id| match inner.initiated(**id) {
                Some(TransferEvent::TransferInitiated {
                    route,
                    initiated_at,
                    ..
                }) => {
                    route.sender_account_id == sender_account_id
                        && initiated_at >= from
                        && initiated_at < to
                }
                _ => false,
            })
            .copied()
            .collect())
    }

    async fn open_transfers(&self) -> Result<Vec<Uuid>, EventStoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .transfer_ids()
            .filter(|id| {
                !inner.has_event(**id, "TransferCompleted") && !inner.has_event(**id, "TransferCancelled")
            })
            .copied()
            .collect())
    }

    async fn motif_in_use(&self, motif_id: Uuid) -> Result<bool, EventStoreError> {
        let inner = self.inner.read().await;
        let in_use = inner.transfer_ids().any(|id| {
            matches!(
                inner.initiated(*id),
                Some(TransferEvent::TransferInitiated { motif_id: m, .. }) if m == motif_id
            )
        });
        Ok(in_use)
    }

    async fn append_journal(&self, entry: &JournalEntry) -> Result<(), EventStoreError> {
        self.inner.write().await.journal.push(entry.clone());
        Ok(())
    }

    async fn journal_for(&self, resource_id: Uuid) -> Result<Vec<JournalEntry>, EventStoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .journal
            .iter()
            .filter(|entry| entry.resource_id == Some(resource_id))
            .cloned()
            .collect())
    }
}
