//! PostgreSQL event store
//!
//! Atomic multi-aggregate append inside one SERIALIZABLE transaction with
//! optimistic version checks. The `(aggregate_id, version)` unique
//! constraint catches writers that raced past the version check.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashSet;
use uuid::Uuid;

use crate::audit::JournalEntry;
use crate::domain::OperationContext;

use super::{AggregateOperation, EventStore, EventStoreError, StoredEvent};

type EventRow = (
    Uuid,
    String,
    Uuid,
    i64,
    String,
    serde_json::Value,
    serde_json::Value,
    Option<Uuid>,
    DateTime<Utc>,
);

fn to_stored(row: EventRow) -> StoredEvent {
    let (id, aggregate_type, aggregate_id, version, event_type, event_data, context, idempotency_key, created_at) =
        row;
    StoredEvent {
        id,
        aggregate_type,
        aggregate_id,
        version,
        event_type,
        event_data,
        context,
        idempotency_key,
        created_at,
    }
}

type JournalRow = (
    Uuid,
    String,
    String,
    Option<Uuid>,
    Option<String>,
    Option<Uuid>,
    Option<Uuid>,
    DateTime<Utc>,
);

/// Event Store backed by PostgreSQL
#[derive(Debug, Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    /// Create a new store with a database pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get current version of an aggregate
    async fn get_current_version(
        tx: &mut Transaction<'_, Postgres>,
        aggregate_id: Uuid,
    ) -> Result<i64, sqlx::Error> {
        let result: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT MAX(version) FROM events WHERE aggregate_id = $1
            "#,
        )
        .bind(aggregate_id)
        .fetch_optional(&mut **tx)
        .await?
        .flatten();

        Ok(result.unwrap_or(0))
    }

    async fn try_append(
        &self,
        operations: &[AggregateOperation],
        idempotency_key: Option<Uuid>,
        context_json: &serde_json::Value,
    ) -> Result<Vec<Uuid>, EventStoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await?;

        if let Some(key) = idempotency_key {
            let existing: Option<Uuid> =
                sqlx::query_scalar("SELECT aggregate_id FROM events WHERE idempotency_key = $1")
                    .bind(key)
                    .fetch_optional(&mut *tx)
                    .await?;
            if existing.is_some() {
                return Err(EventStoreError::IdempotencyKeyExists(key));
            }
        }

        let mut event_ids = Vec::with_capacity(operations.len());

        for (idx, op) in operations.iter().enumerate() {
            // Optimistic locking
            let current_version = Self::get_current_version(&mut tx, op.aggregate_id).await?;

            if current_version != op.expected_version {
                return Err(EventStoreError::ConcurrencyConflict {
                    aggregate_id: op.aggregate_id,
                    expected: op.expected_version,
                    actual: current_version,
                });
            }

            let idem_key = if idx == 0 { idempotency_key } else { None };

            let event_id: Uuid = sqlx::query_scalar(
                r#"
                INSERT INTO events (
                    aggregate_type, aggregate_id, version,
                    event_type, event_data, context, idempotency_key
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING id
                "#,
            )
            .bind(&op.aggregate_type)
            .bind(op.aggregate_id)
            .bind(op.expected_version + 1)
            .bind(&op.event_type)
            .bind(&op.event_data)
            .bind(context_json)
            .bind(idem_key)
            .fetch_one(&mut *tx)
            .await?;

            event_ids.push(event_id);
        }

        tx.commit().await?;

        Ok(event_ids)
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn append_atomic(
        &self,
        operations: Vec<AggregateOperation>,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<Vec<Uuid>, EventStoreError> {
        let mut seen = HashSet::with_capacity(operations.len());
        for op in &operations {
            if !seen.insert(op.aggregate_id) {
                return Err(EventStoreError::DuplicateAggregate(op.aggregate_id));
            }
        }

        let context_json = serde_json::to_value(context)?;

        self.try_append(&operations, idempotency_key, &context_json)
            .await
            .map_err(|e| match e {
                EventStoreError::Database(db) => EventStoreError::from_database(db, idempotency_key),
                other => other,
            })
    }

    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r#"
            SELECT id, aggregate_type, aggregate_id, version, event_type, event_data, context, idempotency_key, created_at
            FROM events
            WHERE aggregate_id = $1
            ORDER BY version ASC
            "#,
        )
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(to_stored).collect())
    }

    async fn find_by_idempotency_key(&self, key: Uuid) -> Result<Option<Uuid>, EventStoreError> {
        let id = sqlx::query_scalar("SELECT aggregate_id FROM events WHERE idempotency_key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(id)
    }

    async fn aggregate_ids(&self, aggregate_type: &str) -> Result<Vec<Uuid>, EventStoreError> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT aggregate_id FROM events
            WHERE aggregate_type = $1 AND version = 1
            ORDER BY created_at ASC, id ASC
            "#,
        )
        .bind(aggregate_type)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn transfers_by_sender(
        &self,
        sender_account_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, EventStoreError> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT aggregate_id FROM events
            WHERE event_type = 'TransferInitiated'
              AND event_data->'route'->>'sender_account_id' = $1
              AND (event_data->>'initiated_at')::timestamptz >= $2
              AND (event_data->>'initiated_at')::timestamptz < $3
            ORDER BY created_at ASC
            "#,
        )
        .bind(sender_account_id.to_string())
        .bind(from)
        .bind(to)
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn open_transfers(&self) -> Result<Vec<Uuid>, EventStoreError> {
        let ids = sqlx::query_scalar(
            r#"
            SELECT aggregate_id FROM events
            WHERE aggregate_type = 'Transfer'
            GROUP BY aggregate_id
            HAVING bool_and(event_type NOT IN ('TransferCompleted', 'TransferCancelled'))
            ORDER BY MIN(created_at) ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(ids)
    }

    async fn motif_in_use(&self, motif_id: Uuid) -> Result<bool, EventStoreError> {
        let in_use: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM events
                WHERE event_type = 'TransferInitiated'
                  AND event_data->>'motif_id' = $1
            )
            "#,
        )
        .bind(motif_id.to_string())
        .fetch_one(&self.pool)
        .await?;
        Ok(in_use)
    }

    async fn append_journal(&self, entry: &JournalEntry) -> Result<(), EventStoreError> {
        sqlx::query(
            r#"
            INSERT INTO journal (
                id, event, description, actor_id, resource_type, resource_id, correlation_id, date_event
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.event)
        .bind(&entry.description)
        .bind(entry.actor_id)
        .bind(&entry.resource_type)
        .bind(entry.resource_id)
        .bind(entry.correlation_id)
        .bind(entry.date_event)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn journal_for(&self, resource_id: Uuid) -> Result<Vec<JournalEntry>, EventStoreError> {
        let rows: Vec<JournalRow> = sqlx::query_as(
            r#"
            SELECT id, event, description, actor_id, resource_type, resource_id, correlation_id, date_event
            FROM journal
            WHERE resource_id = $1
            ORDER BY date_event ASC
            "#,
        )
        .bind(resource_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(
                |(id, event, description, actor_id, resource_type, resource_id, correlation_id, date_event)| {
                    JournalEntry {
                        id,
                        event,
                        description,
                        actor_id,
                        resource_type,
                        resource_id,
                        correlation_id,
                        date_event,
                    }
                },
            )
            .collect())
    }
}
