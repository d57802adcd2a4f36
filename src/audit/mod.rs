//! Audit and versioning
//!
//! Every audited entity embeds an [`AuditRecord`] that is rebuilt from its
//! events: creation stamps are set once, modification stamps on every
//! mutation, and deletion only flips the status. Rows are never removed.
//!
//! The journal is the append-only operations log written alongside each
//! ledger action.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::OperationContext;

// =========================================================================
// Record status and stamps
// =========================================================================

/// Lifecycle status of an audited record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Insert,
    Update,
    Delete,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Insert => "insert",
            RecordStatus::Update => "update",
            RecordStatus::Delete => "delete",
        }
    }
}

impl std::fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Creation/modification stamps shared by every audited entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub created_at: DateTime<Utc>,
    pub created_by: Uuid,
    pub modified_at: DateTime<Utc>,
    pub modified_by: Uuid,
    pub status: RecordStatus,
}

impl AuditRecord {
    /// Stamps for a freshly inserted record
    pub fn inserted(by: Uuid, at: DateTime<Utc>) -> Self {
        Self {
            created_at: at,
            created_by: by,
            modified_at: at,
            modified_by: by,
            status: RecordStatus::Insert,
        }
    }

    /// Record a mutation. Creation stamps are preserved.
    pub fn touch(&mut self, by: Uuid, at: DateTime<Utc>) {
        self.modified_at = at;
        self.modified_by = by;
        if self.status != RecordStatus::Delete {
            self.status = RecordStatus::Update;
        }
    }

    /// Soft delete: the record stays, only its status changes.
    pub fn mark_deleted(&mut self, by: Uuid, at: DateTime<Utc>) {
        self.modified_at = at;
        self.modified_by = by;
        self.status = RecordStatus::Delete;
    }

    pub fn is_deleted(&self) -> bool {
        self.status == RecordStatus::Delete
    }
}

impl Default for AuditRecord {
    fn default() -> Self {
        Self::inserted(Uuid::nil(), DateTime::<Utc>::default())
    }
}

/// Entities carrying audit stamps.
pub trait Audited {
    fn audit(&self) -> &AuditRecord;

    fn is_deleted(&self) -> bool {
        self.audit().is_deleted()
    }
}

// =========================================================================
// Journal
// =========================================================================

/// Journal action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    UserRegistered,
    UserUpdated,
    UserDeleted,
    AccountOpened,
    AccountFunded,
    AccountDeleted,
    MotifCreated,
    MotifRelabeled,
    MotifDeleted,
    PromotionCreated,
    PromotionUpdated,
    PromotionDeleted,
    TransferInitiated,
    TransferDispatched,
    TransferCompleted,
    TransferCancelled,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::UserRegistered => "user.registered",
            AuditAction::UserUpdated => "user.updated",
            AuditAction::UserDeleted => "user.deleted",
            AuditAction::AccountOpened => "account.opened",
            AuditAction::AccountFunded => "account.funded",
            AuditAction::AccountDeleted => "account.deleted",
            AuditAction::MotifCreated => "motif.created",
            AuditAction::MotifRelabeled => "motif.relabeled",
            AuditAction::MotifDeleted => "motif.deleted",
            AuditAction::PromotionCreated => "promotion.created",
            AuditAction::PromotionUpdated => "promotion.updated",
            AuditAction::PromotionDeleted => "promotion.deleted",
            AuditAction::TransferInitiated => "transfer.initiated",
            AuditAction::TransferDispatched => "transfer.dispatched",
            AuditAction::TransferCompleted => "transfer.completed",
            AuditAction::TransferCancelled => "transfer.cancelled",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One line of the operations journal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub id: Uuid,
    pub event: String,
    pub description: String,
    pub actor_id: Option<Uuid>,
    pub resource_type: Option<String>,
    pub resource_id: Option<Uuid>,
    pub correlation_id: Option<Uuid>,
    pub date_event: DateTime<Utc>,
}

impl JournalEntry {
    pub fn new(action: AuditAction, description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            event: action.as_str().to_string(),
            description: description.into(),
            actor_id: None,
            resource_type: None,
            resource_id: None,
            correlation_id: None,
            date_event: Utc::now(),
        }
    }

    /// Set the resource the entry is about
    pub fn resource(mut self, resource_type: &str, resource_id: Uuid) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = Some(resource_id);
        self
    }

    /// Copy actor and correlation from the operation context
    pub fn context(mut self, context: &OperationContext) -> Self {
        self.actor_id = context.actor.as_ref().map(|a| a.id);
        self.correlation_id = context.correlation_id;
        self
    }
}

/// Hex-encoded SHA-256 digest
pub fn sha256_hex(input: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}
