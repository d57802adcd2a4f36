//! Motif Aggregate
//!
//! Reference list of reasons a transfer can be sent for.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditRecord, Audited};
use crate::domain::{DomainError, MotifEvent};

use super::{require_text, Aggregate};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Motif {
    id: Uuid,
    label: String,
    audit: AuditRecord,
    version: i64,
}

impl Motif {
    pub fn create(motif_id: Uuid, label: &str, created_by: Uuid) -> Result<(Self, MotifEvent), DomainError> {
        let event = MotifEvent::MotifCreated {
            motif_id,
            label: require_text("label", label, 100)?,
            created_by,
            created_at: Utc::now(),
        };
        let motif = Self::default().apply(event.clone());
        Ok((motif, event))
    }

    /// Change the label. Callers must first check that no completed transfer
    /// references this motif.
    pub fn relabel(&self, label: &str, relabeled_by: Uuid) -> Result<MotifEvent, DomainError> {
        self.ensure_active()?;
        let label = require_text("label", label, 100)?;
        if label == self.label {
            return Err(DomainError::validation("label is unchanged"));
        }
        Ok(MotifEvent::MotifRelabeled {
            motif_id: self.id,
            label,
            relabeled_by,
            relabeled_at: Utc::now(),
        })
    }

    pub fn delete(&self, deleted_by: Uuid) -> Result<MotifEvent, DomainError> {
        self.ensure_active()?;
        Ok(MotifEvent::MotifDeleted {
            motif_id: self.id,
            deleted_by,
            deleted_at: Utc::now(),
        })
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if self.audit.is_deleted() {
            return Err(DomainError::not_found("Motif", self.id));
        }
        Ok(())
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Audited for Motif {
    fn audit(&self) -> &AuditRecord {
        &self.audit
    }
}

impl Aggregate for Motif {
    type Event = MotifEvent;

    fn aggregate_type() -> &'static str {
        "Motif"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(mut self, event: Self::Event) -> Self {
        match event {
            MotifEvent::MotifCreated {
                motif_id,
                label,
                created_by,
                created_at,
            } => {
                self.id = motif_id;
                self.label = label;
                self.audit = AuditRecord::inserted(created_by, created_at);
            }
            MotifEvent::MotifRelabeled {
                label,
                relabeled_by,
                relabeled_at,
                ..
            } => {
                self.label = label;
                self.audit.touch(relabeled_by, relabeled_at);
            }
            MotifEvent::MotifDeleted {
                deleted_by,
                deleted_at,
                ..
            } => {
                self.audit.mark_deleted(deleted_by, deleted_at);
            }
        }

        self.version += 1;
        self
    }
}
