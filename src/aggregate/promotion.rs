//! Promotion Aggregate
//!
//! A percentage reduction of the commission, applicable to transfers sent
//! inside the promotion's validity window (both bounds inclusive).

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditRecord, Audited};
use crate::domain::{DomainError, Percentage, PromotionChanges, PromotionEvent};

use super::{require_text, Aggregate};

/// Creation input for a promotion
#[derive(Debug, Clone, Deserialize)]
pub struct NewPromotion {
    pub label: String,
    #[serde(default)]
    pub description: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub percentage: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
    id: Uuid,
    label: String,
    description: String,
    starts_on: NaiveDate,
    ends_on: NaiveDate,
    percentage: Percentage,
    audit: AuditRecord,
    version: i64,
}

impl Default for Promotion {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            label: String::new(),
            description: String::new(),
            starts_on: NaiveDate::MIN,
            ends_on: NaiveDate::MIN,
            percentage: Percentage::zero(),
            audit: AuditRecord::default(),
            version: 0,
        }
    }
}

fn check_window(starts_on: NaiveDate, ends_on: NaiveDate) -> Result<(), DomainError> {
    if ends_on < starts_on {
        return Err(DomainError::validation(format!(
            "promotion ends on {} before it starts on {}",
            ends_on, starts_on
        )));
    }
    Ok(())
}

impl Promotion {
    pub fn create(
        promotion_id: Uuid,
        input: NewPromotion,
        created_by: Uuid,
    ) -> Result<(Self, PromotionEvent), DomainError> {
        check_window(input.starts_on, input.ends_on)?;
        let percentage = Percentage::new(input.percentage)?;

        let event = PromotionEvent::PromotionCreated {
            promotion_id,
            label: require_text("label", &input.label, 100)?,
            description: input.description.trim().to_string(),
            starts_on: input.starts_on,
            ends_on: input.ends_on,
            percentage: percentage.value(),
            created_by,
            created_at: Utc::now(),
        };

        let promotion = Self::default().apply(event.clone());
        Ok((promotion, event))
    }

    pub fn update(
        &self,
        changes: PromotionChanges,
        updated_by: Uuid,
    ) -> Result<PromotionEvent, DomainError> {
        self.ensure_active()?;

        if changes.description.is_none() && changes.ends_on.is_none() && changes.percentage.is_none() {
            return Err(DomainError::validation("no changes provided"));
        }
        if let Some(ends_on) = changes.ends_on {
            check_window(self.starts_on, ends_on)?;
        }
        let percentage = changes
            .percentage
            .map(Percentage::new)
            .transpose()?
            .map(|p| p.value());

        Ok(PromotionEvent::PromotionUpdated {
            promotion_id: self.id,
            changes: PromotionChanges {
                description: changes.description.map(|d| d.trim().to_string()),
                ends_on: changes.ends_on,
                percentage,
            },
            updated_by,
            updated_at: Utc::now(),
        })
    }

    pub fn delete(&self, deleted_by: Uuid) -> Result<PromotionEvent, DomainError> {
        self.ensure_active()?;
        Ok(PromotionEvent::PromotionDeleted {
            promotion_id: self.id,
            deleted_by,
            deleted_at: Utc::now(),
        })
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if self.audit.is_deleted() {
            return Err(DomainError::not_found("Promotion", self.id));
        }
        Ok(())
    }

    /// Whether the promotion may be applied to a transfer sent on `date`
    pub fn is_applicable_on(&self, date: NaiveDate) -> bool {
        !self.audit.is_deleted() && self.starts_on <= date && date <= self.ends_on
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn starts_on(&self) -> NaiveDate {
        self.starts_on
    }

    pub fn ends_on(&self) -> NaiveDate {
        self.ends_on
    }

    pub fn percentage(&self) -> Percentage {
        self.percentage
    }
}

impl Audited for Promotion {
    fn audit(&self) -> &AuditRecord {
        &self.audit
    }
}

impl Aggregate for Promotion {
    type Event = PromotionEvent;

    fn aggregate_type() -> &'static str {
        "Promotion"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(mut self, event: Self::Event) -> Self {
        match event {
            PromotionEvent::PromotionCreated {
                promotion_id,
                label,
                description,
                starts_on,
                ends_on,
                percentage,
                created_by,
                created_at,
            } => {
                self.id = promotion_id;
                self.label = label;
                self.description = description;
                self.starts_on = starts_on;
                self.ends_on = ends_on;
                match Percentage::new(percentage) {
                    Ok(p) => self.percentage = p,
                    Err(e) => tracing::error!(
                        "Invalid percentage during replay for promotion {}: {}",
                        self.id,
                        e
                    ),
                }
                self.audit = AuditRecord::inserted(created_by, created_at);
            }

            PromotionEvent::PromotionUpdated {
                changes,
                updated_by,
                updated_at,
                ..
            } => {
                if let Some(description) = changes.description {
                    self.description = description;
                }
                if let Some(ends_on) = changes.ends_on {
                    self.ends_on = ends_on;
                }
                if let Some(percentage) = changes.percentage {
                    match Percentage::new(percentage) {
                        Ok(p) => self.percentage = p,
                        Err(e) => tracing::error!(
                            "Invalid percentage during replay for promotion {}: {}",
                            self.id,
                            e
                        ),
                    }
                }
                self.audit.touch(updated_by, updated_at);
            }

            PromotionEvent::PromotionDeleted {
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
