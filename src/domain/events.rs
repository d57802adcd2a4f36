//! Domain Events
//!
//! Event definitions for Event Sourcing.
//! Events are immutable facts that have happened in the ledger. Every event
//! names the actor who caused it and when, which is what the audit stamps
//! of each aggregate are rebuilt from.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{AccountKind, ActorRole, CommissionBreakdown, PartyDetails, TransferRoute};

/// Account-related events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AccountEvent {
    /// Account was opened
    AccountOpened {
        account_id: Uuid,
        kind: AccountKind,
        account_number: String,
        holder_name: String,
        country_code: Option<String>,
        opened_by: Uuid,
        opened_at: DateTime<Utc>,
    },

    /// Money was credited to the account (balance increased)
    MoneyCredited {
        account_id: Uuid,
        amount: Decimal,
        transfer_id: Option<Uuid>,
        description: String,
        credited_by: Uuid,
        credited_at: DateTime<Utc>,
    },

    /// Money was debited from the account (balance decreased)
    MoneyDebited {
        account_id: Uuid,
        amount: Decimal,
        transfer_id: Option<Uuid>,
        description: String,
        debited_by: Uuid,
        debited_at: DateTime<Utc>,
    },

    /// A transfer was initiated with this account as sender. Balance is
    /// unchanged; the event orders initiations on the sender's stream.
    OutgoingTransferRegistered {
        account_id: Uuid,
        transfer_id: Uuid,
        amount: Decimal,
        registered_by: Uuid,
        registered_at: DateTime<Utc>,
    },

    /// Account was soft-deleted
    AccountDeleted {
        account_id: Uuid,
        deleted_by: Uuid,
        deleted_at: DateTime<Utc>,
    },
}

impl AccountEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::AccountOpened { .. } => "AccountOpened",
            AccountEvent::MoneyCredited { .. } => "MoneyCredited",
            AccountEvent::MoneyDebited { .. } => "MoneyDebited",
            AccountEvent::OutgoingTransferRegistered { .. } => "OutgoingTransferRegistered",
            AccountEvent::AccountDeleted { .. } => "AccountDeleted",
        }
    }

    /// Get the account ID this event relates to
    pub fn account_id(&self) -> Uuid {
        match self {
            AccountEvent::AccountOpened { account_id, .. }
            | AccountEvent::MoneyCredited { account_id, .. }
            | AccountEvent::MoneyDebited { account_id, .. }
            | AccountEvent::OutgoingTransferRegistered { account_id, .. }
            | AccountEvent::AccountDeleted { account_id, .. } => *account_id,
        }
    }
}

/// Transfer-related events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TransferEvent {
    /// Transfer was registered at the sending office
    TransferInitiated {
        transfer_id: Uuid,
        operation_number: String,
        /// SHA-256 of the secret code handed to the sender
        operation_code_hash: String,
        sender: PartyDetails,
        beneficiary: PartyDetails,
        route: TransferRoute,
        amount: Decimal,
        commission: CommissionBreakdown,
        motif_id: Uuid,
        promotion_id: Option<Uuid>,
        initiated_by: Uuid,
        initiated_at: DateTime<Utc>,
    },

    /// Funds are on their way to the paying office
    TransferDispatched {
        transfer_id: Uuid,
        dispatched_by: Uuid,
        dispatched_at: DateTime<Utc>,
    },

    /// Beneficiary was paid; balances were moved in the same commit
    TransferCompleted {
        transfer_id: Uuid,
        completed_by: Uuid,
        completed_at: DateTime<Utc>,
    },

    /// Transfer was cancelled before completion
    TransferCancelled {
        transfer_id: Uuid,
        reason: String,
        cancelled_by: Uuid,
        cancelled_at: DateTime<Utc>,
    },
}

impl TransferEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            TransferEvent::TransferInitiated { .. } => "TransferInitiated",
            TransferEvent::TransferDispatched { .. } => "TransferDispatched",
            TransferEvent::TransferCompleted { .. } => "TransferCompleted",
            TransferEvent::TransferCancelled { .. } => "TransferCancelled",
        }
    }

    /// Get the transfer ID this event relates to
    pub fn transfer_id(&self) -> Uuid {
        match self {
            TransferEvent::TransferInitiated { transfer_id, .. }
            | TransferEvent::TransferDispatched { transfer_id, .. }
            | TransferEvent::TransferCompleted { transfer_id, .. }
            | TransferEvent::TransferCancelled { transfer_id, .. } => *transfer_id,
        }
    }
}

/// User (actor) events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum UserEvent {
    /// User was registered
    UserRegistered {
        user_id: Uuid,
        username: String,
        first_name: String,
        last_name: String,
        phone: String,
        email: String,
        country_code: Option<String>,
        role: ActorRole,
        /// The bootstrap administrator registers itself
        registered_by: Uuid,
        registered_at: DateTime<Utc>,
    },

    /// User profile was updated
    UserUpdated {
        user_id: Uuid,
        changes: UserChanges,
        updated_by: Uuid,
        updated_at: DateTime<Utc>,
    },

    /// User was soft-deleted
    UserDeleted {
        user_id: Uuid,
        deleted_by: Uuid,
        deleted_at: DateTime<Utc>,
    },
}

/// Changes made to a user profile
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<ActorRole>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.phone.is_none() && self.email.is_none() && self.role.is_none()
    }
}

impl UserEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            UserEvent::UserRegistered { .. } => "UserRegistered",
            UserEvent::UserUpdated { .. } => "UserUpdated",
            UserEvent::UserDeleted { .. } => "UserDeleted",
        }
    }

    pub fn user_id(&self) -> Uuid {
        match self {
            UserEvent::UserRegistered { user_id, .. }
            | UserEvent::UserUpdated { user_id, .. }
            | UserEvent::UserDeleted { user_id, .. } => *user_id,
        }
    }
}

/// Motif (transfer reason) events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MotifEvent {
    MotifCreated {
        motif_id: Uuid,
        label: String,
        created_by: Uuid,
        created_at: DateTime<Utc>,
    },

    MotifRelabeled {
        motif_id: Uuid,
        label: String,
        relabeled_by: Uuid,
        relabeled_at: DateTime<Utc>,
    },

    MotifDeleted {
        motif_id: Uuid,
        deleted_by: Uuid,
        deleted_at: DateTime<Utc>,
    },
}

impl MotifEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            MotifEvent::MotifCreated { .. } => "MotifCreated",
            MotifEvent::MotifRelabeled { .. } => "MotifRelabeled",
            MotifEvent::MotifDeleted { .. } => "MotifDeleted",
        }
    }
}

/// Promotion events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PromotionEvent {
    PromotionCreated {
        promotion_id: Uuid,
        label: String,
        description: String,
        starts_on: NaiveDate,
        ends_on: NaiveDate,
        percentage: Decimal,
        created_by: Uuid,
        created_at: DateTime<Utc>,
    },

    PromotionUpdated {
        promotion_id: Uuid,
        changes: PromotionChanges,
        updated_by: Uuid,
        updated_at: DateTime<Utc>,
    },

    PromotionDeleted {
        promotion_id: Uuid,
        deleted_by: Uuid,
        deleted_at: DateTime<Utc>,
    },
}

/// Changes made to a promotion
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PromotionChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_on: Option<NaiveDate>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub percentage: Option<Decimal>,
}

impl PromotionEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            PromotionEvent::PromotionCreated { .. } => "PromotionCreated",
            PromotionEvent::PromotionUpdated { .. } => "PromotionUpdated",
            PromotionEvent::PromotionDeleted { .. } => "PromotionDeleted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_event_serialization() {
        let event = AccountEvent::MoneyCredited {
            account_id: Uuid::new_v4(),
            amount: Decimal::new(19000, 2),
            transfer_id: Some(Uuid::new_v4()),
            description: "Transfer proceeds".to_string(),
            credited_by: Uuid::new_v4(),
            credited_at: Utc::now(),
        };

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("MoneyCredited"));

        let deserialized: AccountEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event.event_type(), deserialized.event_type());
        assert_eq!(event.account_id(), deserialized.account_id());
    }

    #[test]
    fn test_transfer_event_tag() {
        let transfer_id = Uuid::new_v4();
        let event = TransferEvent::TransferCancelled {
            transfer_id,
            reason: "customer request".to_string(),
            cancelled_by: Uuid::new_v4(),
            cancelled_at: Utc::now(),
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "TransferCancelled");
        assert_eq!(event.transfer_id(), transfer_id);
    }

    #[test]
    fn test_user_changes_skip_empty_fields() {
        let changes = UserChanges {
            email: Some("agent@kalante.sn".to_string()),
            ..Default::default()
        };
        let json = serde_json::to_string(&changes).unwrap();
        assert_eq!(json, r#"{"email":"agent@kalante.sn"}"#);
        assert!(!changes.is_empty());
        assert!(UserChanges::default().is_empty());
    }
}
