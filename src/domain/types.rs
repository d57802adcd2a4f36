//! Shared domain types
//!
//! Enumerations and value objects referenced by several aggregates and by
//! their events.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::DomainError;

// =========================================================================
// Actor roles
// =========================================================================

/// Role of an actor, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    /// Counter agent: initiates, dispatches and pays out transfers
    Agent,
    /// May approve transfers above the daily threshold
    Supervisor,
    /// Administrative edits on accounts, users and reference data
    Administrator,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Agent => "agent",
            ActorRole::Supervisor => "supervisor",
            ActorRole::Administrator => "administrator",
        }
    }

    pub fn at_least(&self, other: ActorRole) -> bool {
        *self >= other
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActorRole {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "agent" => Ok(ActorRole::Agent),
            "supervisor" => Ok(ActorRole::Supervisor),
            "administrator" => Ok(ActorRole::Administrator),
            other => Err(DomainError::validation(format!("unknown role: {}", other))),
        }
    }
}

// =========================================================================
// Account kinds
// =========================================================================

/// Holder category of a monetary account. All kinds share the same
/// balance contract; the kind only drives routing checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountKind {
    Bank,
    /// Counter (guichet) that sends or pays out transfers
    Office,
    Employer,
    /// Individual customer account (compte)
    Customer,
    /// Operator commission account
    Operator,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Bank => "bank",
            AccountKind::Office => "office",
            AccountKind::Employer => "employer",
            AccountKind::Customer => "customer",
            AccountKind::Operator => "operator",
        }
    }
}

impl fmt::Display for AccountKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =========================================================================
// Transfer state machine
// =========================================================================

/// Lifecycle state of a transfer.
///
/// ```text
/// initiated ──> in_transit ──> completed
///     │             │
///     └─────────────┴──> cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Initiated,
    InTransit,
    Completed,
    Cancelled,
}

impl TransferState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferState::Initiated => "initiated",
            TransferState::InTransit => "in_transit",
            TransferState::Completed => "completed",
            TransferState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Cancelled)
    }

    /// Whether the state machine has an edge from `self` to `next`.
    pub fn can_transition_to(&self, next: TransferState) -> bool {
        matches!(
            (self, next),
            (TransferState::Initiated, TransferState::InTransit)
                | (TransferState::InTransit, TransferState::Completed)
                | (TransferState::Initiated, TransferState::Cancelled)
                | (TransferState::InTransit, TransferState::Cancelled)
        )
    }
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =========================================================================
// Transfer value objects
// =========================================================================

/// Identity of a sender or beneficiary as captured at the counter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyDetails {
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    /// Identity document number
    pub id_document: String,
}

impl PartyDetails {
    pub fn new(
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        phone: impl Into<String>,
        id_document: impl Into<String>,
    ) -> Self {
        Self {
            first_name: first_name.into(),
            last_name: last_name.into(),
            phone: phone.into(),
            id_document: id_document.into(),
        }
    }

    /// Check required fields and the column limits of the transfer record.
    pub fn validate(&self, role: &str) -> Result<(), DomainError> {
        let fields: [(&str, &str, usize); 4] = [
            ("first_name", self.first_name.as_str(), 50),
            ("last_name", self.last_name.as_str(), 50),
            ("phone", self.phone.as_str(), 20),
            ("id_document", self.id_document.as_str(), 50),
        ];
        for (name, value, max) in fields {
            let value = value.trim();
            if value.is_empty() {
                return Err(DomainError::validation(format!("{} {} is required", role, name)));
            }
            if value.chars().count() > max {
                return Err(DomainError::validation(format!(
                    "{} {} exceeds {} characters",
                    role, name, max
                )));
            }
        }
        Ok(())
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Accounts a transfer moves money between.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRoute {
    /// Debited by the full amount on completion
    pub sender_account_id: Uuid,
    /// Credited with the amount net of commission
    pub beneficiary_account_id: Uuid,
    /// Office that took the transfer; receives the expeditor part
    pub sending_office_id: Uuid,
    /// Office that pays out; receives the payer part
    pub paying_office_id: Uuid,
}

/// Commission charged on a transfer and its split.
///
/// `operator + expeditor + payer == total` always holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommissionBreakdown {
    pub total: Decimal,
    pub operator: Decimal,
    pub expeditor: Decimal,
    pub payer: Decimal,
}

impl CommissionBreakdown {
    pub fn zero() -> Self {
        Self {
            total: Decimal::ZERO,
            operator: Decimal::ZERO,
            expeditor: Decimal::ZERO,
            payer: Decimal::ZERO,
        }
    }
}
