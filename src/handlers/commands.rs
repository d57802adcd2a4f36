//! Command definitions
//!
//! Commands represent intentions to change the ledger state. Amounts travel
//! as strings so no precision is lost before they are parsed into
//! [`Amount`](crate::domain::Amount).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::Transfer;
use crate::domain::{AccountKind, CommissionBreakdown, PartyDetails, TransferRoute, TransferState};

// =========================================================================
// Transfers
// =========================================================================

/// Command to register a new transfer at a sending office
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitiateTransferCommand {
    pub sender: PartyDetails,
    pub beneficiary: PartyDetails,
    pub route: TransferRoute,
    /// Amount to transfer (as string for precise decimal)
    pub amount: String,
    pub motif_id: Uuid,
    #[serde(default)]
    pub promotion_id: Option<Uuid>,
    /// Request the threshold to be waived; honoured for supervisors only
    #[serde(default)]
    pub elevated_approval: bool,
}

impl InitiateTransferCommand {
    pub fn new(
        sender: PartyDetails,
        beneficiary: PartyDetails,
        route: TransferRoute,
        amount: impl Into<String>,
        motif_id: Uuid,
    ) -> Self {
        Self {
            sender,
            beneficiary,
            route,
            amount: amount.into(),
            motif_id,
            promotion_id: None,
            elevated_approval: false,
        }
    }

    pub fn with_promotion(mut self, promotion_id: Uuid) -> Self {
        self.promotion_id = Some(promotion_id);
        self
    }

    pub fn with_elevated_approval(mut self) -> Self {
        self.elevated_approval = true;
        self
    }
}

/// Result of a transfer initiation.
///
/// The plaintext operation code is only returned the first time; an
/// idempotent replay returns `None`.
#[derive(Debug, Clone)]
pub struct TransferReceipt {
    pub transfer: Transfer,
    pub operation_code: Option<String>,
}

/// Public view of a transfer (the code hash is never exposed)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferView {
    pub transfer_id: Uuid,
    pub operation_number: String,
    pub sender: PartyDetails,
    pub beneficiary: PartyDetails,
    pub route: TransferRoute,
    pub amount: Decimal,
    pub commission: CommissionBreakdown,
    pub net_amount: Decimal,
    pub motif_id: Uuid,
    pub promotion_id: Option<Uuid>,
    pub state: TransferState,
    pub send_date: Option<DateTime<Utc>>,
    pub reception_date: Option<DateTime<Utc>>,
    pub cancel_date: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub created_by: Uuid,
    pub modified_by: Uuid,
    pub version: i64,
}

impl From<&Transfer> for TransferView {
    fn from(transfer: &Transfer) -> Self {
        use crate::aggregate::Aggregate;
        use crate::audit::Audited;

        Self {
            transfer_id: transfer.id(),
            operation_number: transfer.operation_number().to_string(),
            sender: transfer.sender().clone(),
            beneficiary: transfer.beneficiary().clone(),
            route: *transfer.route(),
            amount: transfer.amount(),
            commission: *transfer.commission(),
            net_amount: transfer.net_amount(),
            motif_id: transfer.motif_id(),
            promotion_id: transfer.promotion_id(),
            state: transfer.state(),
            send_date: transfer.send_date(),
            reception_date: transfer.reception_date(),
            cancel_date: transfer.cancel_date(),
            cancel_reason: transfer.cancel_reason().map(str::to_string),
            created_by: transfer.audit().created_by,
            modified_by: transfer.audit().modified_by,
            version: transfer.version(),
        }
    }
}

// =========================================================================
// Accounts
// =========================================================================

/// Command to open a monetary account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAccountCommand {
    pub kind: AccountKind,
    pub account_number: String,
    pub holder_name: String,
    #[serde(default)]
    pub country_code: Option<String>,
}

impl OpenAccountCommand {
    pub fn new(kind: AccountKind, account_number: impl Into<String>, holder_name: impl Into<String>) -> Self {
        Self {
            kind,
            account_number: account_number.into(),
            holder_name: holder_name.into(),
            country_code: None,
        }
    }

    pub fn with_country_code(mut self, country_code: impl Into<String>) -> Self {
        self.country_code = Some(country_code.into());
        self
    }
}

/// Command to fund an account administratively
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DepositCommand {
    /// Amount to deposit (as string for precise decimal)
    pub amount: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl DepositCommand {
    pub fn new(amount: impl Into<String>) -> Self {
        Self {
            amount: amount.into(),
            description: None,
        }
    }
}

// =========================================================================
// Reference data
// =========================================================================

/// Create or relabel a motif
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MotifCommand {
    pub label: String,
}

/// Cancellation request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelTransferCommand {
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initiate_command_builders() {
        let motif_id = Uuid::new_v4();
        let promotion_id = Uuid::new_v4();
        let cmd = InitiateTransferCommand::new(
            PartyDetails::new("Awa", "Diallo", "+221770000001", "CNI-1"),
            PartyDetails::new("Moussa", "Ndiaye", "+221770000002", "CNI-2"),
            TransferRoute::default(),
            "200.00",
            motif_id,
        )
        .with_promotion(promotion_id)
        .with_elevated_approval();

        assert_eq!(cmd.amount, "200.00");
        assert_eq!(cmd.promotion_id, Some(promotion_id));
        assert!(cmd.elevated_approval);
    }

    #[test]
    fn test_initiate_command_defaults_from_json() {
        let json = serde_json::json!({
            "sender": PartyDetails::new("Awa", "Diallo", "1", "A"),
            "beneficiary": PartyDetails::new("Moussa", "Ndiaye", "2", "B"),
            "route": TransferRoute::default(),
            "amount": "10.00",
            "motif_id": Uuid::new_v4(),
        });

        let cmd: InitiateTransferCommand = serde_json::from_value(json).unwrap();
        assert!(cmd.promotion_id.is_none());
        assert!(!cmd.elevated_approval);
    }

    #[test]
    fn test_open_account_command() {
        let cmd = OpenAccountCommand::new(AccountKind::Office, "GUI-1", "Guichet").with_country_code("SN");
        assert_eq!(cmd.country_code.as_deref(), Some("SN"));
    }
}
