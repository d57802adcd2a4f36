//! Transfer Aggregate
//!
//! A money transfer from a sender to a beneficiary. The aggregate owns the
//! state machine; balance movements live on the account aggregates and are
//! committed together with the `TransferCompleted` event.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{sha256_hex, AuditRecord, Audited};
use crate::domain::{
    Amount, CommissionBreakdown, DomainError, PartyDetails, TransferEvent, TransferRoute,
    TransferState,
};

use super::Aggregate;

/// Everything needed to register a new transfer
#[derive(Debug, Clone)]
pub struct TransferDraft {
    pub transfer_id: Uuid,
    pub operation_number: String,
    pub operation_code_hash: String,
    pub sender: PartyDetails,
    pub beneficiary: PartyDetails,
    pub route: TransferRoute,
    pub amount: Amount,
    pub commission: CommissionBreakdown,
    pub motif_id: Uuid,
    pub promotion_id: Option<Uuid>,
}

/// Transfer Aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    id: Uuid,
    operation_number: String,
    operation_code_hash: String,
    sender: PartyDetails,
    beneficiary: PartyDetails,
    route: TransferRoute,
    amount: Decimal,
    commission: CommissionBreakdown,
    motif_id: Uuid,
    promotion_id: Option<Uuid>,
    state: TransferState,
    send_date: Option<DateTime<Utc>>,
    dispatch_date: Option<DateTime<Utc>>,
    reception_date: Option<DateTime<Utc>>,
    cancel_date: Option<DateTime<Utc>>,
    cancel_reason: Option<String>,
    audit: AuditRecord,
    version: i64,
}

impl Default for Transfer {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            operation_number: String::new(),
            operation_code_hash: String::new(),
            sender: PartyDetails::default(),
            beneficiary: PartyDetails::default(),
            route: TransferRoute::default(),
            amount: Decimal::ZERO,
            commission: CommissionBreakdown::zero(),
            motif_id: Uuid::nil(),
            promotion_id: None,
            state: TransferState::Initiated,
            send_date: None,
            dispatch_date: None,
            reception_date: None,
            cancel_date: None,
            cancel_reason: None,
            audit: AuditRecord::default(),
            version: 0,
        }
    }
}

impl Transfer {
    /// Register a new transfer in state `initiated`
    pub fn initiate(
        draft: TransferDraft,
        initiated_by: Uuid,
    ) -> Result<(Self, TransferEvent), DomainError> {
        draft.sender.validate("sender")?;
        draft.beneficiary.validate("beneficiary")?;

        let commission = draft.commission;
        if commission.operator + commission.expeditor + commission.payer != commission.total {
            return Err(DomainError::validation("commission parts do not add up"));
        }
        if commission.total < Decimal::ZERO || commission.total >= draft.amount.value() {
            return Err(DomainError::validation(format!(
                "commission {} must be below the amount {}",
                commission.total, draft.amount
            )));
        }

        let event = TransferEvent::TransferInitiated {
            transfer_id: draft.transfer_id,
            operation_number: draft.operation_number,
            operation_code_hash: draft.operation_code_hash,
            sender: draft.sender,
            beneficiary: draft.beneficiary,
            route: draft.route,
            amount: draft.amount.value(),
            commission,
            motif_id: draft.motif_id,
            promotion_id: draft.promotion_id,
            initiated_by,
            initiated_at: Utc::now(),
        };

        let transfer = Self::default().apply(event.clone());
        Ok((transfer, event))
    }

    /// `initiated → in_transit`
    pub fn dispatch(&self, dispatched_by: Uuid) -> Result<TransferEvent, DomainError> {
        self.ensure_transition(TransferState::InTransit, "dispatch")?;
        Ok(TransferEvent::TransferDispatched {
            transfer_id: self.id,
            dispatched_by,
            dispatched_at: Utc::now(),
        })
    }

    /// `in_transit → completed`
    pub fn complete(&self, completed_by: Uuid) -> Result<TransferEvent, DomainError> {
        self.ensure_transition(TransferState::Completed, "complete")?;
        Ok(TransferEvent::TransferCompleted {
            transfer_id: self.id,
            completed_by,
            completed_at: Utc::now(),
        })
    }

    /// `initiated | in_transit → cancelled`
    pub fn cancel(&self, reason: &str, cancelled_by: Uuid) -> Result<TransferEvent, DomainError> {
        self.ensure_transition(TransferState::Cancelled, "cancel")?;
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(DomainError::validation("cancellation reason is required"));
        }
        Ok(TransferEvent::TransferCancelled {
            transfer_id: self.id,
            reason: reason.to_string(),
            cancelled_by,
            cancelled_at: Utc::now(),
        })
    }

    fn ensure_transition(&self, next: TransferState, action: &'static str) -> Result<(), DomainError> {
        if !self.state.can_transition_to(next) {
            return Err(DomainError::InvalidTransition {
                transfer_id: self.id,
                state: self.state,
                action,
            });
        }
        Ok(())
    }

    /// Check a presented operation code against the stored hash
    pub fn verify_code(&self, code: &str) -> bool {
        !self.operation_code_hash.is_empty() && sha256_hex(code.trim()) == self.operation_code_hash
    }

    /// When the operation code stops being valid; `None` if never sent or
    /// the validity runs past the representable range
    pub fn code_expires_at(&self, validity: Duration) -> Option<DateTime<Utc>> {
        self.send_date.and_then(|sent| sent.checked_add_signed(validity))
    }

    pub fn is_code_expired(&self, validity: Duration, now: DateTime<Utc>) -> bool {
        self.code_expires_at(validity)
            .map(|expires| now > expires)
            .unwrap_or(false)
    }

    /// Amount credited to the beneficiary on completion
    pub fn net_amount(&self) -> Decimal {
        self.amount - self.commission.total
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn operation_number(&self) -> &str {
        &self.operation_number
    }

    pub fn sender(&self) -> &PartyDetails {
        &self.sender
    }

    pub fn beneficiary(&self) -> &PartyDetails {
        &self.beneficiary
    }

    pub fn route(&self) -> &TransferRoute {
        &self.route
    }

    pub fn amount(&self) -> Decimal {
        self.amount
    }

    pub fn commission(&self) -> &CommissionBreakdown {
        &self.commission
    }

    pub fn motif_id(&self) -> Uuid {
        self.motif_id
    }

    pub fn promotion_id(&self) -> Option<Uuid> {
        self.promotion_id
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn send_date(&self) -> Option<DateTime<Utc>> {
        self.send_date
    }

    pub fn dispatch_date(&self) -> Option<DateTime<Utc>> {
        self.dispatch_date
    }

    pub fn reception_date(&self) -> Option<DateTime<Utc>> {
        self.reception_date
    }

    pub fn cancel_date(&self) -> Option<DateTime<Utc>> {
        self.cancel_date
    }

    pub fn cancel_reason(&self) -> Option<&str> {
        self.cancel_reason.as_deref()
    }
}

impl Audited for Transfer {
    fn audit(&self) -> &AuditRecord {
        &self.audit
    }
}

impl Aggregate for Transfer {
    type Event = TransferEvent;

    fn aggregate_type() -> &'static str {
        "Transfer"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(mut self, event: Self::Event) -> Self {
        match event {
            TransferEvent::TransferInitiated {
                transfer_id,
                operation_number,
                operation_code_hash,
                sender,
                beneficiary,
                route,
                amount,
                commission,
                motif_id,
                promotion_id,
                initiated_by,
                initiated_at,
            } => {
                self.id = transfer_id;
                self.operation_number = operation_number;
                self.operation_code_hash = operation_code_hash;
                self.sender = sender;
                self.beneficiary = beneficiary;
                self.route = route;
                self.amount = amount;
                self.commission = commission;
                self.motif_id = motif_id;
                self.promotion_id = promotion_id;
                self.state = TransferState::Initiated;
                self.send_date = Some(initiated_at);
                self.audit = AuditRecord::inserted(initiated_by, initiated_at);
            }

            TransferEvent::TransferDispatched {
                dispatched_by,
                dispatched_at,
                ..
            } => {
                self.state = TransferState::InTransit;
                self.dispatch_date = Some(dispatched_at);
                self.audit.touch(dispatched_by, dispatched_at);
            }

            TransferEvent::TransferCompleted {
                completed_by,
                completed_at,
                ..
            } => {
                self.state = TransferState::Completed;
                self.reception_date = Some(completed_at);
                self.audit.touch(completed_by, completed_at);
            }

            TransferEvent::TransferCancelled {
                reason,
                cancelled_by,
                cancelled_at,
                ..
            } => {
                self.state = TransferState::Cancelled;
                self.cancel_date = Some(cancelled_at);
                self.cancel_reason = Some(reason);
                self.audit.touch(cancelled_by, cancelled_at);
            }
        }

        self.version += 1;
        self
    }
}
