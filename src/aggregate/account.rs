//! Account Aggregate
//!
//! Monetary account shared by banks, offices (guichets), employers,
//! customer accounts and the operator. State is derived from events, never
//! directly mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditRecord, Audited};
use crate::domain::{AccountEvent, AccountKind, Amount, Balance, DomainError};

use super::{require_text, Aggregate};

/// Monetary Account Aggregate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    id: Uuid,

    kind: AccountKind,

    /// External account number (bank, office or employer reference)
    account_number: String,

    holder_name: String,

    /// Informational only; no currency conversion happens in the ledger
    country_code: Option<String>,

    /// Current balance (derived from events)
    balance: Balance,

    audit: AuditRecord,

    /// Current version (number of events applied)
    version: i64,
}

impl Default for Account {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            kind: AccountKind::Customer,
            account_number: String::new(),
            holder_name: String::new(),
            country_code: None,
            balance: Balance::zero(),
            audit: AuditRecord::default(),
            version: 0,
        }
    }
}

impl Account {
    /// Open a new account and generate the opening event
    pub fn open(
        account_id: Uuid,
        kind: AccountKind,
        account_number: &str,
        holder_name: &str,
        country_code: Option<String>,
        opened_by: Uuid,
    ) -> Result<(Self, AccountEvent), DomainError> {
        let account_number = require_text("account_number", account_number, 50)?;
        let holder_name = require_text("holder_name", holder_name, 100)?;
        let country_code = match country_code {
            Some(code) => Some(require_text("country_code", &code, 3)?.to_uppercase()),
            None => None,
        };

        let event = AccountEvent::AccountOpened {
            account_id,
            kind,
            account_number,
            holder_name,
            country_code,
            opened_by,
            opened_at: Utc::now(),
        };

        let account = Self::default().apply(event.clone());
        Ok((account, event))
    }

    /// Debit (withdraw) money from the account
    /// Returns the event to be persisted, or an error if not allowed
    pub fn debit(
        &self,
        amount: &Amount,
        transfer_id: Option<Uuid>,
        description: String,
        debited_by: Uuid,
    ) -> Result<AccountEvent, DomainError> {
        self.ensure_active()?;

        if !self.balance.is_sufficient_for(amount) {
            return Err(DomainError::insufficient_funds(
                self.id,
                amount.value(),
                self.balance.value(),
            ));
        }

        Ok(AccountEvent::MoneyDebited {
            account_id: self.id,
            amount: amount.value(),
            transfer_id,
            description,
            debited_by,
            debited_at: Utc::now(),
        })
    }

    /// Credit (deposit) money to the account
    /// Returns the event to be persisted, or an error if not allowed
    pub fn credit(
        &self,
        amount: &Amount,
        transfer_id: Option<Uuid>,
        description: String,
        credited_by: Uuid,
    ) -> Result<AccountEvent, DomainError> {
        self.ensure_active()?;

        // Reject credits the balance could not hold
        self.balance.credit(amount)?;

        Ok(AccountEvent::MoneyCredited {
            account_id: self.id,
            amount: amount.value(),
            transfer_id,
            description,
            credited_by,
            credited_at: Utc::now(),
        })
    }

    /// Record a transfer initiated from this account
    pub fn register_outgoing(
        &self,
        transfer_id: Uuid,
        amount: &Amount,
        registered_by: Uuid,
    ) -> Result<AccountEvent, DomainError> {
        self.ensure_active()?;

        Ok(AccountEvent::OutgoingTransferRegistered {
            account_id: self.id,
            transfer_id,
            amount: amount.value(),
            registered_by,
            registered_at: Utc::now(),
        })
    }

    /// Soft-delete the account. Only empty accounts can be deleted.
    pub fn delete(&self, deleted_by: Uuid) -> Result<AccountEvent, DomainError> {
        self.ensure_active()?;

        if !self.balance.value().is_zero() {
            return Err(DomainError::validation(format!(
                "account {} still holds {}",
                self.id, self.balance
            )));
        }

        Ok(AccountEvent::AccountDeleted {
            account_id: self.id,
            deleted_by,
            deleted_at: Utc::now(),
        })
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        if self.audit.is_deleted() {
            return Err(DomainError::not_found("Account", self.id));
        }
        Ok(())
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn kind(&self) -> AccountKind {
        self.kind
    }

    pub fn account_number(&self) -> &str {
        &self.account_number
    }

    pub fn holder_name(&self) -> &str {
        &self.holder_name
    }

    pub fn country_code(&self) -> Option<&str> {
        self.country_code.as_deref()
    }

    pub fn balance(&self) -> &Balance {
        &self.balance
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.audit.created_at
    }
}

impl Audited for Account {
    fn audit(&self) -> &AuditRecord {
        &self.audit
    }
}

impl Aggregate for Account {
    type Event = AccountEvent;

    fn aggregate_type() -> &'static str {
        "Account"
    }

    fn id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn apply(mut self, event: Self::Event) -> Self {
        match event {
            AccountEvent::AccountOpened {
                account_id,
                kind,
                account_number,
                holder_name,
                country_code,
                opened_by,
                opened_at,
            } => {
                self.id = account_id;
                self.kind = kind;
                self.account_number = account_number;
                self.holder_name = holder_name;
                self.country_code = country_code;
                self.balance = Balance::zero();
                self.audit = AuditRecord::inserted(opened_by, opened_at);
            }

            AccountEvent::MoneyCredited {
                amount,
                credited_by,
                credited_at,
                ..
            } => {
                match Amount::new(amount).and_then(|amt| self.balance.credit(&amt)) {
                    Ok(new_balance) => self.balance = new_balance,
                    Err(e) => {
                        // Keep current balance to maintain consistency
                        tracing::error!(
                            "Invalid credit during replay for account {}: {}",
                            self.id,
                            e
                        );
                    }
                }
                self.audit.touch(credited_by, credited_at);
            }

            AccountEvent::MoneyDebited {
                amount,
                debited_by,
                debited_at,
                ..
            } => {
                match Amount::new(amount).and_then(|amt| self.balance.debit(&amt)) {
                    Ok(new_balance) => self.balance = new_balance,
                    Err(e) => {
                        tracing::error!(
                            "Invalid debit during replay for account {}: {}",
                            self.id,
                            e
                        );
                    }
                }
                self.audit.touch(debited_by, debited_at);
            }

            AccountEvent::OutgoingTransferRegistered { .. } => {}

            AccountEvent::AccountDeleted {
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
