//! Account Handler
//!
//! Administrative operations on monetary accounts: open, fund and
//! soft-delete. Transfers move money through the transfer engine only.

use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::{Account, Aggregate};
use crate::audit::{AuditAction, JournalEntry};
use crate::domain::{ActorRole, Amount, DomainError, OperationContext};
use crate::error::AppResult;
use crate::event_store::{load_active, retry_on_conflict, AccountLocks, AggregateOperation, EventStore};

use super::{write_journal, DepositCommand, OpenAccountCommand};

pub struct AccountHandler {
    store: Arc<dyn EventStore>,
    locks: Arc<AccountLocks>,
    operator_account_id: Uuid,
}

impl AccountHandler {
    pub fn new(store: Arc<dyn EventStore>, locks: Arc<AccountLocks>, operator_account_id: Uuid) -> Self {
        Self {
            store,
            locks,
            operator_account_id,
        }
    }

    /// Open a new account with a zero balance
    pub async fn open(&self, command: OpenAccountCommand, context: &OperationContext) -> AppResult<Account> {
        let actor = context.require_role(ActorRole::Administrator)?;

        let (account, event) = Account::open(
            Uuid::new_v4(),
            command.kind,
            &command.account_number,
            &command.holder_name,
            command.country_code,
            actor.id,
        )?;

        let operations = vec![AggregateOperation::new(
            Account::aggregate_type(),
            account.id(),
            0,
            event.event_type(),
            &event,
        )?];
        self.store.append_atomic(operations, None, context).await?;

        tracing::info!(
            account_id = %account.id(),
            kind = %account.kind(),
            account_number = %account.account_number(),
            "Account opened"
        );

        write_journal(
            self.store.as_ref(),
            JournalEntry::new(
                AuditAction::AccountOpened,
                format!("{} account {} opened", account.kind(), account.account_number()),
            )
            .resource(Account::aggregate_type(), account.id())
            .context(context),
        )
        .await;

        Ok(account)
    }

    /// Administrative funding of an account
    pub async fn deposit(
        &self,
        account_id: Uuid,
        command: DepositCommand,
        context: &OperationContext,
    ) -> AppResult<Account> {
        let actor = context.require_role(ActorRole::Administrator)?.clone();

        let amount: Amount = command
            .amount
            .parse()
            .map_err(|e| DomainError::validation(format!("Invalid amount: {}", e)))?;
        let description = command.description.unwrap_or_else(|| "Deposit".to_string());

        retry_on_conflict("deposit", || async {
            let _locks = self.locks.acquire(&[account_id]).await?;
            let account = self.load(account_id).await?;
            let event = account.credit(&amount, None, description.clone(), actor.id)?;

            let operations = vec![AggregateOperation::new(
                Account::aggregate_type(),
                account_id,
                account.version(),
                event.event_type(),
                &event,
            )?];
            self.store.append_atomic(operations, None, context).await?;

            let account = account.apply(event);
            tracing::info!(
                account_id = %account_id,
                amount = %amount,
                balance = %account.balance(),
                "Account funded"
            );

            write_journal(
                self.store.as_ref(),
                JournalEntry::new(
                    AuditAction::AccountFunded,
                    format!("{} deposited on {}", amount, account.account_number()),
                )
                .resource(Account::aggregate_type(), account_id)
                .context(context),
            )
            .await;

            AppResult::Ok(account)
        })
        .await
    }

    /// Soft-delete an empty account
    pub async fn delete(&self, account_id: Uuid, context: &OperationContext) -> AppResult<Account> {
        let actor = context.require_role(ActorRole::Administrator)?.clone();

        if account_id == self.operator_account_id {
            return Err(DomainError::validation("the operator account cannot be deleted").into());
        }

        retry_on_conflict("delete_account", || async {
            let _locks = self.locks.acquire(&[account_id]).await?;
            let account = self.load(account_id).await?;
            let event = account.delete(actor.id)?;

            let operations = vec![AggregateOperation::new(
                Account::aggregate_type(),
                account_id,
                account.version(),
                event.event_type(),
                &event,
            )?];
            self.store.append_atomic(operations, None, context).await?;

            tracing::info!(account_id = %account_id, "Account deleted");

            write_journal(
                self.store.as_ref(),
                JournalEntry::new(
                    AuditAction::AccountDeleted,
                    format!("account {} deleted", account.account_number()),
                )
                .resource(Account::aggregate_type(), account_id)
                .context(context),
            )
            .await;

            AppResult::Ok(account.apply(event))
        })
        .await
    }

    pub async fn get(&self, account_id: Uuid) -> AppResult<Account> {
        self.load(account_id).await
    }

    async fn load(&self, account_id: Uuid) -> AppResult<Account> {
        load_active::<Account>(self.store.as_ref(), account_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Account", account_id).into())
    }
}
