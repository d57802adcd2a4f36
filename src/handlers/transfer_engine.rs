//! Transfer Engine
//!
//! Drives the transfer state machine. Every transition loads the affected
//! aggregates under per-id locks, derives the events, and commits them in
//! one atomic append. A failure at any step leaves the ledger untouched.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::{Account, Aggregate, Motif, Promotion, Transfer, TransferDraft};
use crate::audit::{sha256_hex, AuditAction, JournalEntry};
use crate::domain::{
    AccountKind, Actor, ActorRole, Amount, DomainError, OperationContext, TransferRoute,
    TransferState,
};
use crate::error::{AppError, AppResult};
use crate::event_store::{
    load_active, load_aggregate, retry_on_conflict, AccountLocks, AggregateOperation, EventStore,
    EventStoreError,
};
use crate::policy::{compute_commission, Policy};

use super::{write_journal, InitiateTransferCommand, TransferReceipt};

/// Reason recorded when the expiry job cancels a transfer
pub const CODE_EXPIRED_REASON: &str = "operation code expired";

/// Transfer lifecycle orchestration
pub struct TransferEngine {
    store: Arc<dyn EventStore>,
    policy: Arc<Policy>,
    locks: Arc<AccountLocks>,
}

impl TransferEngine {
    pub fn new(store: Arc<dyn EventStore>, policy: Arc<Policy>, locks: Arc<AccountLocks>) -> Self {
        Self {
            store,
            policy,
            locks,
        }
    }

    // =========================================================================
    // initiate
    // =========================================================================

    /// Register a transfer in state `initiated`
    pub async fn initiate(
        &self,
        command: InitiateTransferCommand,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> AppResult<TransferReceipt> {
        let actor = context.require_actor()?.clone();

        let amount: Amount = command
            .amount
            .parse()
            .map_err(|e| DomainError::validation(format!("Invalid amount: {}", e)))?;

        retry_on_conflict("initiate_transfer", || {
            self.try_initiate(&command, amount, idempotency_key, &actor, context)
        })
        .await
    }

    async fn try_initiate(
        &self,
        command: &InitiateTransferCommand,
        amount: Amount,
        idempotency_key: Option<Uuid>,
        actor: &Actor,
        context: &OperationContext,
    ) -> AppResult<TransferReceipt> {
        let route = command.route;
        let _locks = self.locks.acquire(&[route.sender_account_id]).await?;

        if let Some(key) = idempotency_key {
            if let Some(receipt) = self.replay(key).await? {
                return Ok(receipt);
            }
        }

        let now = Utc::now();

        let motif = load_active::<Motif>(self.store.as_ref(), command.motif_id)
            .await?
            .ok_or_else(|| DomainError::validation(format!("unknown motif {}", command.motif_id)))?;

        let promotion = match command.promotion_id {
            Some(promotion_id) => {
                let promotion = load_active::<Promotion>(self.store.as_ref(), promotion_id)
                    .await?
                    .ok_or_else(|| DomainError::validation(format!("unknown promotion {}", promotion_id)))?;
                if !promotion.is_applicable_on(now.date_naive()) {
                    return Err(DomainError::validation(format!(
                        "promotion {} is not applicable on {}",
                        promotion_id,
                        now.date_naive()
                    ))
                    .into());
                }
                Some(promotion)
            }
            None => None,
        };

        // Sender version must be read before the cumulative
        let sender_account = self.validate_route(&route).await?;

        let today_cumulative = self.today_cumulative(route.sender_account_id, now).await?;

        let elevated = command.elevated_approval && actor.role.at_least(ActorRole::Supervisor);
        if command.elevated_approval && !elevated {
            tracing::warn!(
                actor_id = %actor.id,
                role = %actor.role,
                "Elevated approval requested without supervisor role, applying regular policy"
            );
        }
        let decision = if elevated {
            self.policy.check_elevated(route.sender_account_id, amount.value())
        } else {
            self.policy
                .check(route.sender_account_id, amount.value(), today_cumulative)
        };
        decision.into_result()?;

        let commission = compute_commission(
            &self.policy,
            &amount,
            promotion.as_ref().map(|p| p.percentage()),
        );

        let (operation_code, operation_number) = generate_operation_identifiers(now);

        let (transfer, event) = Transfer::initiate(
            TransferDraft {
                transfer_id: Uuid::new_v4(),
                operation_number,
                operation_code_hash: sha256_hex(&operation_code),
                sender: command.sender.clone(),
                beneficiary: command.beneficiary.clone(),
                route,
                amount,
                commission,
                motif_id: motif.id(),
                promotion_id: promotion.as_ref().map(|p| p.id()),
            },
            actor.id,
        )?;

        let outgoing = sender_account.register_outgoing(transfer.id(), &amount, actor.id)?;

        let operations = vec![
            AggregateOperation::new(
                Transfer::aggregate_type(),
                transfer.id(),
                0,
                event.event_type(),
                &event,
            )?,
            AggregateOperation::new(
                Account::aggregate_type(),
                sender_account.id(),
                sender_account.version(),
                outgoing.event_type(),
                &outgoing,
            )?,
        ];

        match self
            .store
            .append_atomic(operations, idempotency_key, context)
            .await
        {
            Ok(_) => {}
            Err(EventStoreError::IdempotencyKeyExists(key)) => {
                // Same key raced through another sender's lock
                return self
                    .replay(key)
                    .await?
                    .ok_or_else(|| AppError::Store(EventStoreError::IdempotencyKeyExists(key)));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            transfer_id = %transfer.id(),
            operation_number = %transfer.operation_number(),
            amount = %transfer.amount(),
            commission = %transfer.commission().total,
            actor_id = %actor.id,
            elevated,
            "Transfer initiated"
        );

        write_journal(
            self.store.as_ref(),
            JournalEntry::new(
                AuditAction::TransferInitiated,
                format!(
                    "Transfer {} of {} initiated",
                    transfer.operation_number(),
                    amount
                ),
            )
            .resource(Transfer::aggregate_type(), transfer.id())
            .context(context),
        )
        .await;

        Ok(TransferReceipt {
            transfer,
            operation_code: Some(operation_code),
        })
    }

    /// Existing transfer for an idempotency key, without the plaintext code
    async fn replay(&self, key: Uuid) -> AppResult<Option<TransferReceipt>> {
        let Some(aggregate_id) = self.store.find_by_idempotency_key(key).await? else {
            return Ok(None);
        };

        let transfer = load_aggregate::<Transfer>(self.store.as_ref(), aggregate_id)
            .await?
            .ok_or_else(|| {
                DomainError::validation(format!("idempotency key {} belongs to another operation", key))
            })?;

        tracing::info!(transfer_id = %transfer.id(), idempotency_key = %key, "Idempotent replay");

        Ok(Some(TransferReceipt {
            transfer,
            operation_code: None,
        }))
    }

    /// Every referenced account must exist; the sender account must be
    /// distinct from all credited accounts and both offices must be offices.
    /// Check the route and return the sender account
    async fn validate_route(&self, route: &TransferRoute) -> AppResult<Account> {
        let credited = [
            route.beneficiary_account_id,
            route.sending_office_id,
            route.paying_office_id,
            self.policy.operator_account_id,
        ];
        if credited.contains(&route.sender_account_id) {
            return Err(DomainError::validation(
                "sender account must differ from beneficiary, office and operator accounts",
            )
            .into());
        }

        let sender = self.require_account(route.sender_account_id, "sender account").await?;
        self.require_account(route.beneficiary_account_id, "beneficiary account").await?;
        for (office_id, role) in [
            (route.sending_office_id, "sending office"),
            (route.paying_office_id, "paying office"),
        ] {
            let office = self.require_account(office_id, role).await?;
            if office.kind() != AccountKind::Office {
                return Err(DomainError::validation(format!(
                    "{} {} is a {} account",
                    role,
                    office_id,
                    office.kind()
                ))
                .into());
            }
        }
        self.require_account(self.policy.operator_account_id, "operator account").await?;
        Ok(sender)
    }

    async fn require_account(&self, account_id: Uuid, role: &str) -> AppResult<Account> {
        load_active::<Account>(self.store.as_ref(), account_id)
            .await?
            .ok_or_else(|| DomainError::validation(format!("unknown {} {}", role, account_id)).into())
    }

    /// Volume of the sender's non-cancelled transfers since 00:00 UTC
    async fn today_cumulative(&self, sender_account_id: Uuid, now: DateTime<Utc>) -> AppResult<Decimal> {
        let start = Utc.from_utc_datetime(&now.date_naive().and_time(NaiveTime::MIN));
        let end = start + Duration::days(1);

        let mut total = Decimal::ZERO;
        for transfer_id in self
            .store
            .transfers_by_sender(sender_account_id, start, end)
            .await?
        {
            if let Some(transfer) = load_aggregate::<Transfer>(self.store.as_ref(), transfer_id).await? {
                if transfer.state() != TransferState::Cancelled {
                    total += transfer.amount();
                }
            }
        }
        Ok(total)
    }

    // =========================================================================
    // dispatch
    // =========================================================================

    /// `initiated → in_transit`
    pub async fn dispatch(&self, transfer_id: Uuid, context: &OperationContext) -> AppResult<Transfer> {
        let actor = context.require_actor()?.clone();

        retry_on_conflict("dispatch_transfer", || self.try_dispatch(transfer_id, &actor, context)).await
    }

    async fn try_dispatch(
        &self,
        transfer_id: Uuid,
        actor: &Actor,
        context: &OperationContext,
    ) -> AppResult<Transfer> {
        let _locks = self.locks.acquire(&[transfer_id]).await?;
        let transfer = self.load_transfer(transfer_id).await?;
        let event = transfer.dispatch(actor.id)?;

        let operations = vec![AggregateOperation::new(
            Transfer::aggregate_type(),
            transfer_id,
            transfer.version(),
            event.event_type(),
            &event,
        )?];
        self.store.append_atomic(operations, None, context).await?;

        let transfer = transfer.apply(event);
        tracing::info!(transfer_id = %transfer_id, actor_id = %actor.id, "Transfer dispatched");

        write_journal(
            self.store.as_ref(),
            JournalEntry::new(
                AuditAction::TransferDispatched,
                format!("Transfer {} dispatched", transfer.operation_number()),
            )
            .resource(Transfer::aggregate_type(), transfer_id)
            .context(context),
        )
        .await;

        Ok(transfer)
    }

    // =========================================================================
    // complete
    // =========================================================================

    /// `in_transit → completed`, moving all balances in the same commit
    pub async fn complete(&self, transfer_id: Uuid, context: &OperationContext) -> AppResult<Transfer> {
        let actor = context.require_actor()?.clone();

        retry_on_conflict("complete_transfer", || self.try_complete(transfer_id, &actor, context)).await
    }

    async fn try_complete(
        &self,
        transfer_id: Uuid,
        actor: &Actor,
        context: &OperationContext,
    ) -> AppResult<Transfer> {
        // Route is immutable, so it can be read before locking
        let route = *self.load_transfer(transfer_id).await?.route();
        let operator_account_id = self.policy.operator_account_id;

        let _locks = self
            .locks
            .acquire(&[
                transfer_id,
                route.sender_account_id,
                route.beneficiary_account_id,
                route.sending_office_id,
                route.paying_office_id,
                operator_account_id,
            ])
            .await?;

        let transfer = self.load_transfer(transfer_id).await?;
        let event = transfer.complete(actor.id)?;

        if transfer.is_code_expired(self.policy.code_validity(), Utc::now()) {
            return Err(DomainError::validation(format!(
                "operation code of transfer {} has expired",
                transfer.operation_number()
            ))
            .into());
        }

        let description = format!("Transfer {}", transfer.operation_number());
        let commission = *transfer.commission();

        let sender = self.load_account(route.sender_account_id).await?;
        let debit = sender.debit(
            &Amount::new(transfer.amount()).map_err(DomainError::from)?,
            Some(transfer_id),
            description.clone(),
            actor.id,
        )?;

        let mut operations = vec![
            AggregateOperation::new(
                Transfer::aggregate_type(),
                transfer_id,
                transfer.version(),
                event.event_type(),
                &event,
            )?,
            AggregateOperation::new(
                Account::aggregate_type(),
                sender.id(),
                sender.version(),
                debit.event_type(),
                &debit,
            )?,
        ];

        let credits = merge_credits(&[
            (route.beneficiary_account_id, transfer.net_amount()),
            (operator_account_id, commission.operator),
            (route.sending_office_id, commission.expeditor),
            (route.paying_office_id, commission.payer),
        ]);

        for (account_id, value) in credits {
            let account = self.load_account(account_id).await?;
            let credit = account.credit(
                &Amount::new(value).map_err(DomainError::from)?,
                Some(transfer_id),
                description.clone(),
                actor.id,
            )?;
            operations.push(AggregateOperation::new(
                Account::aggregate_type(),
                account_id,
                account.version(),
                credit.event_type(),
                &credit,
            )?);
        }

        self.store.append_atomic(operations, None, context).await?;

        let transfer = transfer.apply(event);

        tracing::info!(
            transfer_id = %transfer_id,
            amount = %transfer.amount(),
            net_amount = %transfer.net_amount(),
            commission = %commission.total,
            actor_id = %actor.id,
            "Transfer completed"
        );

        write_journal(
            self.store.as_ref(),
            JournalEntry::new(
                AuditAction::TransferCompleted,
                format!(
                    "Transfer {} completed: {} paid out, {} commission",
                    transfer.operation_number(),
                    transfer.net_amount(),
                    commission.total
                ),
            )
            .resource(Transfer::aggregate_type(), transfer_id)
            .context(context),
        )
        .await;

        Ok(transfer)
    }

    // =========================================================================
    // cancel
    // =========================================================================

    /// `initiated | in_transit → cancelled`.
    ///
    /// Balances only move on completion, so there is nothing to reverse.
    pub async fn cancel(
        &self,
        transfer_id: Uuid,
        reason: &str,
        context: &OperationContext,
    ) -> AppResult<Transfer> {
        let actor = context.require_actor()?.clone();

        retry_on_conflict("cancel_transfer", || {
            self.try_cancel(transfer_id, reason, &actor, context)
        })
        .await
    }

    async fn try_cancel(
        &self,
        transfer_id: Uuid,
        reason: &str,
        actor: &Actor,
        context: &OperationContext,
    ) -> AppResult<Transfer> {
        let _locks = self.locks.acquire(&[transfer_id]).await?;
        let transfer = self.load_transfer(transfer_id).await?;
        let event = transfer.cancel(reason, actor.id)?;

        let operations = vec![AggregateOperation::new(
            Transfer::aggregate_type(),
            transfer_id,
            transfer.version(),
            event.event_type(),
            &event,
        )?];
        self.store.append_atomic(operations, None, context).await?;

        let transfer = transfer.apply(event);
        tracing::info!(
            transfer_id = %transfer_id,
            reason = %reason,
            actor_id = %actor.id,
            "Transfer cancelled"
        );

        write_journal(
            self.store.as_ref(),
            JournalEntry::new(
                AuditAction::TransferCancelled,
                format!("Transfer {} cancelled: {}", transfer.operation_number(), reason),
            )
            .resource(Transfer::aggregate_type(), transfer_id)
            .context(context),
        )
        .await;

        Ok(transfer)
    }

    /// Cancel every open transfer whose operation code has expired
    pub async fn cancel_expired(&self, now: DateTime<Utc>, context: &OperationContext) -> AppResult<Vec<Uuid>> {
        let validity = self.policy.code_validity();
        let mut cancelled = Vec::new();

        for transfer_id in self.store.open_transfers().await? {
            let Some(transfer) = load_aggregate::<Transfer>(self.store.as_ref(), transfer_id).await? else {
                continue;
            };
            if transfer.state().is_terminal() || !transfer.is_code_expired(validity, now) {
                continue;
            }

            match self.cancel(transfer_id, CODE_EXPIRED_REASON, context).await {
                Ok(_) => cancelled.push(transfer_id),
                // Completed or cancelled in the meantime
                Err(AppError::Domain(DomainError::InvalidTransition { .. })) => {}
                Err(e) => return Err(e),
            }
        }

        Ok(cancelled)
    }

    // =========================================================================
    // queries
    // =========================================================================

    /// Check the code presented at the paying office
    pub async fn verify_operation_code(&self, transfer_id: Uuid, code: &str) -> AppResult<bool> {
        let transfer = self.load_transfer(transfer_id).await?;
        let valid = transfer.verify_code(code);
        if !valid {
            tracing::warn!(transfer_id = %transfer_id, "Operation code mismatch");
        }
        Ok(valid)
    }

    pub async fn get(&self, transfer_id: Uuid) -> AppResult<Transfer> {
        self.load_transfer(transfer_id).await
    }

    async fn load_transfer(&self, transfer_id: Uuid) -> AppResult<Transfer> {
        load_aggregate::<Transfer>(self.store.as_ref(), transfer_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Transfer", transfer_id).into())
    }

    async fn load_account(&self, account_id: Uuid) -> AppResult<Account> {
        load_active::<Account>(self.store.as_ref(), account_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Account", account_id).into())
    }
}

/// Merge credits per account and drop zero amounts, keeping first-seen order
fn merge_credits(credits: &[(Uuid, Decimal)]) -> Vec<(Uuid, Decimal)> {
    let mut merged: Vec<(Uuid, Decimal)> = Vec::with_capacity(credits.len());
    for &(account_id, value) in credits {
        if value <= Decimal::ZERO {
            continue;
        }
        match merged.iter_mut().find(|(id, _)| *id == account_id) {
            Some((_, total)) => *total += value,
            None => merged.push((account_id, value)),
        }
    }
    merged
}

/// Secret 8-digit code and `TRF-YYYYMMDD-NNNNNN` number
fn generate_operation_identifiers(now: DateTime<Utc>) -> (String, String) {
    let mut rng = rand::thread_rng();
    let code = format!("{:08}", rng.gen_range(0..100_000_000u32));
    let number = format!(
        "TRF-{}-{:06}",
        now.format("%Y%m%d"),
        rng.gen_range(0..1_000_000u32)
    );
    (code, number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_merge_credits() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let merged = merge_credits(&[(a, dec!(190)), (b, dec!(5)), (a, dec!(2.5)), (b, dec!(0))]);
        assert_eq!(merged, vec![(a, dec!(192.5)), (b, dec!(5))]);
    }

    #[test]
    fn test_operation_identifiers_format() {
        let now = Utc.with_ymd_and_hms(2026, 10, 16, 9, 30, 0).unwrap();
        let (code, number) = generate_operation_identifiers(now);

        assert_eq!(code.len(), 8);
        assert!(code.chars().all(|c| c.is_ascii_digit()));
        assert!(number.starts_with("TRF-20261016-"));
        assert_eq!(number.len(), "TRF-20261016-000000".len());
    }
}
