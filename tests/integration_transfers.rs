//! Transfer lifecycle integration tests (in-memory store)

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rust_decimal_macros::dec;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_test::{assert_err, assert_ok};
use uuid::Uuid;

use kalante_ledger::aggregate::{Aggregate, NewPromotion};
use kalante_ledger::audit::JournalEntry;
use kalante_ledger::domain::{AccountKind, DomainError, OperationContext, PolicyDenial, TransferState};
use kalante_ledger::event_store::{
    AccountLocks, AggregateOperation, EventStore, EventStoreError, InMemoryEventStore, StoredEvent,
};
use kalante_ledger::handlers::{InitiateTransferCommand, TransferEngine, CODE_EXPIRED_REASON};
use kalante_ledger::AppError;

mod common;

use common::{admin, agent, supervisor, Ledger};

fn domain(err: AppError) -> DomainError {
    match err {
        AppError::Domain(e) => e,
        other => panic!("Expected domain error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_completed_transfer_moves_all_balances() {
    let ledger = Ledger::new().await;
    let scenario = ledger.scenario("1000.00").await;
    let engine = ledger.engine();
    let ctx = agent();

    let receipt = engine.initiate(scenario.command("200.00"), None, &ctx).await.unwrap();
    let transfer = receipt.transfer;
    assert_eq!(transfer.state(), TransferState::Initiated);
    assert_eq!(transfer.commission().total, dec!(10.00));
    assert!(receipt.operation_code.is_some());

    // Nothing moves before completion
    assert_eq!(ledger.balance(scenario.route.sender_account_id).await, dec!(1000.00));

    let transfer = assert_ok!(engine.dispatch(transfer.id(), &ctx).await);
    assert_eq!(transfer.state(), TransferState::InTransit);

    let transfer = assert_ok!(engine.complete(transfer.id(), &ctx).await);
    assert_eq!(transfer.state(), TransferState::Completed);
    assert!(transfer.reception_date().is_some());

    let route = scenario.route;
    let sender = ledger.balance(route.sender_account_id).await;
    let beneficiary = ledger.balance(route.beneficiary_account_id).await;
    let operator = ledger.balance(ledger.policy.operator_account_id).await;
    let expeditor = ledger.balance(route.sending_office_id).await;
    let payer = ledger.balance(route.paying_office_id).await;

    assert_eq!(sender, dec!(800.00));
    assert_eq!(beneficiary, dec!(190.00));
    assert_eq!(operator, dec!(5.00));
    assert_eq!(expeditor, dec!(2.50));
    assert_eq!(payer, dec!(2.50));
    assert_eq!(beneficiary + operator + expeditor + payer, dec!(200.00));
}

#[tokio::test]
async fn test_ceiling_denial_stores_nothing() {
    let ledger = Ledger::with_limits(dec!(30.00), dec!(30.00)).await;
    let scenario = ledger.scenario("1000.00").await;
    let events_before = ledger.store.event_count().await;

    let err = assert_err!(
        ledger
            .engine()
            .initiate(scenario.command("50.00"), None, &agent())
            .await
    );

    assert!(matches!(
        domain(err),
        DomainError::PolicyDenied(PolicyDenial::CeilingExceeded { .. })
    ));
    assert_eq!(ledger.store.event_count().await, events_before);

    let now = Utc::now();
    let sent = ledger
        .store
        .transfers_by_sender(
            scenario.route.sender_account_id,
            now - Duration::days(1),
            now + Duration::days(1),
        )
        .await
        .unwrap();
    assert!(sent.is_empty());
}

#[tokio::test]
async fn test_no_transition_out_of_terminal_states() {
    let ledger = Ledger::new().await;
    let scenario = ledger.scenario("1000.00").await;
    let engine = ledger.engine();
    let ctx = agent();

    // cancel after complete
    let completed = engine.initiate(scenario.command("100.00"), None, &ctx).await.unwrap().transfer;
    engine.dispatch(completed.id(), &ctx).await.unwrap();
    engine.complete(completed.id(), &ctx).await.unwrap();
    let err = engine.cancel(completed.id(), "too late", &ctx).await.unwrap_err();
    assert!(matches!(
        domain(err),
        DomainError::InvalidTransition {
            state: TransferState::Completed,
            ..
        }
    ));

    // complete after cancel
    let cancelled = engine.initiate(scenario.command("100.00"), None, &ctx).await.unwrap().transfer;
    engine.dispatch(cancelled.id(), &ctx).await.unwrap();
    engine.cancel(cancelled.id(), "customer request", &ctx).await.unwrap();
    let err = engine.complete(cancelled.id(), &ctx).await.unwrap_err();
    assert!(matches!(
        domain(err),
        DomainError::InvalidTransition {
            state: TransferState::Cancelled,
            ..
        }
    ));

    // Only the completed transfer moved money
    assert_eq!(ledger.balance(scenario.route.sender_account_id).await, dec!(900.00));
}

#[tokio::test]
async fn test_double_cancel_changes_nothing() {
    let ledger = Ledger::new().await;
    let scenario = ledger.scenario("1000.00").await;
    let engine = ledger.engine();
    let ctx = agent();

    let transfer = engine.initiate(scenario.command("100.00"), None, &ctx).await.unwrap().transfer;
    let cancelled = engine.cancel(transfer.id(), "wrong beneficiary", &ctx).await.unwrap();
    assert!(cancelled.cancel_date().is_some());

    let err = engine.cancel(transfer.id(), "again", &ctx).await.unwrap_err();
    assert!(matches!(domain(err), DomainError::InvalidTransition { .. }));

    let reloaded = engine.get(transfer.id()).await.unwrap();
    assert_eq!(reloaded.version(), cancelled.version());
    assert_eq!(reloaded.cancel_reason(), Some("wrong beneficiary"));
    assert_eq!(ledger.balance(scenario.route.sender_account_id).await, dec!(1000.00));
}

#[tokio::test]
async fn test_concurrent_completes_only_one_succeeds() {
    let ledger = Ledger::new().await;
    let scenario = ledger.scenario("1000.00").await;
    let engine = ledger.engine();
    let ctx = agent();

    let transfer = engine.initiate(scenario.command("200.00"), None, &ctx).await.unwrap().transfer;
    engine.dispatch(transfer.id(), &ctx).await.unwrap();

    let first = ledger.engine();
    let second = ledger.engine();
    let (a, b) = tokio::join!(
        first.complete(transfer.id(), &ctx),
        second.complete(transfer.id(), &ctx)
    );

    let results = [a, b];
    let successes = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(successes, 1);
    assert!(results.iter().any(|r| matches!(
        r,
        Err(AppError::Domain(DomainError::InvalidTransition { .. }))
    )));

    // Debited exactly once
    assert_eq!(ledger.balance(scenario.route.sender_account_id).await, dec!(800.00));
}

#[tokio::test]
async fn test_insufficient_funds_leaves_ledger_unchanged() {
    let ledger = Ledger::new().await;
    let scenario = ledger.scenario("150.00").await;
    let engine = ledger.engine();
    let ctx = agent();

    let transfer = engine.initiate(scenario.command("200.00"), None, &ctx).await.unwrap().transfer;
    engine.dispatch(transfer.id(), &ctx).await.unwrap();

    let err = engine.complete(transfer.id(), &ctx).await.unwrap_err();
    assert!(matches!(domain(err), DomainError::InsufficientFunds { .. }));

    assert_eq!(engine.get(transfer.id()).await.unwrap().state(), TransferState::InTransit);
    assert_eq!(ledger.balance(scenario.route.sender_account_id).await, dec!(150.00));
    assert_eq!(ledger.balance(scenario.route.beneficiary_account_id).await, dec!(0));
    assert_eq!(ledger.balance(ledger.policy.operator_account_id).await, dec!(0));
}

#[tokio::test]
async fn test_daily_threshold_and_elevated_approval() {
    let ledger = Ledger::with_limits(dec!(5000), dec!(300)).await;
    let scenario = ledger.scenario("5000.00").await;
    let engine = ledger.engine();

    engine.initiate(scenario.command("200.00"), None, &agent()).await.unwrap();

    // 200 + 200 > 300
    let err = engine
        .initiate(scenario.command("200.00"), None, &agent())
        .await
        .unwrap_err();
    assert!(matches!(
        domain(err),
        DomainError::PolicyDenied(PolicyDenial::ThresholdExceeded { .. })
    ));

    // Agents cannot waive the threshold
    let err = engine
        .initiate(scenario.command("200.00").with_elevated_approval(), None, &agent())
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::PolicyDenied(_)));

    // Supervisors can
    assert_ok!(
        engine
            .initiate(scenario.command("200.00").with_elevated_approval(), None, &supervisor())
            .await
    );
}

/// Store that lets another process initiate a transfer right before the
/// first append goes through
struct InterleavingStore {
    inner: Arc<InMemoryEventStore>,
    rival: Mutex<Option<(TransferEngine, InitiateTransferCommand)>>,
}

#[async_trait]
impl EventStore for InterleavingStore {
    async fn append_atomic(
        &self,
        operations: Vec<AggregateOperation>,
        idempotency_key: Option<Uuid>,
        context: &OperationContext,
    ) -> Result<Vec<Uuid>, EventStoreError> {
        let rival = self.rival.lock().await.take();
        if let Some((engine, command)) = rival {
            engine.initiate(command, None, &agent()).await.unwrap();
        }
        self.inner.append_atomic(operations, idempotency_key, context).await
    }

    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, EventStoreError> {
        self.inner.load_events(aggregate_id).await
    }

    async fn find_by_idempotency_key(&self, key: Uuid) -> Result<Option<Uuid>, EventStoreError> {
        self.inner.find_by_idempotency_key(key).await
    }

    async fn aggregate_ids(&self, aggregate_type: &str) -> Result<Vec<Uuid>, EventStoreError> {
        self.inner.aggregate_ids(aggregate_type).await
    }

    async fn transfers_by_sender(
        &self,
        sender_account_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Uuid>, EventStoreError> {
        self.inner.transfers_by_sender(sender_account_id, from, to).await
    }

    async fn open_transfers(&self) -> Result<Vec<Uuid>, EventStoreError> {
        self.inner.open_transfers().await
    }

    async fn motif_in_use(&self, motif_id: Uuid) -> Result<bool, EventStoreError> {
        self.inner.motif_in_use(motif_id).await
    }

    async fn append_journal(&self, entry: &JournalEntry) -> Result<(), EventStoreError> {
        self.inner.append_journal(entry).await
    }

    async fn journal_for(&self, resource_id: Uuid) -> Result<Vec<JournalEntry>, EventStoreError> {
        self.inner.journal_for(resource_id).await
    }
}

#[tokio::test]
async fn test_threshold_holds_across_processes() {
    let ledger = Ledger::with_limits(dec!(5000), dec!(300)).await;
    let scenario = ledger.scenario("5000.00").await;

    // Separate lock tables: the two engines share only the store
    let other_process = TransferEngine::new(
        ledger.store.clone(),
        ledger.policy.clone(),
        Arc::new(AccountLocks::default()),
    );
    let store = Arc::new(InterleavingStore {
        inner: ledger.store.clone(),
        rival: Mutex::new(Some((other_process, scenario.command("200.00")))),
    });
    let engine = TransferEngine::new(store, ledger.policy.clone(), ledger.locks.clone());

    // Checked against an empty day, then retried after the other commit
    let err = engine
        .initiate(scenario.command("200.00"), None, &agent())
        .await
        .unwrap_err();
    assert!(matches!(
        domain(err),
        DomainError::PolicyDenied(PolicyDenial::ThresholdExceeded { .. })
    ));

    let now = Utc::now();
    let sent = ledger
        .store
        .transfers_by_sender(
            scenario.route.sender_account_id,
            now - Duration::days(1),
            now + Duration::days(1),
        )
        .await
        .unwrap();
    assert_eq!(sent.len(), 1);
}

#[tokio::test]
async fn test_cancelled_transfers_do_not_count_towards_threshold() {
    let ledger = Ledger::with_limits(dec!(5000), dec!(300)).await;
    let scenario = ledger.scenario("5000.00").await;
    let engine = ledger.engine();
    let ctx = agent();

    let first = engine.initiate(scenario.command("250.00"), None, &ctx).await.unwrap().transfer;
    engine.cancel(first.id(), "duplicate", &ctx).await.unwrap();

    assert_ok!(engine.initiate(scenario.command("250.00"), None, &ctx).await);
}

#[tokio::test]
async fn test_promotion_reduces_commission_inside_window() {
    let ledger = Ledger::new().await;
    let scenario = ledger.scenario("1000.00").await;
    let catalog = ledger.catalog();
    let today = Utc::now().date_naive();

    let active = catalog
        .create_promotion(
            NewPromotion {
                label: "Moitié prix".to_string(),
                description: String::new(),
                starts_on: today - Duration::days(1),
                ends_on: today + Duration::days(1),
                percentage: dec!(50),
            },
            &admin(),
        )
        .await
        .unwrap();

    let receipt = ledger
        .engine()
        .initiate(scenario.command("200.00").with_promotion(active.id()), None, &agent())
        .await
        .unwrap();
    assert_eq!(receipt.transfer.commission().total, dec!(5.00));
    assert_eq!(receipt.transfer.net_amount(), dec!(195.00));
    assert_eq!(receipt.transfer.promotion_id(), Some(active.id()));

    let expired = catalog
        .create_promotion(
            NewPromotion {
                label: "Terminée".to_string(),
                description: String::new(),
                starts_on: today - Duration::days(30),
                ends_on: today - Duration::days(1),
                percentage: dec!(50),
            },
            &admin(),
        )
        .await
        .unwrap();

    let err = ledger
        .engine()
        .initiate(scenario.command("200.00").with_promotion(expired.id()), None, &agent())
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::Validation(_)));
}

#[tokio::test]
async fn test_idempotent_initiate_returns_existing_transfer() {
    let ledger = Ledger::new().await;
    let scenario = ledger.scenario("1000.00").await;
    let engine = ledger.engine();
    let key = Uuid::new_v4();

    let first = engine
        .initiate(scenario.command("100.00"), Some(key), &agent())
        .await
        .unwrap();
    let events = ledger.store.event_count().await;

    let replay = engine
        .initiate(scenario.command("100.00"), Some(key), &agent())
        .await
        .unwrap();

    assert_eq!(replay.transfer.id(), first.transfer.id());
    assert!(first.operation_code.is_some());
    assert!(replay.operation_code.is_none());
    assert_eq!(ledger.store.event_count().await, events);
}

#[tokio::test]
async fn test_motif_frozen_once_referenced_by_transfer() {
    let ledger = Ledger::new().await;
    let scenario = ledger.scenario("1000.00").await;
    let engine = ledger.engine();
    let catalog = ledger.catalog();
    let ctx = agent();

    // Unused motif can still be edited
    catalog
        .relabel_motif(scenario.motif_id, "Aide familiale", &admin())
        .await
        .unwrap();

    let transfer = engine.initiate(scenario.command("100.00"), None, &ctx).await.unwrap().transfer;

    // Frozen as soon as the initiated transfer is stored
    let err = catalog
        .relabel_motif(scenario.motif_id, "Autre", &admin())
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::Validation(_)));

    let err = catalog.delete_motif(scenario.motif_id, &admin()).await.unwrap_err();
    assert!(matches!(domain(err), DomainError::Validation(_)));

    // Still frozen after the transfer is cancelled
    engine.cancel(transfer.id(), "client left", &ctx).await.unwrap();
    let err = catalog.delete_motif(scenario.motif_id, &admin()).await.unwrap_err();
    assert!(matches!(domain(err), DomainError::Validation(_)));
}

#[tokio::test]
async fn test_route_validation() {
    let ledger = Ledger::new().await;
    let scenario = ledger.scenario("1000.00").await;
    let engine = ledger.engine();

    let mut to_self = scenario.command("100.00");
    to_self.route.beneficiary_account_id = to_self.route.sender_account_id;
    let err = engine.initiate(to_self, None, &agent()).await.unwrap_err();
    assert!(matches!(domain(err), DomainError::Validation(_)));

    let bank = ledger.open_account(AccountKind::Bank, "BNK-1", None).await;
    let mut via_bank = scenario.command("100.00");
    via_bank.route.paying_office_id = bank;
    let err = engine.initiate(via_bank, None, &agent()).await.unwrap_err();
    assert!(matches!(domain(err), DomainError::Validation(_)));

    let mut unknown_motif = scenario.command("100.00");
    unknown_motif.motif_id = Uuid::new_v4();
    let err = engine.initiate(unknown_motif, None, &agent()).await.unwrap_err();
    assert!(matches!(domain(err), DomainError::Validation(_)));

    let err = engine
        .initiate(scenario.command("0"), None, &agent())
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::Validation(_)));
}

#[tokio::test]
async fn test_operation_code_verification() {
    let ledger = Ledger::new().await;
    let scenario = ledger.scenario("1000.00").await;
    let engine = ledger.engine();

    let receipt = engine.initiate(scenario.command("100.00"), None, &agent()).await.unwrap();
    let code = receipt.operation_code.unwrap();
    assert_eq!(code.len(), 8);

    let id = receipt.transfer.id();
    assert!(engine.verify_operation_code(id, &code).await.unwrap());
    assert!(!engine.verify_operation_code(id, "not-the-code").await.unwrap());
}

#[tokio::test]
async fn test_expired_codes_are_cancelled() {
    let ledger = Ledger::new().await;
    let scenario = ledger.scenario("1000.00").await;
    let engine = ledger.engine();
    let ctx = agent();

    let open = engine.initiate(scenario.command("100.00"), None, &ctx).await.unwrap().transfer;
    let in_transit = engine.initiate(scenario.command("100.00"), None, &ctx).await.unwrap().transfer;
    engine.dispatch(in_transit.id(), &ctx).await.unwrap();
    let done = engine.initiate(scenario.command("100.00"), None, &ctx).await.unwrap().transfer;
    engine.dispatch(done.id(), &ctx).await.unwrap();
    engine.complete(done.id(), &ctx).await.unwrap();

    // Nothing has expired yet
    assert!(engine.cancel_expired(Utc::now(), &admin()).await.unwrap().is_empty());

    let later = Utc::now() + Duration::hours(73);
    let mut cancelled = engine.cancel_expired(later, &admin()).await.unwrap();
    cancelled.sort();
    let mut expected = vec![open.id(), in_transit.id()];
    expected.sort();
    assert_eq!(cancelled, expected);

    let reloaded = engine.get(open.id()).await.unwrap();
    assert_eq!(reloaded.state(), TransferState::Cancelled);
    assert_eq!(reloaded.cancel_reason(), Some(CODE_EXPIRED_REASON));
    assert_eq!(engine.get(done.id()).await.unwrap().state(), TransferState::Completed);
}

#[tokio::test]
async fn test_every_transition_is_journaled() {
    let ledger = Ledger::new().await;
    let scenario = ledger.scenario("1000.00").await;
    let engine = ledger.engine();
    let ctx = agent();
    let actor_id = ctx.actor.as_ref().map(|a| a.id);

    let transfer = engine.initiate(scenario.command("100.00"), None, &ctx).await.unwrap().transfer;
    engine.dispatch(transfer.id(), &ctx).await.unwrap();
    engine.complete(transfer.id(), &ctx).await.unwrap();

    let journal = ledger.store.journal_for(transfer.id()).await.unwrap();
    let events: Vec<&str> = journal.iter().map(|entry| entry.event.as_str()).collect();
    assert_eq!(
        events,
        vec!["transfer.initiated", "transfer.dispatched", "transfer.completed"]
    );
    assert!(journal.iter().all(|entry| entry.actor_id == actor_id));
}

#[tokio::test]
async fn test_unidentified_actor_is_refused() {
    let ledger = Ledger::new().await;
    let scenario = ledger.scenario("1000.00").await;

    let err = ledger
        .engine()
        .initiate(scenario.command("100.00"), None, &kalante_ledger::OperationContext::new())
        .await
        .unwrap_err();
    assert!(matches!(domain(err), DomainError::Unauthorized(_)));
}
