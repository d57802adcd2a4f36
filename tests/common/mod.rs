//! Common test utilities
#![allow(dead_code)]

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use kalante_ledger::aggregate::{Aggregate, NewUser, User};
use kalante_ledger::api::AppState;
use kalante_ledger::db::{self, system_actor, SYSTEM_OPERATOR_ACCOUNT_ID};
use kalante_ledger::domain::{
    AccountKind, Actor, ActorRole, OperationContext, PartyDetails, Percentage, TransferRoute,
};
use kalante_ledger::event_store::{AccountLocks, EventStore, InMemoryEventStore};
use kalante_ledger::handlers::{
    AccountHandler, CatalogHandler, DepositCommand, InitiateTransferCommand, OpenAccountCommand,
    TransferEngine, UserHandler,
};
use kalante_ledger::Policy;

pub const TEST_API_KEY: &str = "test_key_123";

/// In-memory ledger with the system administrator and operator account
pub struct Ledger {
    pub store: Arc<InMemoryEventStore>,
    pub policy: Arc<Policy>,
    pub locks: Arc<AccountLocks>,
}

/// Accounts and motif for a transfer between two customers
pub struct Scenario {
    pub route: TransferRoute,
    pub motif_id: Uuid,
}

pub fn pct(value: Decimal) -> Percentage {
    Percentage::new(value).unwrap()
}

pub fn policy(ceiling: Decimal, threshold: Decimal) -> Policy {
    Policy::new(
        ceiling,
        threshold,
        pct(dec!(50)),
        pct(dec!(25)),
        pct(dec!(25)),
        pct(dec!(5)),
        72,
        SYSTEM_OPERATOR_ACCOUNT_ID,
    )
    .unwrap()
}

impl Ledger {
    pub async fn new() -> Self {
        Self::with_limits(dec!(5000), dec!(2000)).await
    }

    pub async fn with_limits(ceiling: Decimal, threshold: Decimal) -> Self {
        let ledger = Self {
            store: Arc::new(InMemoryEventStore::new()),
            policy: Arc::new(policy(ceiling, threshold)),
            locks: Arc::new(AccountLocks::default()),
        };
        db::bootstrap(ledger.store.as_ref(), &ledger.policy)
            .await
            .unwrap();
        ledger
    }

    fn dyn_store(&self) -> Arc<dyn EventStore> {
        self.store.clone()
    }

    pub fn state(&self) -> AppState {
        AppState::new(
            self.dyn_store(),
            self.policy.clone(),
            self.locks.clone(),
            vec![kalante_ledger::audit::sha256_hex(TEST_API_KEY)],
        )
    }

    pub fn engine(&self) -> TransferEngine {
        TransferEngine::new(self.dyn_store(), self.policy.clone(), self.locks.clone())
    }

    pub fn accounts(&self) -> AccountHandler {
        AccountHandler::new(self.dyn_store(), self.locks.clone(), self.policy.operator_account_id)
    }

    pub fn users(&self) -> UserHandler {
        UserHandler::new(self.dyn_store(), self.locks.clone())
    }

    pub fn catalog(&self) -> CatalogHandler {
        CatalogHandler::new(self.dyn_store())
    }

    pub async fn open_account(&self, kind: AccountKind, number: &str, funds: Option<&str>) -> Uuid {
        let accounts = self.accounts();
        let account = accounts
            .open(OpenAccountCommand::new(kind, number, number), &admin())
            .await
            .unwrap();
        if let Some(funds) = funds {
            accounts
                .deposit(account.id(), DepositCommand::new(funds), &admin())
                .await
                .unwrap();
        }
        account.id()
    }

    /// Sender funded with `sender_funds`, empty beneficiary, two offices
    pub async fn scenario(&self, sender_funds: &str) -> Scenario {
        let route = TransferRoute {
            sender_account_id: self
                .open_account(AccountKind::Customer, "CPT-SENDER", Some(sender_funds))
                .await,
            beneficiary_account_id: self
                .open_account(AccountKind::Customer, "CPT-BENEFICIARY", None)
                .await,
            sending_office_id: self.open_account(AccountKind::Office, "GUI-DAKAR", None).await,
            paying_office_id: self.open_account(AccountKind::Office, "GUI-BAMAKO", None).await,
        };
        let motif = self.catalog().create_motif("Famille", &admin()).await.unwrap();

        Scenario {
            route,
            motif_id: motif.id(),
        }
    }

    pub async fn balance(&self, account_id: Uuid) -> Decimal {
        self.accounts()
            .get(account_id)
            .await
            .unwrap()
            .balance()
            .value()
    }

    pub async fn register(&self, username: &str, role: ActorRole) -> User {
        self.users()
            .register(
                NewUser {
                    username: username.to_string(),
                    first_name: "Test".to_string(),
                    last_name: username.to_string(),
                    phone: "+221770000099".to_string(),
                    email: format!("{}@kalante.example", username),
                    country_code: None,
                    role,
                },
                &admin(),
            )
            .await
            .unwrap()
    }
}

impl Scenario {
    pub fn command(&self, amount: &str) -> InitiateTransferCommand {
        InitiateTransferCommand::new(
            PartyDetails::new("Awa", "Diallo", "+221770000001", "CNI-0001"),
            PartyDetails::new("Moussa", "Traoré", "+22376000002", "PASS-0002"),
            self.route,
            amount,
            self.motif_id,
        )
    }
}

pub fn admin() -> OperationContext {
    OperationContext::new()
        .with_actor(system_actor())
        .with_correlation_id(Uuid::new_v4())
}

pub fn agent() -> OperationContext {
    OperationContext::new().with_actor(Actor::new(Uuid::new_v4(), "Agent", ActorRole::Agent))
}

pub fn supervisor() -> OperationContext {
    OperationContext::new().with_actor(Actor::new(
        Uuid::new_v4(),
        "Supervisor",
        ActorRole::Supervisor,
    ))
}

/// Connect to the test database, or `None` when `DATABASE_URL` is unset
pub async fn setup_test_db() -> Option<PgPool> {
    dotenvy::dotenv().ok();
    let database_url = std::env::var("DATABASE_URL").ok()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to DB");

    assert!(
        db::check_schema(&pool).await.expect("schema check failed"),
        "run migrations/0001_init.sql before the database tests"
    );

    Some(pool)
}
