//! Database module
//!
//! Connection checks and system bootstrap.

use sqlx::PgPool;
use uuid::Uuid;

use crate::aggregate::{Account, Aggregate, NewUser, User};
use crate::domain::{AccountKind, Actor, ActorRole, OperationContext};
use crate::error::AppResult;
use crate::event_store::{load_aggregate, AggregateOperation, EventStore};
use crate::policy::Policy;

/// System administrator; registers itself at bootstrap
pub const SYSTEM_ADMIN_ID: Uuid = Uuid::from_u128(1);

/// Default operator commission account
pub const SYSTEM_OPERATOR_ACCOUNT_ID: Uuid = Uuid::from_u128(2);

/// Actor used by startup tasks and background jobs
pub fn system_actor() -> Actor {
    Actor::new(SYSTEM_ADMIN_ID, "System Administrator", ActorRole::Administrator)
}

/// Simple connectivity check
pub async fn verify_connection(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

/// Check if required tables exist
pub async fn check_schema(pool: &PgPool) -> Result<bool, sqlx::Error> {
    for table in ["events", "journal"] {
        let exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM information_schema.tables
                WHERE table_schema = 'public' AND table_name = $1
            )
            "#,
        )
        .bind(table)
        .fetch_one(pool)
        .await?;

        if !exists {
            tracing::error!("Required table '{}' does not exist", table);
            return Ok(false);
        }
    }

    Ok(true)
}

/// Create the system administrator and the operator account when absent
pub async fn bootstrap(store: &dyn EventStore, policy: &Policy) -> AppResult<()> {
    let context = OperationContext::new()
        .with_actor(system_actor())
        .with_correlation_id(Uuid::new_v4());

    if load_aggregate::<User>(store, SYSTEM_ADMIN_ID).await?.is_none() {
        let (admin, event) = User::register(
            SYSTEM_ADMIN_ID,
            NewUser {
                username: "system".to_string(),
                first_name: "System".to_string(),
                last_name: "Administrator".to_string(),
                phone: "0000000000".to_string(),
                email: "system@kalante.local".to_string(),
                country_code: None,
                role: ActorRole::Administrator,
            },
            SYSTEM_ADMIN_ID,
        )?;

        let operations = vec![AggregateOperation::new(
            User::aggregate_type(),
            admin.id(),
            0,
            event.event_type(),
            &event,
        )?];
        store.append_atomic(operations, None, &context).await?;
        tracing::info!(user_id = %SYSTEM_ADMIN_ID, "System administrator created");
    }

    let operator_account_id = policy.operator_account_id;
    match load_aggregate::<Account>(store, operator_account_id).await? {
        Some(account) if account.kind() != AccountKind::Operator => {
            tracing::warn!(
                account_id = %operator_account_id,
                kind = %account.kind(),
                "Configured operator account is not an operator account"
            );
        }
        Some(_) => {}
        None => {
            let (account, event) = Account::open(
                operator_account_id,
                AccountKind::Operator,
                "OPERATOR",
                "Kalante operator",
                None,
                SYSTEM_ADMIN_ID,
            )?;

            let operations = vec![AggregateOperation::new(
                Account::aggregate_type(),
                account.id(),
                0,
                event.event_type(),
                &event,
            )?];
            store.append_atomic(operations, None, &context).await?;
            tracing::info!(account_id = %operator_account_id, "Operator account created");
        }
    }

    Ok(())
}
