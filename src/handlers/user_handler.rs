//! User Handler
//!
//! Actor registry. Registration, updates and deletion are administrative;
//! `resolve_actor` turns an authenticated user id into the [`Actor`] the
//! rest of the ledger stamps on its records.

use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::{Aggregate, NewUser, User};
use crate::audit::{AuditAction, JournalEntry};
use crate::db::SYSTEM_ADMIN_ID;
use crate::domain::{Actor, ActorRole, DomainError, OperationContext, UserChanges};
use crate::error::AppResult;
use crate::event_store::{
    load_active, load_all_active, retry_on_conflict, AccountLocks, AggregateOperation, EventStore,
};

use super::write_journal;

/// Lock id serializing username checks with the registration that follows
const USER_REGISTRY_LOCK_ID: Uuid = Uuid::from_u128(0x7573_6572_7300);

pub struct UserHandler {
    store: Arc<dyn EventStore>,
    locks: Arc<AccountLocks>,
}

impl UserHandler {
    pub fn new(store: Arc<dyn EventStore>, locks: Arc<AccountLocks>) -> Self {
        Self { store, locks }
    }

    pub async fn register(&self, input: NewUser, context: &OperationContext) -> AppResult<User> {
        let actor = context.require_role(ActorRole::Administrator)?;
        let _registry = self.locks.acquire(&[USER_REGISTRY_LOCK_ID]).await?;

        let username = input.username.trim().to_string();
        let taken = load_all_active::<User>(self.store.as_ref())
            .await?
            .iter()
            .any(|user| user.username().eq_ignore_ascii_case(&username));
        if taken {
            return Err(DomainError::validation(format!("username {} is already taken", username)).into());
        }

        let (user, event) = User::register(Uuid::new_v4(), input, actor.id)?;

        let operations = vec![AggregateOperation::new(
            User::aggregate_type(),
            user.id(),
            0,
            event.event_type(),
            &event,
        )?];
        self.store.append_atomic(operations, None, context).await?;

        tracing::info!(
            user_id = %user.id(),
            username = %user.username(),
            role = %user.role(),
            "User registered"
        );

        write_journal(
            self.store.as_ref(),
            JournalEntry::new(
                AuditAction::UserRegistered,
                format!("user {} registered as {}", user.username(), user.role()),
            )
            .resource(User::aggregate_type(), user.id())
            .context(context),
        )
        .await;

        Ok(user)
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        changes: UserChanges,
        context: &OperationContext,
    ) -> AppResult<User> {
        let actor = context.require_role(ActorRole::Administrator)?.clone();

        retry_on_conflict("update_user", || async {
            let user = self.load(user_id).await?;
            let event = user.update(changes.clone(), actor.id)?;

            let operations = vec![AggregateOperation::new(
                User::aggregate_type(),
                user_id,
                user.version(),
                event.event_type(),
                &event,
            )?];
            self.store.append_atomic(operations, None, context).await?;

            let user = user.apply(event);
            tracing::info!(user_id = %user_id, updated_by = %actor.id, "User updated");

            write_journal(
                self.store.as_ref(),
                JournalEntry::new(AuditAction::UserUpdated, format!("user {} updated", user.username()))
                    .resource(User::aggregate_type(), user_id)
                    .context(context),
            )
            .await;

            AppResult::Ok(user)
        })
        .await
    }

    pub async fn delete(&self, user_id: Uuid, context: &OperationContext) -> AppResult<User> {
        let actor = context.require_role(ActorRole::Administrator)?.clone();

        if user_id == SYSTEM_ADMIN_ID {
            return Err(DomainError::validation("the system administrator cannot be deleted").into());
        }

        retry_on_conflict("delete_user", || async {
            let user = self.load(user_id).await?;
            let event = user.delete(actor.id)?;

            let operations = vec![AggregateOperation::new(
                User::aggregate_type(),
                user_id,
                user.version(),
                event.event_type(),
                &event,
            )?];
            self.store.append_atomic(operations, None, context).await?;

            tracing::info!(user_id = %user_id, deleted_by = %actor.id, "User deleted");

            write_journal(
                self.store.as_ref(),
                JournalEntry::new(AuditAction::UserDeleted, format!("user {} deleted", user.username()))
                    .resource(User::aggregate_type(), user_id)
                    .context(context),
            )
            .await;

            AppResult::Ok(user.apply(event))
        })
        .await
    }

    pub async fn get(&self, user_id: Uuid) -> AppResult<User> {
        self.load(user_id).await
    }

    /// Actor for an authenticated user id; unknown or deleted users are
    /// refused.
    pub async fn resolve_actor(&self, user_id: Uuid) -> AppResult<Actor> {
        load_active::<User>(self.store.as_ref(), user_id)
            .await?
            .map(|user| user.as_actor())
            .ok_or_else(|| DomainError::Unauthorized(format!("unknown actor {}", user_id)).into())
    }

    async fn load(&self, user_id: Uuid) -> AppResult<User> {
        load_active::<User>(self.store.as_ref(), user_id)
            .await?
            .ok_or_else(|| DomainError::not_found("User", user_id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::Audited;
    use crate::error::AppError;
    use crate::event_store::InMemoryEventStore;

    fn new_user(username: &str, role: ActorRole) -> NewUser {
        NewUser {
            username: username.to_string(),
            first_name: "Fatou".to_string(),
            last_name: "Sow".to_string(),
            phone: "+221770000010".to_string(),
            email: format!("{}@kalante.example", username),
            country_code: Some("SN".to_string()),
            role,
        }
    }

    fn handler() -> UserHandler {
        UserHandler::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(AccountLocks::default()),
        )
    }

    fn admin() -> OperationContext {
        OperationContext::new().with_actor(Actor::new(SYSTEM_ADMIN_ID, "System", ActorRole::Administrator))
    }

    #[tokio::test]
    async fn test_register_and_resolve() {
        let handler = handler();

        let user = handler
            .register(new_user("fsow", ActorRole::Supervisor), &admin())
            .await
            .unwrap();
        assert_eq!(user.audit().created_by, SYSTEM_ADMIN_ID);

        let actor = handler.resolve_actor(user.id()).await.unwrap();
        assert_eq!(actor.role, ActorRole::Supervisor);
        assert_eq!(actor.display_name, "Fatou Sow");
    }

    #[tokio::test]
    async fn test_username_is_unique() {
        let handler = handler();
        handler
            .register(new_user("fsow", ActorRole::Agent), &admin())
            .await
            .unwrap();

        let result = handler.register(new_user("FSOW", ActorRole::Agent), &admin()).await;
        assert!(matches!(result, Err(AppError::Domain(DomainError::Validation(_)))));
    }

    #[tokio::test]
    async fn test_concurrent_registrations_keep_username_unique() {
        let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
        let locks = Arc::new(AccountLocks::default());
        let first = UserHandler::new(store.clone(), locks.clone());
        let second = UserHandler::new(store.clone(), locks);
        let ctx = admin();

        let (a, b) = tokio::join!(
            first.register(new_user("mdiop", ActorRole::Agent), &ctx),
            second.register(new_user("MDiop", ActorRole::Agent), &ctx)
        );

        assert_eq!([&a, &b].iter().filter(|r| r.is_ok()).count(), 1);
        let users = load_all_active::<User>(store.as_ref()).await.unwrap();
        assert_eq!(
            users
                .iter()
                .filter(|user| user.username().eq_ignore_ascii_case("mdiop"))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_update_role_and_delete() {
        let handler = handler();
        let user = handler
            .register(new_user("agent1", ActorRole::Agent), &admin())
            .await
            .unwrap();

        let changes = UserChanges {
            role: Some(ActorRole::Supervisor),
            ..Default::default()
        };
        let updated = handler.update(user.id(), changes, &admin()).await.unwrap();
        assert_eq!(updated.role(), ActorRole::Supervisor);
        assert_eq!(updated.version(), 2);

        handler.delete(user.id(), &admin()).await.unwrap();
        let result = handler.resolve_actor(user.id()).await;
        assert!(matches!(result, Err(AppError::Domain(DomainError::Unauthorized(_)))));
    }

    #[tokio::test]
    async fn test_system_admin_cannot_be_deleted() {
        let handler = handler();
        let result = handler.delete(SYSTEM_ADMIN_ID, &admin()).await;
        assert!(matches!(result, Err(AppError::Domain(DomainError::Validation(_)))));
    }
}
