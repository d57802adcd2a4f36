//! Catalog Handler
//!
//! Reference data used by transfers: motifs and promotions. A motif that any
//! stored transfer references can no longer be relabeled or deleted.

use std::sync::Arc;
use uuid::Uuid;

use crate::aggregate::{Aggregate, Motif, NewPromotion, Promotion};
use crate::audit::{AuditAction, JournalEntry};
use crate::domain::{ActorRole, DomainError, OperationContext, PromotionChanges};
use crate::error::AppResult;
use crate::event_store::{load_active, load_all_active, retry_on_conflict, AggregateOperation, EventStore};

use super::write_journal;

pub struct CatalogHandler {
    store: Arc<dyn EventStore>,
}

impl CatalogHandler {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    // =========================================================================
    // Motifs
    // =========================================================================

    pub async fn create_motif(&self, label: &str, context: &OperationContext) -> AppResult<Motif> {
        let actor = context.require_role(ActorRole::Administrator)?;

        let (motif, event) = Motif::create(Uuid::new_v4(), label, actor.id)?;

        let operations = vec![AggregateOperation::new(
            Motif::aggregate_type(),
            motif.id(),
            0,
            event.event_type(),
            &event,
        )?];
        self.store.append_atomic(operations, None, context).await?;

        tracing::info!(motif_id = %motif.id(), label = %motif.label(), "Motif created");

        write_journal(
            self.store.as_ref(),
            JournalEntry::new(AuditAction::MotifCreated, format!("motif {} created", motif.label()))
                .resource(Motif::aggregate_type(), motif.id())
                .context(context),
        )
        .await;

        Ok(motif)
    }

    pub async fn relabel_motif(
        &self,
        motif_id: Uuid,
        label: &str,
        context: &OperationContext,
    ) -> AppResult<Motif> {
        let actor = context.require_role(ActorRole::Administrator)?.clone();

        retry_on_conflict("relabel_motif", || async {
            let motif = self.load_motif(motif_id).await?;
            self.ensure_motif_unused(motif_id).await?;
            let event = motif.relabel(label, actor.id)?;

            let operations = vec![AggregateOperation::new(
                Motif::aggregate_type(),
                motif_id,
                motif.version(),
                event.event_type(),
                &event,
            )?];
            self.store.append_atomic(operations, None, context).await?;

            let previous = motif.label().to_string();
            let motif = motif.apply(event);
            tracing::info!(motif_id = %motif_id, from = %previous, to = %motif.label(), "Motif relabeled");

            write_journal(
                self.store.as_ref(),
                JournalEntry::new(
                    AuditAction::MotifRelabeled,
                    format!("motif {} relabeled to {}", previous, motif.label()),
                )
                .resource(Motif::aggregate_type(), motif_id)
                .context(context),
            )
            .await;

            AppResult::Ok(motif)
        })
        .await
    }

    pub async fn delete_motif(&self, motif_id: Uuid, context: &OperationContext) -> AppResult<Motif> {
        let actor = context.require_role(ActorRole::Administrator)?.clone();

        retry_on_conflict("delete_motif", || async {
            let motif = self.load_motif(motif_id).await?;
            self.ensure_motif_unused(motif_id).await?;
            let event = motif.delete(actor.id)?;

            let operations = vec![AggregateOperation::new(
                Motif::aggregate_type(),
                motif_id,
                motif.version(),
                event.event_type(),
                &event,
            )?];
            self.store.append_atomic(operations, None, context).await?;

            tracing::info!(motif_id = %motif_id, "Motif deleted");

            write_journal(
                self.store.as_ref(),
                JournalEntry::new(AuditAction::MotifDeleted, format!("motif {} deleted", motif.label()))
                    .resource(Motif::aggregate_type(), motif_id)
                    .context(context),
            )
            .await;

            AppResult::Ok(motif.apply(event))
        })
        .await
    }

    pub async fn get_motif(&self, motif_id: Uuid) -> AppResult<Motif> {
        self.load_motif(motif_id).await
    }

    pub async fn list_motifs(&self) -> AppResult<Vec<Motif>> {
        Ok(load_all_active::<Motif>(self.store.as_ref()).await?)
    }

    async fn ensure_motif_unused(&self, motif_id: Uuid) -> AppResult<()> {
        if self.store.motif_in_use(motif_id).await? {
            return Err(DomainError::validation(format!(
                "motif {} is referenced by a transfer",
                motif_id
            ))
            .into());
        }
        Ok(())
    }

    async fn load_motif(&self, motif_id: Uuid) -> AppResult<Motif> {
        load_active::<Motif>(self.store.as_ref(), motif_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Motif", motif_id).into())
    }

    // =========================================================================
    // Promotions
    // =========================================================================

    pub async fn create_promotion(
        &self,
        input: NewPromotion,
        context: &OperationContext,
    ) -> AppResult<Promotion> {
        let actor = context.require_role(ActorRole::Administrator)?;

        let (promotion, event) = Promotion::create(Uuid::new_v4(), input, actor.id)?;

        let operations = vec![AggregateOperation::new(
            Promotion::aggregate_type(),
            promotion.id(),
            0,
            event.event_type(),
            &event,
        )?];
        self.store.append_atomic(operations, None, context).await?;

        tracing::info!(
            promotion_id = %promotion.id(),
            percentage = %promotion.percentage(),
            starts_on = %promotion.starts_on(),
            ends_on = %promotion.ends_on(),
            "Promotion created"
        );

        write_journal(
            self.store.as_ref(),
            JournalEntry::new(
                AuditAction::PromotionCreated,
                format!("promotion {} created", promotion.label()),
            )
            .resource(Promotion::aggregate_type(), promotion.id())
            .context(context),
        )
        .await;

        Ok(promotion)
    }

    pub async fn update_promotion(
        &self,
        promotion_id: Uuid,
        changes: PromotionChanges,
        context: &OperationContext,
    ) -> AppResult<Promotion> {
        let actor = context.require_role(ActorRole::Administrator)?.clone();

        retry_on_conflict("update_promotion", || async {
            let promotion = self.load_promotion(promotion_id).await?;
            let event = promotion.update(changes.clone(), actor.id)?;

            let operations = vec![AggregateOperation::new(
                Promotion::aggregate_type(),
                promotion_id,
                promotion.version(),
                event.event_type(),
                &event,
            )?];
            self.store.append_atomic(operations, None, context).await?;

            let promotion = promotion.apply(event);
            tracing::info!(promotion_id = %promotion_id, "Promotion updated");

            write_journal(
                self.store.as_ref(),
                JournalEntry::new(
                    AuditAction::PromotionUpdated,
                    format!("promotion {} updated", promotion.label()),
                )
                .resource(Promotion::aggregate_type(), promotion_id)
                .context(context),
            )
            .await;

            AppResult::Ok(promotion)
        })
        .await
    }

    pub async fn delete_promotion(
        &self,
        promotion_id: Uuid,
        context: &OperationContext,
    ) -> AppResult<Promotion> {
        let actor = context.require_role(ActorRole::Administrator)?.clone();

        retry_on_conflict("delete_promotion", || async {
            let promotion = self.load_promotion(promotion_id).await?;
            let event = promotion.delete(actor.id)?;

            let operations = vec![AggregateOperation::new(
                Promotion::aggregate_type(),
                promotion_id,
                promotion.version(),
                event.event_type(),
                &event,
            )?];
            self.store.append_atomic(operations, None, context).await?;

            tracing::info!(promotion_id = %promotion_id, "Promotion deleted");

            write_journal(
                self.store.as_ref(),
                JournalEntry::new(
                    AuditAction::PromotionDeleted,
                    format!("promotion {} deleted", promotion.label()),
                )
                .resource(Promotion::aggregate_type(), promotion_id)
                .context(context),
            )
            .await;

            AppResult::Ok(promotion.apply(event))
        })
        .await
    }

    pub async fn get_promotion(&self, promotion_id: Uuid) -> AppResult<Promotion> {
        self.load_promotion(promotion_id).await
    }

    pub async fn list_promotions(&self) -> AppResult<Vec<Promotion>> {
        Ok(load_all_active::<Promotion>(self.store.as_ref()).await?)
    }

    async fn load_promotion(&self, promotion_id: Uuid) -> AppResult<Promotion> {
        load_active::<Promotion>(self.store.as_ref(), promotion_id)
            .await?
            .ok_or_else(|| DomainError::not_found("Promotion", promotion_id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Actor;
    use crate::error::AppError;
    use crate::event_store::InMemoryEventStore;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn admin() -> OperationContext {
        OperationContext::new().with_actor(Actor::new(Uuid::new_v4(), "Admin", ActorRole::Administrator))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[tokio::test]
    async fn test_motif_lifecycle() {
        let catalog = CatalogHandler::new(Arc::new(InMemoryEventStore::new()));
        let ctx = admin();

        let motif = catalog.create_motif("Famille", &ctx).await.unwrap();
        catalog.create_motif("Scolarité", &ctx).await.unwrap();

        let relabeled = catalog.relabel_motif(motif.id(), "Soutien familial", &ctx).await.unwrap();
        assert_eq!(relabeled.label(), "Soutien familial");

        catalog.delete_motif(motif.id(), &ctx).await.unwrap();

        let motifs = catalog.list_motifs().await.unwrap();
        assert_eq!(motifs.len(), 1);
        assert_eq!(motifs[0].label(), "Scolarité");
    }

    #[tokio::test]
    async fn test_unknown_motif() {
        let catalog = CatalogHandler::new(Arc::new(InMemoryEventStore::new()));
        let result = catalog.relabel_motif(Uuid::new_v4(), "x", &admin()).await;
        assert!(matches!(result, Err(AppError::Domain(DomainError::NotFound { .. }))));
    }

    #[tokio::test]
    async fn test_promotion_lifecycle() {
        let catalog = CatalogHandler::new(Arc::new(InMemoryEventStore::new()));
        let ctx = admin();

        let promotion = catalog
            .create_promotion(
                NewPromotion {
                    label: "Tabaski".to_string(),
                    description: "Fête".to_string(),
                    starts_on: date(2026, 6, 1),
                    ends_on: date(2026, 6, 30),
                    percentage: dec!(20),
                },
                &ctx,
            )
            .await
            .unwrap();

        let updated = catalog
            .update_promotion(
                promotion.id(),
                PromotionChanges {
                    percentage: Some(dec!(25)),
                    ..Default::default()
                },
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(updated.percentage().value(), dec!(25));

        catalog.delete_promotion(promotion.id(), &ctx).await.unwrap();
        assert!(catalog.list_promotions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_promotion_window_validated() {
        let catalog = CatalogHandler::new(Arc::new(InMemoryEventStore::new()));
        let result = catalog
            .create_promotion(
                NewPromotion {
                    label: "Inversée".to_string(),
                    description: String::new(),
                    starts_on: date(2026, 6, 30),
                    ends_on: date(2026, 6, 1),
                    percentage: dec!(10),
                },
                &admin(),
            )
            .await;
        assert!(matches!(result, Err(AppError::Domain(DomainError::Validation(_)))));
    }
}
