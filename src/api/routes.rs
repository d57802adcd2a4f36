//! API Routes
//!
//! HTTP endpoint definitions.

use axum::{
    extract::{Extension, Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::{Account, Motif, NewPromotion, NewUser, Promotion, User};
use crate::audit::JournalEntry;
use crate::domain::{DomainError, OperationContext, PromotionChanges, UserChanges};
use crate::error::{AppError, AppResult};
use crate::handlers::{
    CancelTransferCommand, DepositCommand, InitiateTransferCommand, MotifCommand,
    OpenAccountCommand, TransferView,
};
use crate::policy::Policy;

use super::middleware::REQUEST_USER_HEADER;
use super::AppState;

pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

// =========================================================================
// Request/Response types
// =========================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct InitiateTransferResponse {
    pub transfer: TransferView,
    /// Plaintext operation code; only present on first creation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteTransferRequest {
    pub operation_code: String,
}

// =========================================================================
// API Router
// =========================================================================

/// Create the API router
pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/users", post(register_user))
        .route(
            "/users/:user_id",
            get(get_user).patch(update_user).delete(delete_user),
        )
        .route("/accounts", post(open_account))
        .route("/accounts/:account_id", get(get_account).delete(delete_account))
        .route("/accounts/:account_id/deposit", post(deposit))
        .route("/motifs", get(list_motifs).post(create_motif))
        .route(
            "/motifs/:motif_id",
            get(get_motif).patch(relabel_motif).delete(delete_motif),
        )
        .route("/promotions", get(list_promotions).post(create_promotion))
        .route(
            "/promotions/:promotion_id",
            get(get_promotion).patch(update_promotion).delete(delete_promotion),
        )
        .route("/transfers", post(initiate_transfer))
        .route("/transfers/:transfer_id", get(get_transfer))
        .route("/transfers/:transfer_id/dispatch", post(dispatch_transfer))
        .route("/transfers/:transfer_id/complete", post(complete_transfer))
        .route("/transfers/:transfer_id/cancel", post(cancel_transfer))
        .route("/policy", get(get_policy))
        .route("/journal/:resource_id", get(get_journal))
}

/// Mutating routes need an identified actor
fn require_request_user(context: &OperationContext) -> AppResult<()> {
    if context.actor.is_none() {
        return Err(AppError::MissingHeader(REQUEST_USER_HEADER.to_string()));
    }
    Ok(())
}

// =========================================================================
// Users
// =========================================================================

async fn register_user(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<NewUser>,
) -> AppResult<(StatusCode, Json<User>)> {
    require_request_user(&context)?;
    let user = state.users().register(request, &context).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<User>> {
    Ok(Json(state.users().get(user_id).await?))
}

async fn update_user(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(user_id): Path<Uuid>,
    Json(changes): Json<UserChanges>,
) -> AppResult<Json<User>> {
    require_request_user(&context)?;
    Ok(Json(state.users().update(user_id, changes, &context).await?))
}

async fn delete_user(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(user_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_request_user(&context)?;
    state.users().delete(user_id, &context).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =========================================================================
// Accounts
// =========================================================================

async fn open_account(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(command): Json<OpenAccountCommand>,
) -> AppResult<(StatusCode, Json<Account>)> {
    require_request_user(&context)?;
    let account = state.accounts().open(command, &context).await?;
    Ok((StatusCode::CREATED, Json(account)))
}

async fn get_account(
    State(state): State<AppState>,
    Path(account_id): Path<Uuid>,
) -> AppResult<Json<Account>> {
    Ok(Json(state.accounts().get(account_id).await?))
}

async fn delete_account(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(account_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_request_user(&context)?;
    state.accounts().delete(account_id, &context).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn deposit(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(account_id): Path<Uuid>,
    Json(command): Json<DepositCommand>,
) -> AppResult<Json<Account>> {
    require_request_user(&context)?;
    Ok(Json(state.accounts().deposit(account_id, command, &context).await?))
}

// =========================================================================
// Motifs
// =========================================================================

async fn list_motifs(State(state): State<AppState>) -> AppResult<Json<Vec<Motif>>> {
    Ok(Json(state.catalog().list_motifs().await?))
}

async fn create_motif(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(command): Json<MotifCommand>,
) -> AppResult<(StatusCode, Json<Motif>)> {
    require_request_user(&context)?;
    let motif = state.catalog().create_motif(&command.label, &context).await?;
    Ok((StatusCode::CREATED, Json(motif)))
}

async fn get_motif(
    State(state): State<AppState>,
    Path(motif_id): Path<Uuid>,
) -> AppResult<Json<Motif>> {
    Ok(Json(state.catalog().get_motif(motif_id).await?))
}

async fn relabel_motif(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(motif_id): Path<Uuid>,
    Json(command): Json<MotifCommand>,
) -> AppResult<Json<Motif>> {
    require_request_user(&context)?;
    Ok(Json(
        state
            .catalog()
            .relabel_motif(motif_id, &command.label, &context)
            .await?,
    ))
}

async fn delete_motif(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(motif_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_request_user(&context)?;
    state.catalog().delete_motif(motif_id, &context).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =========================================================================
// Promotions
// =========================================================================

async fn list_promotions(State(state): State<AppState>) -> AppResult<Json<Vec<Promotion>>> {
    Ok(Json(state.catalog().list_promotions().await?))
}

async fn create_promotion(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Json(request): Json<NewPromotion>,
) -> AppResult<(StatusCode, Json<Promotion>)> {
    require_request_user(&context)?;
    let promotion = state.catalog().create_promotion(request, &context).await?;
    Ok((StatusCode::CREATED, Json(promotion)))
}

async fn get_promotion(
    State(state): State<AppState>,
    Path(promotion_id): Path<Uuid>,
) -> AppResult<Json<Promotion>> {
    Ok(Json(state.catalog().get_promotion(promotion_id).await?))
}

async fn update_promotion(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(promotion_id): Path<Uuid>,
    Json(changes): Json<PromotionChanges>,
) -> AppResult<Json<Promotion>> {
    require_request_user(&context)?;
    Ok(Json(
        state
            .catalog()
            .update_promotion(promotion_id, changes, &context)
            .await?,
    ))
}

async fn delete_promotion(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(promotion_id): Path<Uuid>,
) -> AppResult<StatusCode> {
    require_request_user(&context)?;
    state.catalog().delete_promotion(promotion_id, &context).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =========================================================================
// Transfers
// =========================================================================

async fn initiate_transfer(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    headers: HeaderMap,
    Json(command): Json<InitiateTransferCommand>,
) -> AppResult<(StatusCode, Json<InitiateTransferResponse>)> {
    require_request_user(&context)?;

    let idempotency_key = match headers.get(IDEMPOTENCY_HEADER) {
        Some(value) => Some(
            value
                .to_str()
                .ok()
                .and_then(|s| Uuid::parse_str(s.trim()).ok())
                .ok_or_else(|| {
                    AppError::InvalidRequest(format!("{} must be a UUID", IDEMPOTENCY_HEADER))
                })?,
        ),
        None => None,
    };

    let receipt = state
        .transfers()
        .initiate(command, idempotency_key, &context)
        .await?;

    // A replay returns the existing transfer without its code
    let status = if receipt.operation_code.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((
        status,
        Json(InitiateTransferResponse {
            transfer: TransferView::from(&receipt.transfer),
            operation_code: receipt.operation_code,
        }),
    ))
}

async fn get_transfer(
    State(state): State<AppState>,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<Json<TransferView>> {
    let transfer = state.transfers().get(transfer_id).await?;
    Ok(Json(TransferView::from(&transfer)))
}

async fn dispatch_transfer(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(transfer_id): Path<Uuid>,
) -> AppResult<Json<TransferView>> {
    require_request_user(&context)?;
    let transfer = state.transfers().dispatch(transfer_id, &context).await?;
    Ok(Json(TransferView::from(&transfer)))
}

async fn complete_transfer(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(transfer_id): Path<Uuid>,
    Json(request): Json<CompleteTransferRequest>,
) -> AppResult<Json<TransferView>> {
    require_request_user(&context)?;
    let engine = state.transfers();

    if !engine
        .verify_operation_code(transfer_id, &request.operation_code)
        .await?
    {
        return Err(DomainError::validation("invalid operation code").into());
    }

    let transfer = engine.complete(transfer_id, &context).await?;
    Ok(Json(TransferView::from(&transfer)))
}

async fn cancel_transfer(
    State(state): State<AppState>,
    Extension(context): Extension<OperationContext>,
    Path(transfer_id): Path<Uuid>,
    Json(command): Json<CancelTransferCommand>,
) -> AppResult<Json<TransferView>> {
    require_request_user(&context)?;
    let transfer = state
        .transfers()
        .cancel(transfer_id, &command.reason, &context)
        .await?;
    Ok(Json(TransferView::from(&transfer)))
}

// =========================================================================
// Policy & journal
// =========================================================================

async fn get_policy(State(state): State<AppState>) -> Json<Policy> {
    Json(state.policy.as_ref().clone())
}

async fn get_journal(
    State(state): State<AppState>,
    Path(resource_id): Path<Uuid>,
) -> AppResult<Json<Vec<JournalEntry>>> {
    Ok(Json(state.store.journal_for(resource_id).await?))
}
