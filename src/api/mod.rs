//! API module
//!
//! HTTP API endpoints and middleware.

pub mod middleware;
pub mod routes;

pub use routes::create_router;

use axum::{middleware as axum_middleware, routing::get, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::event_store::{AccountLocks, EventStore};
use crate::handlers::{AccountHandler, CatalogHandler, TransferEngine, UserHandler};
use crate::policy::Policy;

/// Shared state handed to every request
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn EventStore>,
    pub policy: Arc<Policy>,
    pub locks: Arc<AccountLocks>,
    /// SHA-256 hex digests of accepted API keys
    pub api_key_hashes: Arc<Vec<String>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn EventStore>,
        policy: Arc<Policy>,
        locks: Arc<AccountLocks>,
        api_key_hashes: Vec<String>,
    ) -> Self {
        Self {
            store,
            policy,
            locks,
            api_key_hashes: Arc::new(api_key_hashes),
        }
    }

    pub fn transfers(&self) -> TransferEngine {
        TransferEngine::new(self.store.clone(), self.policy.clone(), self.locks.clone())
    }

    pub fn accounts(&self) -> AccountHandler {
        AccountHandler::new(
            self.store.clone(),
            self.locks.clone(),
            self.policy.operator_account_id,
        )
    }

    pub fn users(&self) -> UserHandler {
        UserHandler::new(self.store.clone(), self.locks.clone())
    }

    pub fn catalog(&self) -> CatalogHandler {
        CatalogHandler::new(self.store.clone())
    }
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    // Layers run last-added first: logging -> auth -> handler
    let protected_routes = create_router()
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ))
        .layer(axum_middleware::from_fn(middleware::logging_middleware));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", protected_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
