//! kalante_ledger - money-transfer back office API
//!
//! Event-sourced ledger for accounts, offices and transfers.

use std::net::SocketAddr;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kalante_ledger::api::{build_router, AppState};
use kalante_ledger::db;
use kalante_ledger::event_store::{AccountLocks, EventStore, InMemoryEventStore, PgEventStore};
use kalante_ledger::jobs::{JobScheduler, JobSchedulerConfig};
use kalante_ledger::Config;

/// Initialize tracing/logging; JSON lines in production
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "kalante_ledger=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.is_production());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting kalante_ledger server");

    let (store, pool) = match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");
            let pool = PgPoolOptions::new()
                .max_connections(config.database_max_connections)
                .connect(database_url)
                .await?;

            db::verify_connection(&pool).await?;
            if !db::check_schema(&pool).await? {
                tracing::error!("Database schema is not complete. Please run migrations.");
                return Err(anyhow::anyhow!("Database schema incomplete"));
            }

            tracing::info!("Database connected successfully");
            let store: Arc<dyn EventStore> = Arc::new(PgEventStore::new(pool.clone()));
            (store, Some(pool))
        }
        None => {
            if config.is_production() {
                return Err(anyhow::anyhow!("DATABASE_URL is required in production"));
            }
            tracing::warn!("DATABASE_URL not set, using the in-memory event store");
            let store: Arc<dyn EventStore> = Arc::new(InMemoryEventStore::new());
            (store, None)
        }
    };

    if config.api_key_hashes.is_empty() {
        tracing::warn!("API_KEY_HASHES is empty; every API request will be rejected");
    }

    let policy = Arc::new(config.policy.clone());
    db::bootstrap(store.as_ref(), &policy).await?;

    let state = AppState::new(
        store,
        policy,
        Arc::new(AccountLocks::new(config.lock_wait)),
        config.api_key_hashes.clone(),
    );

    let scheduler = JobScheduler::with_config(
        state.transfers(),
        JobSchedulerConfig {
            expiry_interval: config.expiry_job_interval,
        },
    )
    .start();

    let app = build_router(state);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutting down...");
    scheduler.abort();
    if let Some(pool) = pool {
        pool.close().await;
        tracing::info!("Database connections closed");
    }
    tracing::info!("Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
