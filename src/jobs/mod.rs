//! Scheduled Jobs
//!
//! Background jobs for periodic maintenance tasks. The only job cancels
//! open transfers whose operation code validity has elapsed.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use uuid::Uuid;

use crate::db::system_actor;
use crate::domain::OperationContext;
use crate::error::AppError;
use crate::handlers::TransferEngine;

const MIN_EXPIRY_INTERVAL: Duration = Duration::from_secs(1);

// =========================================================================
// Expired operation codes
// =========================================================================

/// Cancel every open transfer whose operation code has expired
pub async fn expire_operation_codes(
    engine: &TransferEngine,
    now: DateTime<Utc>,
) -> Result<Vec<Uuid>, JobError> {
    let context = OperationContext::new()
        .with_actor(system_actor())
        .with_correlation_id(Uuid::new_v4());

    let cancelled = engine.cancel_expired(now, &context).await?;

    if !cancelled.is_empty() {
        tracing::info!(
            transfers_cancelled = cancelled.len(),
            "Cancelled transfers with expired operation codes"
        );
    }

    Ok(cancelled)
}

// =========================================================================
// Job Scheduler
// =========================================================================

/// Configuration for job scheduler
#[derive(Debug, Clone)]
pub struct JobSchedulerConfig {
    /// Interval for the code expiry sweep (default: 1 minute)
    pub expiry_interval: Duration,
}

impl Default for JobSchedulerConfig {
    fn default() -> Self {
        Self {
            expiry_interval: Duration::from_secs(60),
        }
    }
}

/// Job Scheduler - runs periodic maintenance tasks
pub struct JobScheduler {
    engine: TransferEngine,
    config: JobSchedulerConfig,
}

impl JobScheduler {
    pub fn new(engine: TransferEngine) -> Self {
        Self {
            engine,
            config: JobSchedulerConfig::default(),
        }
    }

    pub fn with_config(engine: TransferEngine, config: JobSchedulerConfig) -> Self {
        Self { engine, config }
    }

    /// Start the job scheduler in the background
    /// Returns a handle that can be used to abort the scheduler
    pub fn start(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        tracing::info!(
            expiry_interval_secs = self.config.expiry_interval.as_secs(),
            "Job scheduler started"
        );

        let mut expiry_interval = interval(self.config.expiry_interval.max(MIN_EXPIRY_INTERVAL));
        expiry_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            expiry_interval.tick().await;
            if let Err(e) = expire_operation_codes(&self.engine, Utc::now()).await {
                tracing::error!(error = %e, "Operation code expiry failed");
            }
        }
    }

    /// Run all maintenance jobs once (for manual trigger or testing)
    pub async fn run_all_once(&self, now: DateTime<Utc>) -> MaintenanceReport {
        let mut report = MaintenanceReport::default();

        match expire_operation_codes(&self.engine, now).await {
            Ok(cancelled) => report.transfers_expired = cancelled,
            Err(e) => report.errors.push(format!("Operation code expiry: {}", e)),
        }

        report.completed_at = Utc::now();
        report
    }
}

/// Report from running maintenance jobs
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub transfers_expired: Vec<Uuid>,
    pub errors: Vec<String>,
    pub completed_at: DateTime<Utc>,
}

/// Job execution errors
#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Ledger error: {0}")]
    Ledger(#[from] AppError),
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::{AccountLocks, InMemoryEventStore};
    use crate::policy::tests::policy;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    #[test]
    fn test_job_scheduler_config_default() {
        let config = JobSchedulerConfig::default();
        assert_eq!(config.expiry_interval, Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_run_all_once_on_empty_ledger() {
        let engine = TransferEngine::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(policy(dec!(5000), dec!(2000))),
            Arc::new(AccountLocks::default()),
        );
        let scheduler = JobScheduler::new(engine);

        let report = scheduler.run_all_once(Utc::now()).await;
        assert!(report.transfers_expired.is_empty());
        assert!(report.errors.is_empty());
    }
}
