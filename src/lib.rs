//! kalante_ledger Library
//!
//! Money-transfer back office: audited monetary accounts, a transfer state
//! machine with commission splitting, and an event-sourced ledger.

pub mod aggregate;
pub mod api;
pub mod audit;
pub mod config;
pub mod db;
pub mod domain;
pub mod event_store;
pub mod handlers;
pub mod jobs;
pub mod policy;

mod error;

pub use config::Config;
pub use error::{AppError, AppResult, ErrorResponse};
pub use domain::{Amount, AmountError, Balance, DomainError, OperationContext, Percentage};
pub use domain::{AccountEvent, TransferEvent, UserEvent};
pub use policy::Policy;
