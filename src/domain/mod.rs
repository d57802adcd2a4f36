//! Domain module
//!
//! Core domain types and business rules.

pub mod amount;
pub mod context;
pub mod error;
pub mod events;
pub mod types;

pub use amount::{round_money, Amount, AmountError, Balance, Percentage};
pub use context::{Actor, OperationContext};
pub use error::{DomainError, PolicyDenial};
pub use events::{
    AccountEvent, MotifEvent, PromotionChanges, PromotionEvent, TransferEvent, UserChanges,
    UserEvent,
};
pub use types::{
    AccountKind, ActorRole, CommissionBreakdown, PartyDetails, TransferRoute, TransferState,
};
