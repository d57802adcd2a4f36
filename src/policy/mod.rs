//! Transfer policy
//!
//! Daily limits, commission rate and commission split. Loaded once at
//! startup, validated, then shared read-only as `Arc<Policy>`.

mod commission;
mod guard;

pub use commission::compute_commission;
pub use guard::PolicyDecision;

use chrono::Duration;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{AmountError, Percentage};

/// Longest accepted operation code validity (one year)
pub const MAX_CODE_VALIDITY_HOURS: u32 = 24 * 366;

/// Errors raised while validating a policy
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PolicyError {
    #[error("commission parts sum to {0}, expected 100")]
    PartsDoNotSum(Decimal),

    #[error("daily ceiling {ceiling} is below daily threshold {threshold}")]
    CeilingBelowThreshold { ceiling: Decimal, threshold: Decimal },

    #[error("{0} must be positive")]
    NonPositiveLimit(&'static str),

    #[error("commission rate must be below 100%, got {0}")]
    CommissionRateTooHigh(Decimal),

    #[error("operation code validity must be between 1 and {MAX_CODE_VALIDITY_HOURS} hours, got {0}")]
    InvalidCodeValidity(u32),

    #[error(transparent)]
    Amount(#[from] AmountError),
}

/// Ledger policy
#[derive(Debug, Clone, Serialize)]
pub struct Policy {
    /// Hard cap on a single transfer
    pub daily_ceiling: Decimal,
    /// Cap on a sender's cumulative daily volume without elevated approval
    pub daily_threshold: Decimal,
    pub operator_part: Percentage,
    pub expeditor_part: Percentage,
    pub payer_part: Percentage,
    /// Commission charged on the transfer amount before promotions
    pub commission_rate: Percentage,
    pub code_validity_hours: u32,
    /// Account credited with the operator part
    pub operator_account_id: Uuid,
}

impl Policy {
    /// Build and validate a policy
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        daily_ceiling: Decimal,
        daily_threshold: Decimal,
        operator_part: Percentage,
        expeditor_part: Percentage,
        payer_part: Percentage,
        commission_rate: Percentage,
        code_validity_hours: u32,
        operator_account_id: Uuid,
    ) -> Result<Self, PolicyError> {
        let policy = Self {
            daily_ceiling,
            daily_threshold,
            operator_part,
            expeditor_part,
            payer_part,
            commission_rate,
            code_validity_hours,
            operator_account_id,
        };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.daily_ceiling <= Decimal::ZERO {
            return Err(PolicyError::NonPositiveLimit("daily ceiling"));
        }
        if self.daily_threshold <= Decimal::ZERO {
            return Err(PolicyError::NonPositiveLimit("daily threshold"));
        }
        if self.daily_ceiling < self.daily_threshold {
            return Err(PolicyError::CeilingBelowThreshold {
                ceiling: self.daily_ceiling,
                threshold: self.daily_threshold,
            });
        }

        let parts = self.operator_part.value() + self.expeditor_part.value() + self.payer_part.value();
        if parts != Decimal::ONE_HUNDRED {
            return Err(PolicyError::PartsDoNotSum(parts));
        }

        if self.commission_rate.value() >= Decimal::ONE_HUNDRED {
            return Err(PolicyError::CommissionRateTooHigh(self.commission_rate.value()));
        }
        if self.code_validity_hours == 0 || self.code_validity_hours > MAX_CODE_VALIDITY_HOURS {
            return Err(PolicyError::InvalidCodeValidity(self.code_validity_hours));
        }
        Ok(())
    }

    /// How long an operation code stays valid after sending
    pub fn code_validity(&self) -> Duration {
        Duration::hours(i64::from(self.code_validity_hours))
    }
}
