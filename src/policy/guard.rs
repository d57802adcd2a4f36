//! Daily ceiling and threshold checks

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::domain::{DomainError, PolicyDenial};

use super::Policy;

/// Outcome of a policy check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    Allowed,
    Denied(PolicyDenial),
}

impl PolicyDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, PolicyDecision::Allowed)
    }

    pub fn into_result(self) -> Result<(), DomainError> {
        match self {
            PolicyDecision::Allowed => Ok(()),
            PolicyDecision::Denied(denial) => Err(DomainError::PolicyDenied(denial)),
        }
    }
}

impl Policy {
    /// Regular check: ceiling on the single amount, threshold on the
    /// sender's volume for the day including this transfer.
    pub fn check(&self, sender_account_id: Uuid, amount: Decimal, today_cumulative: Decimal) -> PolicyDecision {
        if let PolicyDecision::Denied(denial) = self.check_elevated(sender_account_id, amount) {
            return PolicyDecision::Denied(denial);
        }

        if today_cumulative + amount > self.daily_threshold {
            tracing::info!(
                sender_account_id = %sender_account_id,
                %amount,
                %today_cumulative,
                threshold = %self.daily_threshold,
                "Daily threshold exceeded"
            );
            return PolicyDecision::Denied(PolicyDenial::ThresholdExceeded {
                cumulative: today_cumulative,
                amount,
                threshold: self.daily_threshold,
            });
        }

        PolicyDecision::Allowed
    }

    /// Check with elevated approval: only the hard ceiling applies.
    pub fn check_elevated(&self, sender_account_id: Uuid, amount: Decimal) -> PolicyDecision {
        if amount > self.daily_ceiling {
            tracing::info!(
                sender_account_id = %sender_account_id,
                %amount,
                ceiling = %self.daily_ceiling,
                "Daily ceiling exceeded"
            );
            return PolicyDecision::Denied(PolicyDenial::CeilingExceeded {
                amount,
                ceiling: self.daily_ceiling,
            });
        }
        PolicyDecision::Allowed
    }
}
