//! Commission computation
//!
//! `total = round(amount × rate × (100 − promotion) / 10000)`. Operator and
//! expeditor parts are rounded from the total; the payer takes the
//! remainder, so the parts always add up to the total.

use crate::domain::{round_money, Amount, CommissionBreakdown, Percentage};

use super::Policy;

pub fn compute_commission(
    policy: &Policy,
    amount: &Amount,
    promotion: Option<Percentage>,
) -> CommissionBreakdown {
    let base = policy.commission_rate.of(amount.value());
    let discounted = match promotion {
        Some(discount) => base - discount.of(base),
        None => base,
    };
    let total = round_money(discounted);

    let operator = round_money(policy.operator_part.of(total));
    let expeditor = round_money(policy.expeditor_part.of(total)).min(total - operator);
    let payer = total - operator - expeditor;

    CommissionBreakdown {
        total,
        operator,
        expeditor,
        payer,
    }
}
