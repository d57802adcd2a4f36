//! Amount type
//!
//! Domain primitives for monetary values. Every value the ledger stores is a
//! fixed-point decimal with at most two fractional digits, validated at
//! construction so that invalid values cannot exist in the system.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Maximum decimal places (2)
pub const MONEY_SCALE: u32 = 2;

/// Maximum allowed value: ten digits with two decimals
const MAX_AMOUNT: Decimal = Decimal::from_parts(999_999_999, 0, 0, false, 0);

/// Amount represents a validated, strictly positive monetary value.
///
/// # Invariants
/// - Value is always positive (> 0)
/// - Maximum 2 decimal places
/// - Maximum value is 999999999
///
/// # Example
/// ```
/// use rust_decimal::Decimal;
/// use kalante_ledger::domain::Amount;
///
/// let amount = Amount::new(Decimal::new(20000, 2)).unwrap();
/// assert_eq!(amount.value(), Decimal::new(200, 0));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Amount(Decimal);

/// Errors that can occur when creating an Amount, Balance or Percentage
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AmountError {
    #[error("Amount must be positive (got {0})")]
    NotPositive(Decimal),

    #[error("Balance cannot be negative (got {0})")]
    Negative(Decimal),

    #[error("Amount has too many decimal places (max {MONEY_SCALE}, got {0})")]
    TooManyDecimals(u32),

    #[error("Amount exceeds maximum allowed value ({MAX_AMOUNT})")]
    Overflow,

    #[error("Percentage must be between 0 and 100 (got {0})")]
    PercentageOutOfRange(Decimal),

    #[error("Invalid amount format: {0}")]
    ParseError(String),
}

impl Amount {
    /// Create a new Amount with validation.
    ///
    /// # Errors
    /// - `AmountError::NotPositive` if value <= 0
    /// - `AmountError::TooManyDecimals` if more than 2 decimal places
    /// - `AmountError::Overflow` if value exceeds the maximum
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value <= Decimal::ZERO {
            return Err(AmountError::NotPositive(value));
        }

        let value = value.normalize();
        if value.scale() > MONEY_SCALE {
            return Err(AmountError::TooManyDecimals(value.scale()));
        }

        if value > MAX_AMOUNT {
            return Err(AmountError::Overflow);
        }

        Ok(Self(with_money_scale(value)))
    }

    /// Get the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s.trim())
            .map_err(|e| AmountError::ParseError(e.to_string()))?;
        Amount::new(decimal)
    }
}

impl TryFrom<String> for Amount {
    type Error = AmountError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Amount::from_str(&value)
    }
}

impl From<Amount> for String {
    fn from(amount: Amount) -> Self {
        format!("{:.2}", amount.0)
    }
}

/// Balance of a monetary account (zero or positive).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance(Decimal);

impl Balance {
    /// Create a new balance (zero or positive)
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value < Decimal::ZERO {
            return Err(AmountError::Negative(value));
        }

        let value = value.normalize();
        if value.scale() > MONEY_SCALE {
            return Err(AmountError::TooManyDecimals(value.scale()));
        }

        Ok(Self(with_money_scale(value)))
    }

    /// Create a zero balance
    pub fn zero() -> Self {
        Self(with_money_scale(Decimal::ZERO))
    }

    /// Get the underlying value
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Check if balance covers a withdrawal
    pub fn is_sufficient_for(&self, amount: &Amount) -> bool {
        self.0 >= amount.value()
    }

    /// Add amount to balance
    pub fn credit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        Balance::new(self.0 + amount.value())
    }

    /// Subtract amount from balance
    pub fn debit(&self, amount: &Amount) -> Result<Balance, AmountError> {
        Balance::new(self.0 - amount.value())
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl Default for Balance {
    fn default() -> Self {
        Self::zero()
    }
}

/// A percentage in the closed range [0, 100] with at most two decimals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Percentage(Decimal);

impl Percentage {
    pub fn new(value: Decimal) -> Result<Self, AmountError> {
        if value < Decimal::ZERO || value > Decimal::ONE_HUNDRED {
            return Err(AmountError::PercentageOutOfRange(value));
        }
        let value = value.normalize();
        if value.scale() > MONEY_SCALE {
            return Err(AmountError::TooManyDecimals(value.scale()));
        }
        Ok(Self(value))
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Apply this percentage to a value, without rounding.
    pub fn of(&self, value: Decimal) -> Decimal {
        value * self.0 / Decimal::ONE_HUNDRED
    }
}

impl TryFrom<Decimal> for Percentage {
    type Error = AmountError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Percentage::new(value)
    }
}

impl From<Percentage> for Decimal {
    fn from(p: Percentage) -> Self {
        p.0
    }
}

impl FromStr for Percentage {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let decimal = Decimal::from_str(s.trim())
            .map_err(|e| AmountError::ParseError(e.to_string()))?;
        Percentage::new(decimal)
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Round a computed monetary value to two places, half away from zero.
pub fn round_money(value: Decimal) -> Decimal {
    with_money_scale(value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero))
}

fn with_money_scale(mut value: Decimal) -> Decimal {
    value.rescale(MONEY_SCALE);
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_amount_positive() {
        let amount = Amount::new(dec!(100)).unwrap();
        assert_eq!(amount.value(), dec!(100.00));
        assert_eq!(amount.to_string(), "100.00");
    }

    #[test]
    fn test_amount_zero_rejected() {
        let amount = Amount::new(Decimal::ZERO);
        assert!(matches!(amount, Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_negative_rejected() {
        let amount = Amount::new(dec!(-100));
        assert!(matches!(amount, Err(AmountError::NotPositive(_))));
    }

    #[test]
    fn test_amount_too_many_decimals() {
        let amount = Amount::new(dec!(0.125));
        assert!(matches!(amount, Err(AmountError::TooManyDecimals(3))));
    }

    #[test]
    fn test_amount_trailing_zeros_accepted() {
        // 10.500 normalizes to 10.5
        let amount = Amount::new(dec!(10.500)).unwrap();
        assert_eq!(amount.value(), dec!(10.50));
    }

    #[test]
    fn test_amount_overflow() {
        let amount = Amount::new(dec!(1000000000));
        assert!(matches!(amount, Err(AmountError::Overflow)));
    }

    #[test]
    fn test_amount_from_str() {
        let amount: Amount = " 123.45 ".parse().unwrap();
        assert_eq!(amount.value(), dec!(123.45));

        let bad: Result<Amount, _> = "abc".parse();
        assert!(matches!(bad, Err(AmountError::ParseError(_))));
    }

    #[test]
    fn test_amount_serializes_as_string() {
        let amount = Amount::new(dec!(5)).unwrap();
        let json = serde_json::to_string(&amount).unwrap();
        assert_eq!(json, r#""5.00""#);
    }

    #[test]
    fn test_balance_credit_debit() {
        let balance = Balance::zero();
        let amount = Amount::new(dec!(100)).unwrap();

        let balance = balance.credit(&amount).unwrap();
        assert_eq!(balance.value(), dec!(100));

        let withdraw = Amount::new(dec!(30.25)).unwrap();
        let balance = balance.debit(&withdraw).unwrap();
        assert_eq!(balance.value(), dec!(69.75));
    }

    #[test]
    fn test_balance_insufficient() {
        let balance = Balance::new(dec!(50)).unwrap();
        let amount = Amount::new(dec!(100)).unwrap();

        assert!(!balance.is_sufficient_for(&amount));
        assert!(matches!(balance.debit(&amount), Err(AmountError::Negative(_))));
    }

    #[test]
    fn test_percentage_bounds() {
        assert!(Percentage::new(dec!(0)).is_ok());
        assert!(Percentage::new(dec!(100)).is_ok());
        assert!(matches!(
            Percentage::new(dec!(100.01)),
            Err(AmountError::PercentageOutOfRange(_))
        ));
        assert!(matches!(
            Percentage::new(dec!(-1)),
            Err(AmountError::PercentageOutOfRange(_))
        ));
    }

    #[test]
    fn test_percentage_of() {
        let p = Percentage::new(dec!(5)).unwrap();
        assert_eq!(p.of(dec!(200)), dec!(10));
    }

    #[test]
    fn test_round_money_half_away_from_zero() {
        assert_eq!(round_money(dec!(0.005)), dec!(0.01));
        assert_eq!(round_money(dec!(1.994)), dec!(1.99));
    }
}
