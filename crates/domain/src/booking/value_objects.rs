//! Value objects for the booking domain.

use serde::{Deserialize, Serialize};

/// Money amount in minor units (cents) to avoid floating point issues.
///
/// Currency lives on the request that carries the amount; the coordination
/// layer only compares and forwards amounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money {
    /// Amount in minor units (e.g., 1000 = 10.00)
    cents: i64,
}

impl Money {
    /// Creates a new Money amount from minor units.
    pub fn from_cents(cents: i64) -> Self {
        Self { cents }
    }

    /// Creates a new Money amount from whole units.
    pub fn from_units(units: i64) -> Self {
        Self { cents: units * 100 }
    }

    /// Returns zero money.
    pub fn zero() -> Self {
        Self { cents: 0 }
    }

    /// Returns the amount in minor units.
    pub fn cents(&self) -> i64 {
        self.cents
    }

    /// Returns true if the amount is positive.
    pub fn is_positive(&self) -> bool {
        self.cents > 0
    }

    /// Formats as a plain decimal string (`"1500.00"`), the form payment
    /// gateways sign over.
    pub fn to_decimal_string(&self) -> String {
        let sign = if self.cents < 0 { "-" } else { "" };
        let abs = self.cents.unsigned_abs();
        format!("{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::zero()
    }
}

impl std::fmt::Display for Money {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_decimal_string())
    }
}

impl std::ops::Add for Money {
    type Output = Money;

    fn add(self, rhs: Self) -> Self::Output {
        Money {
            cents: self.cents + rhs.cents,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_units() {
        assert_eq!(Money::from_units(15).cents(), 1500);
    }

    #[test]
    fn test_decimal_string() {
        assert_eq!(Money::from_cents(150_000_00).to_decimal_string(), "150000.00");
        assert_eq!(Money::from_cents(5).to_decimal_string(), "0.05");
        assert_eq!(Money::from_cents(-1250).to_decimal_string(), "-12.50");
    }

    #[test]
    fn test_positive() {
        assert!(Money::from_cents(1).is_positive());
        assert!(!Money::zero().is_positive());
    }

    #[test]
    fn test_add() {
        assert_eq!(Money::from_cents(250) + Money::from_cents(750), Money::from_units(10));
    }
}
