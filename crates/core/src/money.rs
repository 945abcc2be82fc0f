//! Money in integer minor units.
//!
//! Amounts are whole cents so totals, discounts and webhook amounts compare
//! exactly.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Supported settlement currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Zar,
    Usd,
    Eur,
    Gbp,
}

impl Currency {
    pub fn code(&self) -> &'static str {
        match self {
            Currency::Zar => "ZAR",
            Currency::Usd => "USD",
            Currency::Eur => "EUR",
            Currency::Gbp => "GBP",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            Currency::Zar => "R",
            Currency::Usd => "$",
            Currency::Eur => "\u{20ac}",
            Currency::Gbp => "\u{00a3}",
        }
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for Currency {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ZAR" => Ok(Currency::Zar),
            "USD" => Ok(Currency::Usd),
            "EUR" => Ok(Currency::Eur),
            "GBP" => Ok(Currency::Gbp),
            other => Err(DomainError::validation(
                "currency",
                format!("unsupported currency '{other}'"),
            )),
        }
    }
}

/// A monetary value with currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Money {
    /// Amount in smallest currency unit (cents).
    pub amount_cents: i64,
    pub currency: Currency,
}

impl Money {
    pub fn new(amount_cents: i64, currency: Currency) -> Self {
        Self {
            amount_cents,
            currency,
        }
    }

    pub fn zero(currency: Currency) -> Self {
        Self::new(0, currency)
    }

    pub fn is_zero(&self) -> bool {
        self.amount_cents == 0
    }

    pub fn is_positive(&self) -> bool {
        self.amount_cents > 0
    }

    fn same_currency(&self, other: &Money) -> DomainResult<()> {
        if self.currency == other.currency {
            Ok(())
        } else {
            Err(DomainError::invariant(format!(
                "currency mismatch: {} vs {}",
                self.currency, other.currency
            )))
        }
    }

    pub fn checked_add(&self, other: &Money) -> DomainResult<Money> {
        self.same_currency(other)?;
        self.amount_cents
            .checked_add(other.amount_cents)
            .map(|a| Money::new(a, self.currency))
            .ok_or_else(|| DomainError::invariant("money overflow"))
    }

    pub fn checked_sub(&self, other: &Money) -> DomainResult<Money> {
        self.same_currency(other)?;
        self.amount_cents
            .checked_sub(other.amount_cents)
            .map(|a| Money::new(a, self.currency))
            .ok_or_else(|| DomainError::invariant("money overflow"))
    }

    /// Unit price times quantity.
    pub fn times(&self, quantity: u32) -> DomainResult<Money> {
        self.amount_cents
            .checked_mul(i64::from(quantity))
            .map(|a| Money::new(a, self.currency))
            .ok_or_else(|| DomainError::invariant("money overflow"))
    }

    /// Share of this amount expressed in basis points (1/100 of a percent),
    /// rounded half away from zero.
    pub fn basis_points(&self, bps: u32) -> Money {
        let raw = i128::from(self.amount_cents) * i128::from(bps);
        let half = if raw >= 0 { 5_000 } else { -5_000 };
        let cents = (raw + half) / 10_000;
        Money::new(cents as i64, self.currency)
    }

    pub fn min(self, other: Money) -> Money {
        if other.amount_cents < self.amount_cents {
            other
        } else {
            self
        }
    }

    /// Human readable string, e.g. `R 149.99`.
    pub fn display(&self) -> String {
        let sign = if self.amount_cents < 0 { "-" } else { "" };
        let abs = self.amount_cents.unsigned_abs();
        format!(
            "{sign}{} {}.{:02}",
            self.currency.symbol(),
            abs / 100,
            abs % 100
        )
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn zar(c: i64) -> Money {
        Money::new(c, Currency::Zar)
    }

    #[test]
    fn add_and_sub_same_currency() {
        assert_eq!(zar(150).checked_add(&zar(50)).unwrap(), zar(200));
        assert_eq!(zar(150).checked_sub(&zar(200)).unwrap(), zar(-50));
    }

    #[test]
    fn currency_mismatch_is_rejected() {
        let usd = Money::new(100, Currency::Usd);
        assert!(matches!(
            zar(100).checked_add(&usd),
            Err(DomainError::InvariantViolation(_))
        ));
    }

    #[test]
    fn basis_points_round_half_up() {
        // 10% of 1.05 = 0.105 -> 0.11
        assert_eq!(zar(105).basis_points(1_000), zar(11));
        // 15% of 9.99 = 1.4985 -> 1.50
        assert_eq!(zar(999).basis_points(1_500), zar(150));
        assert_eq!(zar(999).basis_points(10_000), zar(999));
    }

    #[test]
    fn display_formats_cents() {
        assert_eq!(zar(14_999).display(), "R 149.99");
        assert_eq!(zar(-5).display(), "-R 0.05");
    }

    #[test]
    fn parse_currency_is_case_insensitive() {
        assert_eq!("zar".parse::<Currency>().unwrap(), Currency::Zar);
        assert!("XYZ".parse::<Currency>().is_err());
    }

    proptest! {
        #[test]
        fn basis_points_never_exceed_amount(amount in 0i64..10_000_000, bps in 0u32..=10_000) {
            let part = zar(amount).basis_points(bps);
            prop_assert!(part.amount_cents >= 0);
            prop_assert!(part.amount_cents <= amount);
        }
    }
}
