use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
};

use serde::{Deserialize, Serialize};

use crate::Currency;

/// Signed money amount represented as integer **minor units**.
///
/// Use this type for every persisted monetary value (base amounts, allocated
/// amounts, running totals) to avoid floating-point drift. Fractional values
/// only exist transiently inside the allocation calculator.
///
/// # Examples
///
/// ```rust
/// use engine::{Currency, Money};
///
/// let amount = Money::new(12_34);
/// assert_eq!(amount.minor(), 1234);
/// assert_eq!(amount.display(Currency::Usd), "$12.34");
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Creates a new amount from integer minor units.
    #[must_use]
    pub const fn new(minor: i64) -> Self {
        Self(minor)
    }

    /// Returns the raw value in minor units.
    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }

    /// Returns `true` if the amount is 0.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if the amount is positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Returns `true` if the amount is negative.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Saturating clamp at zero, used for "unpaid"/"remaining" style totals.
    #[must_use]
    pub fn non_negative(self) -> Money {
        Money(self.0.max(0))
    }

    /// Formats the amount with the currency symbol, e.g. `-$10.50`.
    #[must_use]
    pub fn display(self, currency: Currency) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per_major = currency.minor_per_major().unsigned_abs();
        let width = usize::from(currency.minor_units());
        format!(
            "{sign}{}{}.{:0width$}",
            currency.symbol(),
            abs / per_major,
            abs % per_major
        )
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for Money {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Money> for i64 {
    fn from(value: Money) -> Self {
        value.0
    }
}

impl Add for Money {
    type Output = Money;

    fn add(self, rhs: Money) -> Self::Output {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Money) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Money;

    fn sub(self, rhs: Money) -> Self::Output {
        Money(self.0 - rhs.0)
    }
}

impl SubAssign for Money {
    fn sub_assign(&mut self, rhs: Money) {
        self.0 -= rhs.0;
    }
}

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Self::Output {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_formats_usd() {
        assert_eq!(Money::new(0).display(Currency::Usd), "$0.00");
        assert_eq!(Money::new(1).display(Currency::Usd), "$0.01");
        assert_eq!(Money::new(10).display(Currency::Usd), "$0.10");
        assert_eq!(Money::new(1050).display(Currency::Usd), "$10.50");
        assert_eq!(Money::new(-1050).display(Currency::Usd), "-$10.50");
    }

    #[test]
    fn non_negative_clamps() {
        assert_eq!(Money::new(-5).non_negative(), Money::ZERO);
        assert_eq!(Money::new(5).non_negative(), Money::new(5));
    }
}
