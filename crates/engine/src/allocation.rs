//! Allocation calculator.
//!
//! A resource's base amount is always a monthly-equivalent figure. The
//! amount allocated to a period depends on the target period type only:
//!
//! | target      | allocation                |
//! |-------------|---------------------------|
//! | monthly     | `base`                    |
//! | bi-monthly  | `base * 0.5`              |
//! | weekly      | `base * 7 / 30.44`        |
//!
//! The fractions are fixed constants and intentionally ignore the actual day
//! count of the target period, so historical amounts stay stable when they
//! are recomputed.
//!
//! [`allocate`] returns unrounded minor units. Callers round exactly once,
//! when the value is persisted ([`to_persisted`]).

use crate::{Money, PeriodType, source_periods::SourcePeriod};

/// Average month length used for weekly allocations.
pub const AVERAGE_MONTH_DAYS: f64 = 30.44;
/// Share of the monthly base assigned to one week.
pub const WEEKLY_FRACTION: f64 = 7.0 / AVERAGE_MONTH_DAYS;
/// Share of the monthly base assigned to one half-month.
pub const BI_MONTHLY_FRACTION: f64 = 0.5;

/// Fraction of the monthly base amount assigned to a period of `target` type.
#[must_use]
pub fn fraction(target: PeriodType) -> f64 {
    match target {
        PeriodType::Monthly => 1.0,
        PeriodType::BiMonthly => BI_MONTHLY_FRACTION,
        PeriodType::Weekly => WEEKLY_FRACTION,
    }
}

/// Proportional amount (in unrounded minor units) of `base` for `period`.
///
/// `target` wins over the period's own type tag; the two only differ when a
/// caller deliberately projects onto a foreign grid.
#[must_use]
pub fn allocate(base: Money, target: PeriodType, _period: &SourcePeriod) -> f64 {
    base.minor() as f64 * fraction(target)
}

/// Rounds an allocation to whole minor units (half away from zero).
#[must_use]
pub fn to_persisted(amount: f64) -> Money {
    Money::new(amount.round() as i64)
}

/// Convenience for `to_persisted(allocate(..))` on the period's own type.
#[must_use]
pub fn allocated_for(base: Money, period: &SourcePeriod) -> Money {
    to_persisted(allocate(base, period.period_type, period))
}

/// Persisted allocation for any period of type `target`.
#[must_use]
pub fn allocated_for_type(base: Money, target: PeriodType) -> Money {
    to_persisted(base.minor() as f64 * fraction(target))
}

#[cfg(test)]
mod tests {
    use crate::calendar;

    use super::*;

    #[test]
    fn fractions_do_not_depend_on_day_count() {
        let periods = calendar::generate(2024, 2025).unwrap();
        let base = Money::new(100_000);
        for period in &periods {
            let amount = allocate(base, period.period_type, period);
            let expected = match period.period_type {
                PeriodType::Monthly => 100_000.0,
                PeriodType::BiMonthly => 50_000.0,
                PeriodType::Weekly => 100_000.0 * 7.0 / 30.44,
            };
            assert!((amount - expected).abs() < 1e-9, "{}", period.id);
        }
    }

    #[test]
    fn target_type_overrides_period_type() {
        let periods = calendar::generate(2025, 2025).unwrap();
        let monthly = periods
            .iter()
            .find(|p| p.period_type == PeriodType::Monthly)
            .unwrap();
        let weekly = allocate(Money::new(3044), PeriodType::Weekly, monthly);
        assert!((weekly - 700.0).abs() < 1e-9);
    }

    #[test]
    fn rounding_happens_once_at_persistence() {
        let periods = calendar::generate(2025, 2025).unwrap();
        let week = periods
            .iter()
            .find(|p| p.period_type == PeriodType::Weekly)
            .unwrap();
        // $1000 a month is $229.96 a week.
        assert_eq!(allocated_for(Money::new(100_000), week), Money::new(22_996));
        assert_eq!(to_persisted(0.5), Money::new(1));
        assert_eq!(to_persisted(-0.5), Money::new(-1));
    }
}
