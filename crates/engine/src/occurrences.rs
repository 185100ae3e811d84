//! Occurrence matcher.
//!
//! A resource period may fold several due dates of its resource (four weekly
//! bills inside one monthly period, for example). The matcher keeps three
//! parallel arrays on the period and rebuilds them from scratch from the full
//! set of linked payments on every run, so the same inputs always produce the
//! same arrays and callers can skip unchanged writes.

use chrono::{DateTime, Datelike, Months, NaiveDate, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    calendar,
    resources::{Frequency, RecurringResource, ResourceKind},
};

/// Default distance, in calendar days, between a payment and the due date it
/// may settle.
pub const DEFAULT_TOLERANCE_DAYS: i64 = 3;

/// Distance above which an accepted match is logged as ambiguous.
const AMBIGUOUS_DISTANCE_DAYS: i64 = 1;

/// Upper bound on generated due dates per period.
const MAX_OCCURRENCES: usize = 64;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OccurrenceState {
    pub due_dates: Vec<DateTime<Utc>>,
    pub paid_flags: Vec<bool>,
    pub transaction_ids: Vec<Option<String>>,
}

impl OccurrenceState {
    /// Fresh, unpaid state for the given due dates.
    pub fn unpaid(due_dates: Vec<DateTime<Utc>>) -> Self {
        let len = due_dates.len();
        Self {
            due_dates,
            paid_flags: vec![false; len],
            transaction_ids: vec![None; len],
        }
    }

    pub fn is_empty(&self) -> bool {
        self.due_dates.is_empty()
    }

    pub fn paid_count(&self) -> usize {
        self.paid_flags.iter().filter(|paid| **paid).count()
    }

    pub fn len(&self) -> usize {
        self.due_dates.len()
    }
}

/// A payment linked to a period, as seen by the matcher.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Payment {
    pub transaction_id: String,
    pub occurred_at: DateTime<Utc>,
}

/// Due dates of `resource` falling inside `[start, end]`.
///
/// Budgets have none. Outflows and inflows step from an anchor: the start
/// date when set, else the period start. Monthly, quarterly and yearly
/// resources land on `due_day` (clamped to the month length) when one is
/// configured.
pub fn due_dates(
    resource: &RecurringResource,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> Vec<DateTime<Utc>> {
    if resource.kind() == ResourceKind::Budget {
        return Vec::new();
    }
    let anchor = resource.start_date.unwrap_or(start).date_naive();
    let (first, last) = (start.date_naive(), end.date_naive());

    let mut out = Vec::new();
    match resource.frequency {
        Frequency::Weekly => stepped_by_days(anchor, 7, first, last, &mut out),
        Frequency::BiWeekly => stepped_by_days(anchor, 14, first, last, &mut out),
        Frequency::Monthly => stepped_by_months(anchor, 1, resource.due_day(), first, last, &mut out),
        Frequency::Quarterly => stepped_by_months(anchor, 3, resource.due_day(), first, last, &mut out),
        Frequency::Yearly => stepped_by_months(anchor, 12, resource.due_day(), first, last, &mut out),
    }
    out.into_iter().map(calendar::start_of_day).collect()
}

fn stepped_by_days(
    anchor: NaiveDate,
    step: i64,
    first: NaiveDate,
    last: NaiveDate,
    out: &mut Vec<NaiveDate>,
) {
    // First step index at or after `first`.
    let offset = (first - anchor).num_days();
    let k = if offset <= 0 { 0 } else { (offset + step - 1) / step };
    let mut day = anchor + TimeDelta::days(k * step);
    while day <= last && out.len() < MAX_OCCURRENCES {
        out.push(day);
        day += TimeDelta::days(step);
    }
}

fn stepped_by_months(
    anchor: NaiveDate,
    step: u32,
    due_day: Option<u32>,
    first: NaiveDate,
    last: NaiveDate,
    out: &mut Vec<NaiveDate>,
) {
    let day = due_day.unwrap_or_else(|| anchor.day()).clamp(1, 31);
    let Some(base) = anchor.with_day(1) else {
        return;
    };
    let mut k = 0;
    loop {
        let Some(month) = base.checked_add_months(Months::new(k * step)) else {
            return;
        };
        let Ok(month_last) = calendar::last_day_of_month(month.year(), month.month()) else {
            return;
        };
        let due = month_last
            .with_day(day.min(month_last.day()))
            .unwrap_or(month_last);
        if due > last || out.len() >= MAX_OCCURRENCES {
            return;
        }
        if due >= first {
            out.push(due);
        }
        k += 1;
    }
}

/// Matches payments to due dates.
///
/// Payments are visited in `(date, transaction id)` order. Each one settles
/// the closest still unpaid due date no more than `tolerance_days` calendar
/// days away; ties go to the earlier due date. With no due dates this returns
/// an empty state.
pub fn match_occurrences(
    due_dates: &[DateTime<Utc>],
    payments: &[Payment],
    tolerance_days: i64,
) -> OccurrenceState {
    let mut dates = due_dates.to_vec();
    dates.sort();
    dates.dedup();
    let mut state = OccurrenceState::unpaid(dates);
    if state.is_empty() {
        return state;
    }

    let mut ordered: Vec<&Payment> = payments.iter().collect();
    ordered.sort_by(|a, b| {
        a.occurred_at
            .cmp(&b.occurred_at)
            .then_with(|| a.transaction_id.cmp(&b.transaction_id))
    });

    for payment in ordered {
        let paid_on = payment.occurred_at.date_naive();
        let best = state
            .due_dates
            .iter()
            .enumerate()
            .filter(|(idx, _)| !state.paid_flags[*idx])
            .map(|(idx, due)| (idx, (paid_on - due.date_naive()).num_days().abs()))
            .filter(|(_, distance)| *distance <= tolerance_days)
            .min_by_key(|(idx, distance)| (*distance, *idx));

        let Some((idx, distance)) = best else {
            tracing::debug!(
                transaction_id = %payment.transaction_id,
                "payment matches no occurrence within tolerance"
            );
            continue;
        };
        if distance > AMBIGUOUS_DISTANCE_DAYS {
            tracing::warn!(
                transaction_id = %payment.transaction_id,
                due_date = %state.due_dates[idx],
                distance_days = distance,
                "accepting distant occurrence match"
            );
        }
        state.paid_flags[idx] = true;
        state.transaction_ids[idx] = Some(payment.transaction_id.clone());
    }
    state
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use crate::{Currency, Money, resources::ResourceDetails};

    use super::*;

    fn day(m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, m, d, 0, 0, 0).unwrap()
    }

    fn pay(id: &str, at: DateTime<Utc>) -> Payment {
        Payment {
            transaction_id: id.to_string(),
            occurred_at: at,
        }
    }

    fn bill(frequency: Frequency, start: DateTime<Utc>, due_day: Option<u32>) -> RecurringResource {
        let mut bill = RecurringResource::new(
            "alice",
            "Gym",
            Money::new(4_000),
            Currency::Usd,
            frequency,
            ResourceDetails::Outflow {
                merchant: None,
                due_day,
                is_essential: false,
            },
            start,
        );
        bill.start_date = Some(start);
        bill
    }

    #[test]
    fn weekly_bill_folds_into_a_monthly_period() {
        let bill = bill(Frequency::Weekly, day(1, 3), None);
        let dates = due_dates(&bill, day(3, 1), day(3, 31) + TimeDelta::hours(23));
        assert_eq!(dates, vec![day(3, 7), day(3, 14), day(3, 21), day(3, 28)]);
    }

    #[test]
    fn monthly_due_day_is_clamped() {
        let bill = bill(Frequency::Monthly, day(1, 1), Some(31));
        let dates = due_dates(&bill, day(2, 1), day(4, 30));
        assert_eq!(dates, vec![day(2, 28), day(3, 31), day(4, 30)]);
    }

    #[test]
    fn nothing_before_the_anchor() {
        let bill = bill(Frequency::Quarterly, day(6, 10), None);
        assert!(due_dates(&bill, day(1, 1), day(5, 31)).is_empty());
        assert_eq!(due_dates(&bill, day(9, 1), day(9, 30)), vec![day(9, 10)]);
    }

    #[test]
    fn matches_closest_within_tolerance() {
        let dues = [day(3, 7), day(3, 14), day(3, 21), day(3, 28)];
        let payments = [
            pay("a", day(3, 8)),
            pay("b", day(3, 13)),
            pay("c", day(3, 24)),
        ];
        let state = match_occurrences(&dues, &payments, DEFAULT_TOLERANCE_DAYS);
        assert_eq!(state.paid_flags, vec![true, true, true, false]);
        assert_eq!(state.transaction_ids[2].as_deref(), Some("c"));
        assert_eq!(state.paid_count(), 3);
    }

    #[test]
    fn four_days_away_is_never_matched() {
        let dues = [day(3, 10)];
        let state = match_occurrences(
            &dues,
            &[pay("late", day(3, 14)), pay("early", day(3, 6))],
            DEFAULT_TOLERANCE_DAYS,
        );
        assert_eq!(state.paid_flags, vec![false]);
        assert_eq!(state.transaction_ids, vec![None]);
    }

    #[test]
    fn rerunning_is_deterministic() {
        let dues = [day(3, 21), day(3, 7), day(3, 14)];
        let payments = [pay("z", day(3, 18)), pay("y", day(3, 15)), pay("x", day(3, 6))];
        let first = match_occurrences(&dues, &payments, DEFAULT_TOLERANCE_DAYS);
        let mut reversed = payments.to_vec();
        reversed.reverse();
        let second = match_occurrences(&dues, &reversed, DEFAULT_TOLERANCE_DAYS);
        assert_eq!(first, second);
        assert_eq!(first.transaction_ids[1].as_deref(), Some("y"));
        assert_eq!(first.transaction_ids[2].as_deref(), Some("z"));
    }

    #[test]
    fn no_due_dates_is_a_no_op() {
        let state = match_occurrences(&[], &[pay("a", day(3, 1))], DEFAULT_TOLERANCE_DAYS);
        assert_eq!(state, OccurrenceState::default());
    }
}
