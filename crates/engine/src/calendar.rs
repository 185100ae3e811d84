//! Calendar generator.
//!
//! Produces the canonical grid of [`SourcePeriod`]s for a range of years.
//! The generator is a pure function: identical inputs always produce
//! identical ids and boundaries, so persisting its output is an idempotent
//! upsert by id.
//!
//! Weekly periods start on Sunday. Each year is walked independently from
//! Jan 1: the first week is clipped to start on Jan 1, the last one to end
//! on Dec 31, so every year's weekly set covers the year exactly and a week
//! straddling New Year is represented once in each year's sequence.

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveTime, TimeDelta, Utc};

use crate::{
    EngineError, PeriodType, ResultEngine,
    source_periods::{MonthHalf, SourcePeriod},
};

/// Smallest and largest years the generator accepts.
pub const MIN_YEAR: i32 = 1970;
pub const MAX_YEAR: i32 = 9998;

/// Generates every monthly, bi-monthly and weekly source period for the
/// inclusive range `year_start..=year_end`.
///
/// The output is ordered by year, then type (monthly, bi-monthly, weekly),
/// then start date.
pub fn generate(year_start: i32, year_end: i32) -> ResultEngine<Vec<SourcePeriod>> {
    if year_start > year_end {
        return Err(EngineError::InvalidPeriod(format!(
            "year range {year_start}..={year_end} is empty"
        )));
    }
    if year_start < MIN_YEAR || year_end > MAX_YEAR {
        return Err(EngineError::InvalidPeriod(format!(
            "years must be within {MIN_YEAR}..={MAX_YEAR}"
        )));
    }

    let mut out = Vec::with_capacity(((year_end - year_start + 1) * 90) as usize);
    for year in year_start..=year_end {
        out.extend(monthly(year)?);
        out.extend(bi_monthly(year)?);
        out.extend(weekly(year)?);
    }
    Ok(out)
}

fn monthly(year: i32) -> ResultEngine<Vec<SourcePeriod>> {
    (1..=12)
        .map(|month| {
            Ok(SourcePeriod {
                id: SourcePeriod::monthly_id(year, month),
                period_type: PeriodType::Monthly,
                year,
                index: month,
                start: start_of_day(date(year, month, 1)?),
                end: end_of_day(last_day_of_month(year, month)?),
                iso_week: None,
            })
        })
        .collect()
}

fn bi_monthly(year: i32) -> ResultEngine<Vec<SourcePeriod>> {
    let mut out = Vec::with_capacity(24);
    for month in 1..=12 {
        let last = last_day_of_month(year, month)?;
        for (half, first_day, last_day, offset) in [
            (MonthHalf::First, date(year, month, 1)?, date(year, month, 15)?, 1),
            (MonthHalf::Second, date(year, month, 16)?, last, 2),
        ] {
            out.push(SourcePeriod {
                id: SourcePeriod::bi_monthly_id(year, month, half),
                period_type: PeriodType::BiMonthly,
                year,
                index: (month - 1) * 2 + offset,
                start: start_of_day(first_day),
                end: end_of_day(last_day),
                iso_week: None,
            });
        }
    }
    Ok(out)
}

fn weekly(year: i32) -> ResultEngine<Vec<SourcePeriod>> {
    let year_last = date(year, 12, 31)?;
    let mut start = date(year, 1, 1)?;
    let mut ordinal = 1;
    let mut out = Vec::with_capacity(54);

    while start <= year_last {
        // Saturday closes the week.
        let to_saturday = 6 - i64::from(start.weekday().num_days_from_sunday());
        let end = (start + TimeDelta::days(to_saturday)).min(year_last);
        out.push(SourcePeriod {
            id: SourcePeriod::weekly_id(year, ordinal),
            period_type: PeriodType::Weekly,
            year,
            index: ordinal,
            start: start_of_day(start),
            end: end_of_day(end),
            iso_week: Some(end.iso_week().week()),
        });
        ordinal += 1;
        start = end + TimeDelta::days(1);
    }
    Ok(out)
}

fn date(year: i32, month: u32, day: u32) -> ResultEngine<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| EngineError::InvalidPeriod(format!("invalid date {year}-{month}-{day}")))
}

pub(crate) fn last_day_of_month(year: i32, month: u32) -> ResultEngine<NaiveDate> {
    let first = date(year, month, 1)?;
    first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or_else(|| EngineError::InvalidPeriod(format!("invalid month {year}-{month}")))
}

/// `00:00:00.000` UTC of `day`.
pub fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

/// `23:59:59.999` UTC of `day`.
pub fn end_of_day(day: NaiveDate) -> DateTime<Utc> {
    start_of_day(day) + TimeDelta::days(1) - TimeDelta::milliseconds(1)
}

/// Adds calendar months, clamping the day to the target month's length.
pub fn add_months(at: DateTime<Utc>, months: u32) -> ResultEngine<DateTime<Utc>> {
    at.checked_add_months(Months::new(months))
        .ok_or_else(|| EngineError::InvalidPeriod(format!("{at} + {months} months overflows")))
}
