//! Source periods: the immutable calendar cells every projection refers to.
//!
//! Ids are a pure function of `(type, year, ordinal)`:
//!
//! - monthly: `2025M01` … `2025M12`
//! - bi-monthly: `2025BM01A` (1st–15th), `2025BM01B` (16th–end of month)
//! - weekly: `2025W01` … (ordinal of the week in the year's walk)

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{EngineError, PeriodType};

/// Version of the calendar conventions (v2: every boundary is strict UTC+0).
pub const CALENDAR_VERSION: i32 = 2;

/// Half of a month for bi-monthly periods.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MonthHalf {
    First,
    Second,
}

impl MonthHalf {
    fn suffix(self) -> char {
        match self {
            Self::First => 'A',
            Self::Second => 'B',
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePeriod {
    pub id: String,
    pub period_type: PeriodType,
    pub year: i32,
    /// Type-specific ordering index: month (1–12), half-month (1–24) or week
    /// ordinal within the year's walk.
    pub index: u32,
    /// Inclusive start, `00:00:00.000` UTC.
    pub start: DateTime<Utc>,
    /// Inclusive end, `23:59:59.999` UTC of the last day.
    pub end: DateTime<Utc>,
    /// ISO week number, display only.
    pub iso_week: Option<u32>,
}

impl SourcePeriod {
    pub fn monthly_id(year: i32, month: u32) -> String {
        format!("{year}{}{month:02}", PeriodType::Monthly.id_code())
    }

    pub fn bi_monthly_id(year: i32, month: u32, half: MonthHalf) -> String {
        format!(
            "{year}{}{month:02}{}",
            PeriodType::BiMonthly.id_code(),
            half.suffix()
        )
    }

    pub fn weekly_id(year: i32, ordinal: u32) -> String {
        format!("{year}{}{ordinal:02}", PeriodType::Weekly.id_code())
    }

    /// `true` when `now` falls within the period.
    #[must_use]
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.contains(now)
    }

    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start <= at && at <= self.end
    }

    /// Inclusive overlap test against a `[start, end]` window.
    #[must_use]
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.end >= start && self.start <= end
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "source_periods")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub period_type: String,
    pub year: i32,
    pub period_index: i32,
    pub start_date: DateTimeUtc,
    pub end_date: DateTimeUtc,
    pub iso_week: Option<i32>,
    pub calendar_version: i32,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&SourcePeriod> for ActiveModel {
    fn from(period: &SourcePeriod) -> Self {
        Self {
            id: ActiveValue::Set(period.id.clone()),
            period_type: ActiveValue::Set(period.period_type.as_str().to_string()),
            year: ActiveValue::Set(period.year),
            period_index: ActiveValue::Set(period.index as i32),
            start_date: ActiveValue::Set(period.start),
            end_date: ActiveValue::Set(period.end),
            iso_week: ActiveValue::Set(period.iso_week.map(|w| w as i32)),
            calendar_version: ActiveValue::Set(CALENDAR_VERSION),
        }
    }
}

impl TryFrom<Model> for SourcePeriod {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let index = u32::try_from(model.period_index).map_err(|_| {
            EngineError::InvalidPeriod(format!("invalid index for source period {}", model.id))
        })?;
        Ok(Self {
            period_type: PeriodType::try_from(model.period_type.as_str())?,
            year: model.year,
            index,
            start: model.start_date,
            end: model.end_date,
            iso_week: model.iso_week.and_then(|w| u32::try_from(w).ok()),
            id: model.id,
        })
    }
}
