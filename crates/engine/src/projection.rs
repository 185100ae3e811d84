//! Period projector.
//!
//! Turns a recurring resource and a window into resource periods, one per
//! overlapping source period. Everything here is pure; loading source periods
//! and persisting the output lives in `ops::projection`.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
    EngineError, PeriodType, ResultEngine, allocation, calendar,
    occurrences::{self, OccurrenceState},
    resource_periods::{PeriodStatus, PeriodTotals, ResourcePeriod},
    resources::RecurringResource,
    source_periods::SourcePeriod,
};

/// Inclusive generation window.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    /// `horizon_months` after `start`, ending one millisecond before the
    /// anniversary so the next period starting there is left out.
    pub fn rolling(start: DateTime<Utc>, horizon_months: u32) -> ResultEngine<Self> {
        let end = calendar::add_months(start, horizon_months)? - TimeDelta::milliseconds(1);
        Ok(Self { start, end })
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Projection {
    /// Ordered by start date, then period type.
    pub periods: Vec<ResourcePeriod>,
    pub first_period_id: Option<String>,
    pub last_period_id: Option<String>,
    pub counts: BTreeMap<PeriodType, usize>,
}

/// Resolves the window a resource should be projected over.
///
/// The start is the explicit start date, else the start of the selected
/// start period (`selected_start`, looked up by the caller), else `now`.
/// Ongoing resources get a rolling `horizon_months` window. Limited ones end
/// at their resolved end date, or fall back to the rolling window.
pub fn resolve_window(
    resource: &RecurringResource,
    selected_start: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    horizon_months: u32,
) -> ResultEngine<Window> {
    let start = resource.start_date.or(selected_start).unwrap_or(now);
    let window = match (resource.is_ongoing, resource.resolved_end_date()) {
        (false, Some(end)) => Window { start, end },
        _ => Window::rolling(start, horizon_months)?,
    };
    if window.end < window.start {
        return Err(EngineError::InvalidPeriod(format!(
            "resource {} ends before it starts",
            resource.id
        )));
    }
    Ok(window)
}

/// Projects `resource` onto every source period overlapping `window`.
///
/// Periods outside the window are ignored, so callers may pass a superset.
pub fn project(
    resource: &RecurringResource,
    window: Window,
    source_periods: &[SourcePeriod],
    now: DateTime<Utc>,
    due_soon_days: i64,
) -> Projection {
    let mut periods: Vec<ResourcePeriod> = source_periods
        .iter()
        .filter(|sp| sp.overlaps(window.start, window.end))
        .map(|sp| project_one(resource, sp, now, due_soon_days))
        .collect();
    periods.sort_by(|a, b| {
        a.period_start
            .cmp(&b.period_start)
            .then_with(|| a.period_type.cmp(&b.period_type))
    });

    let mut counts = BTreeMap::new();
    for period in &periods {
        *counts.entry(period.period_type).or_insert(0) += 1;
    }
    Projection {
        first_period_id: periods.first().map(|p| p.source_period_id.clone()),
        last_period_id: periods.last().map(|p| p.source_period_id.clone()),
        counts,
        periods,
    }
}

fn project_one(
    resource: &RecurringResource,
    sp: &SourcePeriod,
    now: DateTime<Utc>,
    due_soon_days: i64,
) -> ResourcePeriod {
    let allocated = allocation::allocated_for(resource.amount, sp);
    let mut period = ResourcePeriod {
        id: ResourcePeriod::id_for(&resource.id, &sp.id),
        resource_id: resource.id.clone(),
        resource_kind: resource.kind(),
        owner_id: resource.owner_id.clone(),
        group_id: resource.group_id.clone(),
        is_private: resource.is_private,
        source_period_id: sp.id.clone(),
        period_type: sp.period_type,
        period_start: sp.start,
        period_end: sp.end,
        allocated_amount: allocated,
        totals: PeriodTotals::for_allocation(resource.kind(), allocated),
        status: PeriodStatus::Pending,
        occurrences: OccurrenceState::unpaid(occurrences::due_dates(resource, sp.start, sp.end)),
        checklist: Vec::new(),
        is_active: resource.is_active,
        is_modified: false,
        created_at: now,
        updated_at: now,
        last_calculated: now,
    };
    period.refresh_status(now, due_soon_days);
    period
}
