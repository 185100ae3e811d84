use std::time::Instant;

use chrono::{DateTime, Utc};
use sea_orm::{Condition, QueryFilter, QueryOrder, prelude::*};
use serde::Serialize;

use crate::{
    RecurringResource, ResultEngine,
    projection::Window,
    resources,
};

use super::Engine;

/// Outcome of one extension run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExtensionReport {
    pub examined: usize,
    pub extended: usize,
    /// Candidates already projected up to their target.
    pub skipped: usize,
    pub periods_created: usize,
    pub failed: usize,
    /// The run hit its deadline before visiting every candidate.
    pub timed_out: bool,
}

/// Window still to be projected for `resource` so that it reaches `now +
/// horizon_months` (or its end date, for limited resources). `None` when it
/// is already there.
pub(crate) fn extension_window(
    resource: &RecurringResource,
    now: DateTime<Utc>,
    horizon_months: u32,
) -> ResultEngine<Option<Window>> {
    let horizon_end = Window::rolling(now, horizon_months)?.end;
    let target = match (resource.is_ongoing, resource.resolved_end_date()) {
        (false, Some(end)) => end.min(horizon_end),
        _ => horizon_end,
    };
    let start = resource
        .periods_generated_until
        .or(resource.start_date)
        .unwrap_or(now);
    if resource
        .periods_generated_until
        .is_some_and(|until| until >= target)
        || start > target
    {
        return Ok(None);
    }
    Ok(Some(Window { start, end: target }))
}

/// `true` once a limited resource has been projected up to its end date.
fn reached_end(resource: &RecurringResource) -> bool {
    match (
        resource.is_ongoing,
        resource.resolved_end_date(),
        resource.periods_generated_until,
    ) {
        (false, Some(end), Some(until)) => until >= end,
        (false, None, _) => true,
        _ => false,
    }
}

impl Engine {
    /// Keeps every extendable resource materialized a rolling horizon ahead
    /// of `now`.
    ///
    /// Candidates are visited oldest first. Each one is checkpointed on its
    /// own, so a failure or a timeout leaves the others consistent and the
    /// run can simply be repeated. The deadline is checked before starting a
    /// candidate, never in the middle of one.
    pub async fn extend_recurring_periods(
        &self,
        now: DateTime<Utc>,
        deadline: Instant,
    ) -> ResultEngine<ExtensionReport> {
        let candidates = resources::Entity::find()
            .filter(resources::Column::IsActive.eq(true))
            .filter(resources::Column::CanExtendPeriods.eq(true))
            .filter(
                Condition::any()
                    .add(resources::Column::IsOngoing.eq(true))
                    .add(resources::Column::NeedsScheduledExtension.eq(true)),
            )
            .order_by_asc(resources::Column::CreatedAt)
            .order_by_asc(resources::Column::Id)
            .all(&self.database)
            .await?;
        tracing::info!(candidates = candidates.len(), "extension run started");

        let mut report = ExtensionReport::default();
        for model in candidates {
            if Instant::now() >= deadline {
                report.timed_out = true;
                tracing::warn!(
                    examined = report.examined,
                    "extension run stopped at its deadline"
                );
                break;
            }
            report.examined += 1;
            let resource_id = model.id.clone();
            match self.extend_one(model, now).await {
                Ok(Some(created)) => {
                    report.extended += 1;
                    report.periods_created += created;
                }
                Ok(None) => report.skipped += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(resource_id = %resource_id, error = %err, "extension failed");
                }
            }
        }

        tracing::info!(
            examined = report.examined,
            extended = report.extended,
            skipped = report.skipped,
            periods_created = report.periods_created,
            failed = report.failed,
            timed_out = report.timed_out,
            "extension run finished"
        );
        Ok(report)
    }

    /// Returns the number of periods created, or `None` when skipped.
    async fn extend_one(
        &self,
        model: resources::Model,
        now: DateTime<Utc>,
    ) -> ResultEngine<Option<usize>> {
        let mut resource = RecurringResource::try_from(model)?;
        let Some(window) = extension_window(&resource, now, self.settings.horizon_months)? else {
            if resource.needs_scheduled_extension && reached_end(&resource) {
                resource.needs_scheduled_extension = false;
                Self::save_resource(&self.database, &resource).await?;
            }
            return Ok(None);
        };

        resource.last_extended = Some(now);
        if !resource.is_ongoing {
            let until = resource
                .periods_generated_until
                .map_or(window.end, |until| until.max(window.end));
            resource.needs_scheduled_extension = resource
                .resolved_end_date()
                .is_some_and(|end| until < end);
        }
        let outcome = self.project_resource(&mut resource, window, now).await?;
        Ok(Some(outcome.created))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeDelta, TimeZone};

    use crate::{Currency, Frequency, Money, ResourceDetails};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 2, 0, 0).unwrap()
    }

    fn salary() -> RecurringResource {
        RecurringResource::new(
            "alice",
            "Salary",
            Money::new(500_000),
            Currency::Usd,
            Frequency::Monthly,
            ResourceDetails::Inflow {
                payer: None,
                is_regular_salary: true,
            },
            now(),
        )
    }

    #[test]
    fn ongoing_resources_extend_from_where_they_stopped() {
        let mut resource = salary();
        let until = Utc.with_ymd_and_hms(2026, 1, 31, 23, 59, 59).unwrap();
        resource.periods_generated_until = Some(until);
        let window = extension_window(&resource, now(), 12).unwrap().unwrap();
        assert_eq!(window.start, until);
        assert_eq!(
            window.end,
            Utc.with_ymd_and_hms(2026, 6, 1, 2, 0, 0).unwrap() - TimeDelta::milliseconds(1)
        );
    }

    #[test]
    fn resources_at_the_horizon_are_skipped() {
        let mut resource = salary();
        resource.periods_generated_until = Some(now() + TimeDelta::days(400));
        assert_eq!(extension_window(&resource, now(), 12).unwrap(), None);
    }

    #[test]
    fn limited_resources_stop_at_their_end() {
        let mut resource = salary();
        let end = Utc.with_ymd_and_hms(2025, 9, 30, 0, 0, 0).unwrap();
        resource.is_ongoing = false;
        resource.budget_end_date = Some(end);
        resource.periods_generated_until = Some(Utc.with_ymd_and_hms(2025, 7, 31, 0, 0, 0).unwrap());
        let window = extension_window(&resource, now(), 12).unwrap().unwrap();
        assert_eq!(window.end, end);
        assert!(!reached_end(&resource));

        resource.periods_generated_until = Some(end);
        assert_eq!(extension_window(&resource, now(), 12).unwrap(), None);
        assert!(reached_end(&resource));
    }
}
