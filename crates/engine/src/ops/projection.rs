use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, QueryFilter, QuerySelect, TransactionTrait, prelude::*};

use crate::{
    Change, EngineError, Money, NewResourceCmd, PeriodType, Principal, RecurringResource,
    ResourcePeriod, ResultEngine, allocation,
    projection::{self, Projection, Window},
    resource_periods,
    resources::{self, ResourceDetails, ResourceKind},
    util::{normalize_optional_text, normalize_required_name, validate_base_amount, validate_details},
};

use super::{Engine, with_tx};

/// Result of projecting a resource over a window.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectionOutcome {
    pub projection: Projection,
    /// Periods that did not exist before this run.
    pub created: usize,
}

impl Engine {
    /// Creates a budget, outflow or inflow for the caller and projects it
    /// over its initial window.
    ///
    /// Validation and the calendar check happen before anything is written,
    /// so a rejected call leaves no resource behind. A projection failure
    /// after the insert is logged; the extender picks the resource up later.
    pub async fn create_recurring_resource(
        &self,
        principal: &Principal,
        cmd: NewResourceCmd,
        now: DateTime<Utc>,
    ) -> ResultEngine<RecurringResource> {
        let name = normalize_required_name(&cmd.name, "resource")?;
        let currency = cmd.currency.unwrap_or(self.settings.currency);
        validate_base_amount(cmd.amount, currency)?;
        validate_details(&cmd.details, cmd.frequency)?;

        let details = match cmd.details {
            ResourceDetails::Outflow {
                merchant,
                due_day,
                is_essential,
            } => ResourceDetails::Outflow {
                merchant: normalize_optional_text(merchant.as_deref()),
                due_day,
                is_essential,
            },
            ResourceDetails::Inflow {
                payer,
                is_regular_salary,
            } => ResourceDetails::Inflow {
                payer: normalize_optional_text(payer.as_deref()),
                is_regular_salary,
            },
            budget @ ResourceDetails::Budget { .. } => budget,
        };

        let mut resource = RecurringResource::new(
            principal.uid.as_str(),
            name,
            cmd.amount,
            currency,
            cmd.frequency,
            details,
            now,
        );
        resource.group_id = normalize_optional_text(cmd.group_id.as_deref());
        resource.is_private = cmd.is_private;
        resource.start_date = cmd.start_date;
        resource.source = cmd.source;
        if let Some(end) = cmd.end_date {
            resource.is_ongoing = false;
            resource.budget_end_date = Some(end);
        }

        let selected_start = match &cmd.selected_start_period {
            Some(source_period_id) => {
                let source_period =
                    self.source_period(source_period_id)
                        .await
                        .map_err(|err| match err {
                            EngineError::KeyNotFound(_) => EngineError::InvalidPeriod(format!(
                                "unknown start period {source_period_id}"
                            )),
                            other => other,
                        })?;
                resource.selected_start_period = Some(source_period.id.clone());
                Some(source_period.start)
            }
            None => None,
        };

        let window =
            projection::resolve_window(&resource, selected_start, now, self.settings.horizon_months)?;
        if Self::overlapping_in(&self.database, window.start, window.end, &PeriodType::ALL)
            .await?
            .is_empty()
        {
            return Err(EngineError::MissingCalendar(format!(
                "no source periods between {} and {}",
                window.start, window.end
            )));
        }

        self.register_user(&resource.owner_id, now).await?;
        with_tx!(self, |db_tx| {
            resources::ActiveModel::try_from(&resource)?
                .insert(&db_tx)
                .await?;
            Ok::<_, EngineError>(())
        })?;
        tracing::info!(
            resource_id = %resource.id,
            kind = resource.kind().as_str(),
            owner_id = %resource.owner_id,
            "recurring resource created"
        );

        if let Err(err) = self.project_resource(&mut resource, window, now).await {
            tracing::error!(
                resource_id = %resource.id,
                error = %err,
                "initial projection failed"
            );
        }
        Ok(resource)
    }

    /// Materializes `resource` over `window`.
    ///
    /// Periods are inserted if absent by id, chunk by chunk, so concurrent
    /// or repeated runs never duplicate and never overwrite running totals.
    /// The horizon fields of `resource` are updated in place and persisted;
    /// `periods_generated_until` only moves forward.
    pub async fn project_resource(
        &self,
        resource: &mut RecurringResource,
        window: Window,
        now: DateTime<Utc>,
    ) -> ResultEngine<ProjectionOutcome> {
        let source_periods =
            Self::overlapping_in(&self.database, window.start, window.end, &PeriodType::ALL).await?;
        if source_periods.is_empty() {
            return Err(EngineError::MissingCalendar(format!(
                "no source periods between {} and {}",
                window.start, window.end
            )));
        }

        let projection = projection::project(
            resource,
            window,
            &source_periods,
            now,
            self.settings.due_soon_days,
        );

        let mut created: Vec<ResourcePeriod> = Vec::new();
        for chunk in projection.periods.chunks(self.settings.batch_chunk_size) {
            let inserted = with_tx!(self, |db_tx| {
                let ids: Vec<&str> = chunk.iter().map(|p| p.id.as_str()).collect();
                let existing: HashSet<String> = resource_periods::Entity::find()
                    .select_only()
                    .column(resource_periods::Column::Id)
                    .filter(resource_periods::Column::Id.is_in(ids))
                    .into_tuple::<String>()
                    .all(&db_tx)
                    .await?
                    .into_iter()
                    .collect();
                let fresh: Vec<ResourcePeriod> = chunk
                    .iter()
                    .filter(|p| !existing.contains(&p.id))
                    .cloned()
                    .collect();
                if !fresh.is_empty() {
                    let models = fresh
                        .iter()
                        .map(resource_periods::ActiveModel::try_from)
                        .collect::<ResultEngine<Vec<_>>>()?;
                    resource_periods::Entity::insert_many(models)
                        .exec(&db_tx)
                        .await?;
                }
                Ok::<_, EngineError>(fresh)
            })?;
            created.extend(inserted);
        }
        if !created.is_empty() {
            created = self.seed_created_periods(resource, created, now).await;
        }

        if resource.active_period_range.start_period.is_none() {
            resource.active_period_range.start_period = projection.first_period_id.clone();
        }
        let reaches_further = resource
            .periods_generated_until
            .is_none_or(|until| window.end >= until);
        if reaches_further {
            resource.active_period_range.end_period = projection.last_period_id.clone();
            resource.periods_generated_until = Some(window.end);
        }
        resource.updated_at = now;
        with_tx!(self, |db_tx| {
            Self::save_resource(&db_tx, resource).await?;
            Ok::<_, EngineError>(())
        })?;

        tracing::info!(
            resource_id = %resource.id,
            projected = projection.periods.len(),
            created = created.len(),
            until = %window.end,
            "resource projected"
        );

        if !created.is_empty() {
            if let Err(err) = self.apply_periods_to_summaries(&created).await {
                tracing::error!(
                    resource_id = %resource.id,
                    error = %err,
                    "summary update after projection failed"
                );
            }
        }

        Ok(ProjectionOutcome {
            created: created.len(),
            projection,
        })
    }

    /// Fresh periods start empty; transactions already dated inside them
    /// (recorded before the horizon reached that far) are added here. A
    /// failure leaves the periods empty for a totals recalculation.
    async fn seed_created_periods(
        &self,
        resource: &RecurringResource,
        created: Vec<ResourcePeriod>,
        now: DateTime<Utc>,
    ) -> Vec<ResourcePeriod> {
        let rebuilt = match self.rebuild_totals(resource, &created, now).await {
            Ok(rebuilt) => rebuilt,
            Err(err) => {
                tracing::error!(
                    resource_id = %resource.id,
                    error = %err,
                    "seeding new periods failed, recalculate their totals"
                );
                return created;
            }
        };
        let mut seeded = Vec::with_capacity(rebuilt.len());
        for (_, mut period) in rebuilt {
            if period.resource_kind != ResourceKind::Budget
                && !period.totals.total_amount_paid.is_zero()
            {
                match self.refresh_occurrences_of(&period.id, now).await {
                    Ok(Some(Change { after: Some(after), .. })) => period = after,
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(period_id = %period.id, error = %err, "occurrence refresh failed");
                    }
                }
            }
            seeded.push(period);
        }
        let seeded_count = seeded
            .iter()
            .filter(|p| !p.totals.spent.is_zero() || !p.totals.total_amount_paid.is_zero())
            .count();
        if seeded_count > 0 {
            tracing::info!(
                resource_id = %resource.id,
                periods = seeded_count,
                "new periods seeded from existing transactions"
            );
        }
        seeded
    }

    /// Rewrites the allocation of every period of `resource_id` the user has
    /// not overridden. Returns the number of periods changed.
    pub async fn recalculate_allocations(&self, resource_id: &str) -> ResultEngine<usize> {
        let now = Utc::now();
        let resource = Self::load_resource(&self.database, resource_id).await?;
        let ids: Vec<String> = resource_periods::Entity::find()
            .select_only()
            .column(resource_periods::Column::Id)
            .filter(resource_periods::Column::ResourceId.eq(resource_id))
            .filter(resource_periods::Column::IsModified.eq(false))
            .into_tuple::<String>()
            .all(&self.database)
            .await?;

        let mut changed: Vec<ResourcePeriod> = Vec::new();
        for chunk in ids.chunks(self.settings.batch_chunk_size) {
            let updated = with_tx!(self, |db_tx| {
                let periods = resource_periods::Entity::find()
                    .filter(resource_periods::Column::Id.is_in(chunk.iter().map(String::as_str)))
                    .all(&db_tx)
                    .await?;
                let mut updated = Vec::new();
                for model in periods {
                    let mut period = ResourcePeriod::try_from(model)?;
                    let allocated = allocation::allocated_for_type(resource.amount, period.period_type);
                    if period.is_modified || period.allocated_amount == allocated {
                        continue;
                    }
                    period.set_allocation(allocated);
                    period.refresh_status(now, self.settings.due_soon_days);
                    period.updated_at = now;
                    period.last_calculated = now;
                    Self::save_period(&db_tx, &period).await?;
                    updated.push(period);
                }
                Ok::<_, EngineError>(updated)
            })?;
            changed.extend(updated);
        }

        tracing::info!(resource_id, periods = changed.len(), "allocations recalculated");
        if !changed.is_empty() {
            if let Err(err) = self.apply_periods_to_summaries(&changed).await {
                tracing::error!(resource_id, error = %err, "summary update after reallocation failed");
            }
        }
        Ok(changed.len())
    }

    /// User override of one period's allocation. The period is flagged as
    /// modified so later base amount changes leave it alone.
    pub async fn set_period_allocation(
        &self,
        principal: &Principal,
        period_id: &str,
        amount: Money,
    ) -> ResultEngine<ResourcePeriod> {
        if amount.is_negative() {
            return Err(EngineError::InvalidAmount(
                "allocated amount must not be negative".to_string(),
            ));
        }
        let now = Utc::now();
        let (before, after) = with_tx!(self, |db_tx| {
            let before = Self::load_period(&db_tx, period_id).await?;
            Self::require_access(principal, &before.owner_id, "resource period")?;
            let mut after = before.clone();
            after.set_allocation(amount);
            after.is_modified = true;
            after.refresh_status(now, self.settings.due_soon_days);
            after.updated_at = now;
            after.last_calculated = now;
            Self::save_period(&db_tx, &after).await?;
            Ok::<_, EngineError>((before, after))
        })?;

        if let Err(err) = self
            .apply_period_to_summaries(Change::updated(before, after.clone()))
            .await
        {
            tracing::error!(period_id, error = %err, "summary update after override failed");
        }
        Ok(after)
    }
}
