use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ActiveValue, QueryFilter, QueryOrder, QuerySelect, SqlErr,
    TransactionTrait, prelude::*,
};
use serde::Serialize;

use crate::{
    Change, DurationOperation, EngineError, Principal, RecurringResource, ResourcePeriod,
    ResultEngine, UpdateResourceCmd, contributions,
    projection::Window,
    resource_periods,
    resources::{self, ResourceDetails, ResourceKind},
    users,
    util::{normalize_optional_text, normalize_required_name, validate_base_amount, validate_details},
};

use super::{Engine, with_tx};

/// Result of a budget duration change.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DurationChange {
    /// Periods created by an extension or removed by a shortening.
    pub periods_affected: usize,
    pub new_end_date: DateTime<Utc>,
    pub operation_details: String,
}

impl Engine {
    /// Records `uid` and makes sure it owns an everything-else budget.
    /// Idempotent; returns the everything-else budget.
    pub async fn register_user(
        &self,
        uid: &str,
        now: DateTime<Utc>,
    ) -> ResultEngine<RecurringResource> {
        let uid = uid.trim();
        if uid.is_empty() {
            return Err(EngineError::InvalidField("user id must not be empty".to_string()));
        }

        let outcome = with_tx!(self, |db_tx| {
            if users::Entity::find_by_id(uid.to_string())
                .one(&db_tx)
                .await?
                .is_none()
            {
                users::ActiveModel {
                    id: ActiveValue::Set(uid.to_string()),
                    currency: ActiveValue::Set(self.settings.currency.code().to_string()),
                    created_at: ActiveValue::Set(now),
                }
                .insert(&db_tx)
                .await
                .map_err(|err| existing_key(err, format!("user {uid}")))?;
                tracing::info!(user_id = uid, "user registered");
            }
            let existing = match Self::everything_else_id(&db_tx, uid).await? {
                Some(id) => Some(Self::load_resource(&db_tx, &id).await?),
                None => None,
            };
            match existing {
                Some(budget) => Ok::<_, EngineError>((budget, false)),
                None => {
                    let budget = RecurringResource::everything_else(uid, self.settings.currency, now);
                    resources::ActiveModel::try_from(&budget)?
                        .insert(&db_tx)
                        .await
                        .map_err(|err| existing_key(err, format!("everything-else budget of {uid}")))?;
                    Ok((budget, true))
                }
            }
        });
        // A concurrent registration won the insert; its rows are the answer.
        let (mut budget, created) = match outcome {
            Err(EngineError::ExistingKey(what)) => {
                tracing::debug!(user_id = uid, what = %what, "registered concurrently");
                let id = Self::everything_else_id(&self.database, uid)
                    .await?
                    .ok_or_else(|| EngineError::KeyNotFound(format!("everything-else budget of {uid}")))?;
                (Self::load_resource(&self.database, &id).await?, false)
            }
            other => other?,
        };

        if created {
            tracing::info!(user_id = uid, resource_id = %budget.id, "everything-else budget created");
            let window = Window::rolling(now, self.settings.horizon_months)?;
            if let Err(err) = self.project_resource(&mut budget, window, now).await {
                tracing::warn!(
                    resource_id = %budget.id,
                    error = %err,
                    "everything-else budget not projected yet"
                );
            }
        }
        Ok(budget)
    }

    /// Recreates the everything-else budget of every known user missing one.
    /// Returns how many were recreated.
    pub async fn ensure_everything_else_budgets(&self, now: DateTime<Utc>) -> ResultEngine<usize> {
        let user_ids: Vec<String> = users::Entity::find()
            .select_only()
            .column(users::Column::Id)
            .order_by_asc(users::Column::Id)
            .into_tuple()
            .all(&self.database)
            .await?;

        let mut recreated = 0;
        for user_id in user_ids {
            if Self::everything_else_id(&self.database, &user_id)
                .await?
                .is_some()
            {
                continue;
            }
            match self.register_user(&user_id, now).await {
                Ok(budget) => {
                    recreated += 1;
                    tracing::warn!(user_id, resource_id = %budget.id, "everything-else budget recreated");
                }
                Err(err) => {
                    tracing::error!(user_id, error = %err, "everything-else budget recreation failed");
                }
            }
        }
        Ok(recreated)
    }

    /// Applies a partial update to a resource, then runs the derived updates
    /// (allocations, summary names, activation).
    pub async fn update_recurring_resource(
        &self,
        principal: &Principal,
        resource_id: &str,
        cmd: UpdateResourceCmd,
    ) -> ResultEngine<RecurringResource> {
        if cmd.is_empty() {
            return Err(EngineError::InvalidField("nothing to update".to_string()));
        }
        let now = Utc::now();
        let (before, after) = with_tx!(self, |db_tx| {
            let before = Self::require_resource(&db_tx, principal, resource_id).await?;
            let mut after = before.clone();
            apply_update(&mut after, &cmd)?;
            after.updated_at = now;
            Self::save_resource(&db_tx, &after).await?;
            Ok::<_, EngineError>((before, after))
        })?;
        tracing::info!(resource_id, "recurring resource updated");

        self.handle_resource_change(Change::updated(before, after.clone()), now)
            .await;
        Ok(after)
    }

    /// Deletes a resource and cascades to its periods and summary entries.
    /// The everything-else budget cannot be deleted by its owner.
    pub async fn delete_recurring_resource(
        &self,
        principal: &Principal,
        resource_id: &str,
    ) -> ResultEngine<()> {
        let now = Utc::now();
        let before = with_tx!(self, |db_tx| {
            let resource = Self::require_resource(&db_tx, principal, resource_id).await?;
            if resource.is_everything_else() {
                return Err(EngineError::InvalidField(
                    "the everything-else budget cannot be deleted".to_string(),
                ));
            }
            resources::Entity::delete_by_id(resource.id.clone())
                .exec(&db_tx)
                .await?;
            Ok::<_, EngineError>(resource)
        })?;
        tracing::info!(resource_id, "recurring resource deleted");

        self.handle_resource_change(Change::deleted(before), now).await;
        Ok(())
    }

    /// Derived updates after a resource write. Failures are logged, never
    /// returned: the primary write already succeeded.
    pub async fn handle_resource_change(&self, change: Change<RecurringResource>, now: DateTime<Utc>) {
        let resource_id = change
            .after
            .as_ref()
            .or(change.before.as_ref())
            .map(|r| r.id.clone())
            .unwrap_or_default();
        if let Err(err) = self.resource_change(&change, now).await {
            tracing::error!(resource_id = %resource_id, error = %err, "resource change handling failed");
        }
    }

    async fn resource_change(
        &self,
        change: &Change<RecurringResource>,
        now: DateTime<Utc>,
    ) -> ResultEngine<()> {
        match (&change.before, &change.after) {
            (Some(before), None) => {
                let deleted = self.delete_resource_periods(&before.id, None).await?;
                tracing::info!(resource_id = %before.id, periods = deleted, "resource periods deleted");
                if before.is_everything_else()
                    && Self::everything_else_id(&self.database, &before.owner_id)
                        .await?
                        .is_none()
                {
                    let budget = self.register_user(&before.owner_id, now).await?;
                    tracing::warn!(
                        user_id = %before.owner_id,
                        resource_id = %budget.id,
                        "everything-else budget was deleted, recreated"
                    );
                }
            }
            (Some(before), Some(after)) => {
                if before.amount != after.amount {
                    self.recalculate_allocations(&after.id).await?;
                }
                if before.name != after.name || before.merchant() != after.merchant() {
                    self.sync_resource_name(&after.id).await?;
                }
                if before.is_active != after.is_active {
                    self.set_periods_active(&after.id, after.is_active, now)
                        .await?;
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Deletes the periods of `resource_id`, optionally only those starting
    /// after `starting_after`, chunk by chunk, with their contribution rows.
    /// Summary entries are removed first so no summary keeps pointing at a
    /// deleted period.
    async fn delete_resource_periods(
        &self,
        resource_id: &str,
        starting_after: Option<DateTime<Utc>>,
    ) -> ResultEngine<usize> {
        let mut deleted = 0;
        loop {
            let mut query = resource_periods::Entity::find()
                .filter(resource_periods::Column::ResourceId.eq(resource_id));
            if let Some(after) = starting_after {
                query = query.filter(resource_periods::Column::PeriodStart.gt(after));
            }
            let batch = query
                .order_by_asc(resource_periods::Column::Id)
                .limit(self.settings.batch_chunk_size as u64)
                .all(&self.database)
                .await?
                .into_iter()
                .map(ResourcePeriod::try_from)
                .collect::<ResultEngine<Vec<_>>>()?;
            if batch.is_empty() {
                break;
            }
            if let Err(err) = self.remove_periods_from_summaries(&batch).await {
                tracing::warn!(resource_id, error = %err, "summary cleanup failed, rebuild with a backfill");
            }
            let ids: Vec<String> = batch.iter().map(|p| p.id.clone()).collect();
            with_tx!(self, |db_tx| {
                contributions::Entity::delete_many()
                    .filter(contributions::Column::ResourcePeriodId.is_in(ids.clone()))
                    .exec(&db_tx)
                    .await?;
                resource_periods::Entity::delete_many()
                    .filter(resource_periods::Column::Id.is_in(ids))
                    .exec(&db_tx)
                    .await?;
                Ok::<_, EngineError>(())
            })?;
            deleted += batch.len();
        }
        Ok(deleted)
    }

    async fn set_periods_active(
        &self,
        resource_id: &str,
        is_active: bool,
        now: DateTime<Utc>,
    ) -> ResultEngine<usize> {
        let ids: Vec<String> = resource_periods::Entity::find()
            .select_only()
            .column(resource_periods::Column::Id)
            .filter(resource_periods::Column::ResourceId.eq(resource_id))
            .filter(resource_periods::Column::IsActive.eq(!is_active))
            .into_tuple()
            .all(&self.database)
            .await?;

        let mut changed = Vec::new();
        for chunk in ids.chunks(self.settings.batch_chunk_size) {
            let updated = with_tx!(self, |db_tx| {
                let mut updated = Vec::new();
                for period_id in chunk {
                    let mut period = Self::load_period(&db_tx, period_id).await?;
                    period.is_active = is_active;
                    period.updated_at = now;
                    Self::save_period(&db_tx, &period).await?;
                    updated.push(period);
                }
                Ok::<_, EngineError>(updated)
            })?;
            changed.extend(updated);
        }

        if is_active {
            self.apply_periods_to_summaries(&changed).await?;
        } else {
            self.remove_periods_from_summaries(&changed).await?;
        }
        tracing::info!(resource_id, is_active, periods = changed.len(), "resource periods toggled");
        Ok(changed.len())
    }

    /// Moves the end date of a budget. Extending projects the new periods
    /// (up to the rolling horizon, the extender does the rest); shortening
    /// removes every period starting after the new end.
    pub async fn update_budget_duration(
        &self,
        principal: &Principal,
        budget_id: &str,
        new_end_date: DateTime<Utc>,
        operation: DurationOperation,
        now: DateTime<Utc>,
    ) -> ResultEngine<DurationChange> {
        let mut budget = Self::require_resource(&self.database, principal, budget_id).await?;
        if budget.kind() != ResourceKind::Budget {
            return Err(EngineError::InvalidField(format!(
                "{budget_id} is not a budget"
            )));
        }
        if budget.is_everything_else() {
            return Err(EngineError::InvalidField(
                "the everything-else budget has no duration".to_string(),
            ));
        }

        let current_end = budget
            .resolved_end_date()
            .filter(|_| !budget.is_ongoing)
            .or(budget.periods_generated_until);
        let start = budget.start_date.unwrap_or(budget.created_at);
        match operation {
            DurationOperation::Extend => {
                if current_end.is_some_and(|end| new_end_date <= end) {
                    return Err(EngineError::InvalidPeriod(
                        "an extension must move the end date later".to_string(),
                    ));
                }
            }
            DurationOperation::Shorten => {
                if current_end.is_some_and(|end| new_end_date >= end) {
                    return Err(EngineError::InvalidPeriod(
                        "shortening must move the end date earlier".to_string(),
                    ));
                }
                if new_end_date < start {
                    return Err(EngineError::InvalidPeriod(
                        "a budget cannot end before it starts".to_string(),
                    ));
                }
            }
        }

        budget.is_ongoing = false;
        budget.budget_end_date = Some(new_end_date);
        budget.updated_at = now;

        let (periods_affected, operation_details) = match operation {
            DurationOperation::Extend => {
                let horizon_end = Window::rolling(now, self.settings.horizon_months)?.end;
                let target = new_end_date.min(horizon_end);
                budget.needs_scheduled_extension = target < new_end_date;
                let from = budget.periods_generated_until.unwrap_or(start);
                let created = if from <= target {
                    self.project_resource(&mut budget, Window { start: from, end: target }, now)
                        .await?
                        .created
                } else {
                    with_tx!(self, |db_tx| {
                        Self::save_resource(&db_tx, &budget).await?;
                        Ok::<_, EngineError>(())
                    })?;
                    0
                };
                (
                    created,
                    format!(
                        "extended to {}, {created} periods created",
                        new_end_date.date_naive()
                    ),
                )
            }
            DurationOperation::Shorten => {
                let removed = self
                    .delete_resource_periods(&budget.id, Some(new_end_date))
                    .await?;
                let last = resource_periods::Entity::find()
                    .filter(resource_periods::Column::ResourceId.eq(budget.id.as_str()))
                    .order_by_desc(resource_periods::Column::PeriodStart)
                    .one(&self.database)
                    .await?;
                budget.active_period_range.end_period = last.map(|model| model.source_period_id);
                budget.periods_generated_until = budget
                    .periods_generated_until
                    .map(|until| until.min(new_end_date));
                budget.needs_scheduled_extension = false;
                with_tx!(self, |db_tx| {
                    Self::save_resource(&db_tx, &budget).await?;
                    Ok::<_, EngineError>(())
                })?;
                (
                    removed,
                    format!(
                        "shortened to {}, {removed} periods removed",
                        new_end_date.date_naive()
                    ),
                )
            }
        };

        tracing::info!(
            resource_id = budget_id,
            operation = operation.as_str(),
            periods = periods_affected,
            "budget duration changed"
        );
        Ok(DurationChange {
            periods_affected,
            new_end_date,
            operation_details,
        })
    }
}

/// Unique violations become `ExistingKey`, anything else stays a store error.
fn existing_key(err: DbErr, what: String) -> EngineError {
    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => EngineError::ExistingKey(what),
        _ => EngineError::Database(err),
    }
}

/// Applies `cmd` to `resource`, enforcing the everything-else guard and the
/// per-kind field rules.
fn apply_update(resource: &mut RecurringResource, cmd: &UpdateResourceCmd) -> ResultEngine<()> {
    if resource.is_everything_else()
        && (cmd.amount.is_some() || cmd.category_ids.is_some() || cmd.is_active == Some(false))
    {
        return Err(EngineError::InvalidField(
            "only the name of the everything-else budget can change".to_string(),
        ));
    }

    if let Some(name) = &cmd.name {
        resource.name = normalize_required_name(name, "resource")?;
    }
    if let Some(amount) = cmd.amount {
        validate_base_amount(amount, resource.currency)?;
        resource.amount = amount;
    }
    if let Some(active) = cmd.is_active {
        resource.is_active = active;
    }

    match &mut resource.details {
        ResourceDetails::Budget { category_ids, .. } => {
            if cmd.merchant.is_some() || cmd.due_day.is_some() || cmd.is_essential.is_some() {
                return Err(EngineError::InvalidField(
                    "budgets have no merchant, due day or essential flag".to_string(),
                ));
            }
            if let Some(ids) = &cmd.category_ids {
                *category_ids = ids.clone();
            }
        }
        ResourceDetails::Outflow {
            merchant,
            due_day,
            is_essential,
        } => {
            if cmd.category_ids.is_some() {
                return Err(EngineError::InvalidField(
                    "only budgets have categories".to_string(),
                ));
            }
            if let Some(value) = &cmd.merchant {
                *merchant = normalize_optional_text(Some(value));
            }
            if let Some(day) = cmd.due_day {
                *due_day = Some(day);
            }
            if let Some(essential) = cmd.is_essential {
                *is_essential = essential;
            }
        }
        ResourceDetails::Inflow { payer, .. } => {
            if cmd.category_ids.is_some() || cmd.due_day.is_some() || cmd.is_essential.is_some() {
                return Err(EngineError::InvalidField(
                    "inflows only accept a payer".to_string(),
                ));
            }
            if let Some(value) = &cmd.merchant {
                *payer = normalize_optional_text(Some(value));
            }
        }
    }
    if !resource.is_everything_else() {
        validate_details(&resource.details, resource.frequency)?;
    }
    Ok(())
}
