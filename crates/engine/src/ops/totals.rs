use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use sea_orm::{
    Condition, ConnectionTrait, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
};
use serde::Serialize;

use crate::{
    Change, EngineError, Principal, RecurringResource, ResourcePeriod, ResultEngine, Transaction,
    contributions, reconcile,
    resource_periods::{self, TotalsDelta},
    resources::ResourceKind,
    splits, transactions,
};

use super::{Engine, with_tx};

/// Periods whose running totals are rebuilt from live transactions.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TotalsTarget {
    Resource(String),
    Period(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TotalsReport {
    pub periods: usize,
    /// Periods whose stored totals or status differed from the rebuild.
    pub corrected: usize,
}

/// Contribution of each transaction to each period, keyed by period id then
/// transaction id.
type Wanted = BTreeMap<String, BTreeMap<String, TotalsDelta>>;

impl Engine {
    /// Re-sums the live transactions of every targeted period and rewrites
    /// its running totals, status and payment links. Admin only.
    pub async fn recalculate_period_totals(
        &self,
        principal: &Principal,
        target: TotalsTarget,
    ) -> ResultEngine<TotalsReport> {
        Self::require_admin(principal)?;
        let now = Utc::now();
        let (resource, periods) = match &target {
            TotalsTarget::Resource(resource_id) => {
                let resource = Self::load_resource(&self.database, resource_id).await?;
                let periods = resource_periods::Entity::find()
                    .filter(resource_periods::Column::ResourceId.eq(resource_id.as_str()))
                    .order_by_asc(resource_periods::Column::PeriodStart)
                    .order_by_asc(resource_periods::Column::Id)
                    .all(&self.database)
                    .await?
                    .into_iter()
                    .map(ResourcePeriod::try_from)
                    .collect::<ResultEngine<Vec<_>>>()?;
                (resource, periods)
            }
            TotalsTarget::Period(period_id) => {
                let period = Self::load_period(&self.database, period_id).await?;
                let resource = Self::load_resource(&self.database, &period.resource_id).await?;
                (resource, vec![period])
            }
        };

        let mut rebuilt = self.rebuild_totals(&resource, &periods, now).await?;
        if resource.kind() != ResourceKind::Budget {
            for (_, new) in &mut rebuilt {
                if let Some(refreshed) = self.refresh_occurrences_of(&new.id, now).await?
                    && let Some(after) = refreshed.after
                {
                    *new = after;
                }
            }
        }

        let mut report = TotalsReport {
            periods: rebuilt.len(),
            corrected: 0,
        };
        for (old, new) in rebuilt {
            let unchanged = old.totals == new.totals
                && old.status == new.status
                && old.occurrences == new.occurrences;
            if unchanged {
                continue;
            }
            report.corrected += 1;
            tracing::warn!(
                period_id = %new.id,
                spent_before = %old.totals.spent,
                spent_after = %new.totals.spent,
                paid_before = %old.totals.total_amount_paid,
                paid_after = %new.totals.total_amount_paid,
                "period totals corrected"
            );
            let period_id = new.id.clone();
            if let Err(err) = self.apply_period_to_summaries(Change::updated(old, new)).await {
                tracing::error!(period_id = %period_id, error = %err, "summary update failed");
            }
        }
        tracing::info!(
            resource_id = %resource.id,
            periods = report.periods,
            corrected = report.corrected,
            "period totals recalculated"
        );
        Ok(report)
    }

    /// Rewrites the running totals of `periods` (all of `resource`) as the
    /// sum of the live transactions falling in them, together with their
    /// contribution rows. Returns `(before, after)` per period still stored.
    pub(super) async fn rebuild_totals(
        &self,
        resource: &RecurringResource,
        periods: &[ResourcePeriod],
        now: DateTime<Utc>,
    ) -> ResultEngine<Vec<(ResourcePeriod, ResourcePeriod)>> {
        let mut out = Vec::with_capacity(periods.len());
        for chunk in periods.chunks(self.settings.batch_chunk_size) {
            let (Some(start), Some(end)) = (
                chunk.iter().map(|p| p.period_start).min(),
                chunk.iter().map(|p| p.period_end).max(),
            ) else {
                continue;
            };
            let rebuilt = with_tx!(self, |db_tx| {
                let live = Self::live_transactions(&db_tx, resource, start, end).await?;
                let wanted = wanted_contributions(resource, &live, chunk);
                let ids: Vec<String> = chunk.iter().map(|p| p.id.clone()).collect();
                contributions::Entity::delete_many()
                    .filter(contributions::Column::ResourcePeriodId.is_in(ids.clone()))
                    .exec(&db_tx)
                    .await?;

                let mut rows = Vec::new();
                let mut rebuilt = Vec::new();
                for period_id in &ids {
                    let Some(old) = Self::find_period(&db_tx, period_id).await? else {
                        continue;
                    };
                    let mut sum = TotalsDelta::default();
                    for (transaction_id, delta) in wanted.get(period_id).into_iter().flatten() {
                        if delta.is_zero() {
                            continue;
                        }
                        sum += *delta;
                        rows.push(contributions::active_model(
                            transaction_id,
                            period_id,
                            &resource.id,
                            *delta,
                        ));
                    }
                    let mut new = old.clone();
                    new.totals.rebuild(sum);
                    new.refresh_status(now, self.settings.due_soon_days);
                    if new.totals != old.totals || new.status != old.status {
                        new.updated_at = now;
                        new.last_calculated = now;
                        Self::save_period(&db_tx, &new).await?;
                    }
                    rebuilt.push((old, new));
                }
                if !rows.is_empty() {
                    contributions::Entity::insert_many(rows).exec(&db_tx).await?;
                }
                Ok::<_, EngineError>(rebuilt)
            })?;
            out.extend(rebuilt);
        }
        Ok(out)
    }

    /// Live transactions of the resource owner with a split that lands on
    /// `resource` between `start` and `end`.
    async fn live_transactions<C: ConnectionTrait>(
        db: &C,
        resource: &RecurringResource,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ResultEngine<Vec<Transaction>> {
        let id = resource.id.as_str();
        let link = match resource.kind() {
            ResourceKind::Budget if resource.is_everything_else() => Condition::any()
                .add(splits::Column::BudgetId.eq(id))
                .add(
                    Condition::all()
                        .add(splits::Column::BudgetId.is_null())
                        .add(splits::Column::InflowId.is_null()),
                ),
            ResourceKind::Budget => Condition::all().add(splits::Column::BudgetId.eq(id)),
            ResourceKind::Outflow => Condition::all().add(splits::Column::OutflowId.eq(id)),
            ResourceKind::Inflow => Condition::all().add(splits::Column::InflowId.eq(id)),
        };
        let transaction_ids: BTreeSet<String> = splits::Entity::find()
            .filter(splits::Column::OwnerId.eq(resource.owner_id.as_str()))
            .filter(splits::Column::OccurredAt.gte(start))
            .filter(splits::Column::OccurredAt.lte(end))
            .filter(link)
            .all(db)
            .await?
            .into_iter()
            .map(|split| split.transaction_id)
            .collect();
        if transaction_ids.is_empty() {
            return Ok(Vec::new());
        }

        let models = transactions::Entity::find()
            .filter(transactions::Column::Id.is_in(transaction_ids.iter().cloned()))
            .filter(transactions::Column::DeletedAt.is_null())
            .all(db)
            .await?;
        let mut split_models: BTreeMap<String, Vec<splits::Model>> = BTreeMap::new();
        for split in splits::Entity::find()
            .filter(splits::Column::TransactionId.is_in(models.iter().map(|m| m.id.clone())))
            .all(db)
            .await?
        {
            split_models
                .entry(split.transaction_id.clone())
                .or_default()
                .push(split);
        }
        models
            .into_iter()
            .map(|model| {
                let splits = split_models.remove(&model.id).unwrap_or_default();
                Transaction::from_models(model, splits)
            })
            .collect()
    }
}

/// Effects of `live` on `resource`, resolved to the periods of `periods`
/// containing each transaction date.
fn wanted_contributions(
    resource: &RecurringResource,
    live: &[Transaction],
    periods: &[ResourcePeriod],
) -> Wanted {
    let everything_else = resource
        .is_everything_else()
        .then_some(resource.id.as_str());
    let mut wanted = Wanted::new();
    for tx in live {
        for effect in reconcile::effects(tx, everything_else) {
            if effect.resource_id != resource.id {
                continue;
            }
            for period in periods.iter().filter(|p| p.contains(effect.at)) {
                *wanted
                    .entry(period.id.clone())
                    .or_default()
                    .entry(tx.id.to_string())
                    .or_default() += effect.delta;
            }
        }
    }
    wanted
}
