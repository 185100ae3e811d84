use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, TimeDelta, Utc};
use sea_orm::{QueryFilter, QuerySelect, TransactionTrait, prelude::*};

use crate::{
    Change, EngineError, ResourcePeriod, ResultEngine,
    occurrences::{Payment, match_occurrences},
    resource_periods::{self, PeriodStatus},
    resources::ResourceKind,
    splits, transactions,
};

use super::{Engine, with_tx};

impl Engine {
    /// Rebuilds the occurrence arrays of one period from every payment
    /// currently linked to it. Returns `true` when the arrays changed.
    pub async fn refresh_occurrences(&self, period_id: &str) -> ResultEngine<bool> {
        let change = self.refresh_occurrences_of(period_id, Utc::now()).await?;
        let changed = change.is_some();
        if let Some(change) = change {
            if let Err(err) = self.apply_period_to_summaries(change).await {
                tracing::error!(period_id, error = %err, "summary update after occurrence refresh failed");
            }
        }
        Ok(changed)
    }

    /// Matcher run without the summary push. The write is skipped when the
    /// rebuilt arrays equal the stored ones.
    pub(super) async fn refresh_occurrences_of(
        &self,
        period_id: &str,
        now: DateTime<Utc>,
    ) -> ResultEngine<Option<Change<ResourcePeriod>>> {
        let period = Self::load_period(&self.database, period_id).await?;
        let link = match period.resource_kind {
            ResourceKind::Budget => return Ok(None),
            ResourceKind::Outflow => splits::Column::OutflowId,
            ResourceKind::Inflow => splits::Column::InflowId,
        };
        if period.occurrences.is_empty() {
            return Ok(None);
        }

        let linked = splits::Entity::find()
            .filter(link.eq(period.resource_id.as_str()))
            .filter(splits::Column::OccurredAt.gte(period.period_start))
            .filter(splits::Column::OccurredAt.lte(period.period_end))
            .all(&self.database)
            .await?;
        let tx_ids: Vec<String> = linked.iter().map(|s| s.transaction_id.clone()).collect();
        let live: HashSet<String> = if tx_ids.is_empty() {
            HashSet::new()
        } else {
            transactions::Entity::find()
                .select_only()
                .column(transactions::Column::Id)
                .filter(transactions::Column::Id.is_in(tx_ids))
                .filter(transactions::Column::DeletedAt.is_null())
                .into_tuple::<String>()
                .all(&self.database)
                .await?
                .into_iter()
                .collect()
        };

        // One payment per transaction, however many of its splits link here.
        let mut by_tx: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
        for split in linked {
            if live.contains(&split.transaction_id) {
                by_tx.entry(split.transaction_id).or_insert(split.occurred_at);
            }
        }
        let payments: Vec<Payment> = by_tx
            .into_iter()
            .map(|(transaction_id, occurred_at)| Payment {
                transaction_id,
                occurred_at,
            })
            .collect();

        let state = match_occurrences(
            &period.occurrences.due_dates,
            &payments,
            self.settings.occurrence_tolerance_days,
        );
        if state == period.occurrences {
            tracing::trace!(period_id, "occurrences unchanged");
            return Ok(None);
        }

        let change = with_tx!(self, |db_tx| {
            let before = Self::load_period(&db_tx, period_id).await?;
            let mut after = before.clone();
            after.occurrences = state;
            after.refresh_status(now, self.settings.due_soon_days);
            after.updated_at = now;
            after.last_calculated = now;
            Self::save_period(&db_tx, &after).await?;
            Ok::<_, EngineError>(Change::updated(before, after))
        })?;
        tracing::debug!(
            period_id,
            paid = change.after.as_ref().map_or(0, |p| p.occurrences.paid_count()),
            "occurrences refreshed"
        );
        Ok(Some(change))
    }

    /// Re-derives time-driven statuses (`NOT_DUE` to `DUE_SOON` to
    /// `OVERDUE`) of active bill and income periods that have started or
    /// are about to. Returns the number of periods whose status moved.
    pub async fn refresh_period_statuses(&self, now: DateTime<Utc>) -> ResultEngine<usize> {
        let horizon = now + TimeDelta::days(self.settings.due_soon_days);
        let ids: Vec<String> = resource_periods::Entity::find()
            .select_only()
            .column(resource_periods::Column::Id)
            .filter(resource_periods::Column::IsActive.eq(true))
            .filter(resource_periods::Column::ResourceKind.is_in([
                ResourceKind::Outflow.as_str(),
                ResourceKind::Inflow.as_str(),
            ]))
            .filter(resource_periods::Column::Status.is_in([
                PeriodStatus::NotDue.as_str(),
                PeriodStatus::DueSoon.as_str(),
            ]))
            .filter(resource_periods::Column::PeriodStart.lte(horizon))
            .into_tuple()
            .all(&self.database)
            .await?;

        let mut moved = Vec::new();
        for chunk in ids.chunks(self.settings.batch_chunk_size) {
            let updated = with_tx!(self, |db_tx| {
                let mut updated = Vec::new();
                for period_id in chunk {
                    let mut period = Self::load_period(&db_tx, period_id).await?;
                    let previous = period.status;
                    period.refresh_status(now, self.settings.due_soon_days);
                    if period.status != previous {
                        period.updated_at = now;
                        Self::save_period(&db_tx, &period).await?;
                        updated.push(period);
                    }
                }
                Ok::<_, EngineError>(updated)
            })?;
            moved.extend(updated);
        }

        if !moved.is_empty() {
            if let Err(err) = self.apply_periods_to_summaries(&moved).await {
                tracing::error!(error = %err, "summary update after status refresh failed");
            }
        }
        tracing::info!(examined = ids.len(), moved = moved.len(), "period statuses refreshed");
        Ok(moved.len())
    }
}
