use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;
use sea_orm::{ActiveModelTrait, QueryFilter, QuerySelect, TransactionTrait, prelude::*};
use serde::Serialize;

use crate::{
    Change, EngineError, PeriodType, Principal, RecurringResource, ResourcePeriod, ResultEngine,
    resource_periods,
    summaries::{self, PeriodSummary, SummaryEntry, SummaryScope, summary_id},
};

use super::{Engine, with_tx};

/// Outcome of a summary backfill run.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BackfillReport {
    /// Distinct `(scope, period type, source period)` keys found.
    pub keys: usize,
    pub rebuilt: usize,
    pub failed: usize,
    pub dry_run: bool,
}

impl Engine {
    async fn load_summary<C: ConnectionTrait>(
        db: &C,
        id: &str,
    ) -> ResultEngine<Option<PeriodSummary>> {
        summaries::Entity::find_by_id(id.to_string())
            .one(db)
            .await?
            .map(PeriodSummary::try_from)
            .transpose()
    }

    async fn store_summary<C: ConnectionTrait>(
        db: &C,
        summary: &PeriodSummary,
        exists: bool,
    ) -> ResultEngine<()> {
        let model = summaries::ActiveModel::try_from(summary)?;
        if exists {
            model.update(db).await?;
        } else {
            model.insert(db).await?;
        }
        Ok(())
    }

    async fn resource_cache<'a>(
        &self,
        periods: impl Iterator<Item = &'a ResourcePeriod>,
    ) -> ResultEngine<HashMap<String, RecurringResource>> {
        let mut cache = HashMap::new();
        for period in periods {
            if cache.contains_key(&period.resource_id) {
                continue;
            }
            if let Some(resource) = Self::find_resource(&self.database, &period.resource_id).await? {
                cache.insert(period.resource_id.clone(), resource);
            }
        }
        Ok(cache)
    }

    /// Folds one resource period change into the user summary and, for
    /// shared periods, the group summary.
    ///
    /// Inactive periods and periods whose resource is gone are removed from
    /// the summaries they were in. Each summary is rewritten in its own store
    /// transaction.
    pub async fn apply_period_to_summaries(
        &self,
        change: Change<ResourcePeriod>,
    ) -> ResultEngine<()> {
        let now = Utc::now();
        let mut removals: BTreeMap<String, String> = BTreeMap::new();
        if let Some(before) = &change.before {
            for scope in SummaryScope::for_period(before) {
                removals.insert(
                    summary_id(&scope, before.period_type, &before.source_period_id),
                    before.id.clone(),
                );
            }
        }

        let mut upserts = Vec::new();
        if let Some(after) = change.after.as_ref().filter(|p| p.is_active) {
            if let Some(resource) = Self::find_resource(&self.database, &after.resource_id).await? {
                for scope in SummaryScope::for_period(after) {
                    let id = summary_id(&scope, after.period_type, &after.source_period_id);
                    removals.remove(&id);
                    upserts.push((scope, id, after, SummaryEntry::build(after, &resource)));
                }
            }
        }

        for (scope, id, after, entry) in upserts {
            with_tx!(self, |db_tx| {
                let existing = Self::load_summary(&db_tx, &id).await?;
                let exists = existing.is_some();
                let mut summary =
                    existing.unwrap_or_else(|| PeriodSummary::for_period(scope, after, now));
                summary.upsert_entry(after.resource_kind, entry);
                summary.updated_at = now;
                Self::store_summary(&db_tx, &summary, exists).await?;
                Ok::<_, EngineError>(())
            })?;
            tracing::debug!(summary_id = %id, period_id = %after.id, "summary entry upserted");
        }

        for (id, period_id) in removals {
            with_tx!(self, |db_tx| {
                if let Some(mut summary) = Self::load_summary(&db_tx, &id).await? {
                    if summary.remove_entry(&period_id) {
                        summary.updated_at = now;
                        Self::store_summary(&db_tx, &summary, true).await?;
                        tracing::debug!(summary_id = %id, period_id = %period_id, "summary entry removed");
                    }
                }
                Ok::<_, EngineError>(())
            })?;
        }
        Ok(())
    }

    /// Batch path: groups `periods` by summary id and rewrites each summary
    /// once. Returns the number of summaries written.
    pub async fn apply_periods_to_summaries(
        &self,
        periods: &[ResourcePeriod],
    ) -> ResultEngine<usize> {
        let now = Utc::now();
        let resources = self.resource_cache(periods.iter()).await?;
        let mut grouped: BTreeMap<String, (SummaryScope, Vec<&ResourcePeriod>)> = BTreeMap::new();
        for period in periods {
            for scope in SummaryScope::for_period(period) {
                let id = summary_id(&scope, period.period_type, &period.source_period_id);
                grouped
                    .entry(id)
                    .or_insert_with(|| (scope, Vec::new()))
                    .1
                    .push(period);
            }
        }

        let mut written = 0;
        for (id, (scope, members)) in grouped {
            let Some(first) = members.first().copied() else {
                continue;
            };
            with_tx!(self, |db_tx| {
                let existing = Self::load_summary(&db_tx, &id).await?;
                let exists = existing.is_some();
                let mut summary =
                    existing.unwrap_or_else(|| PeriodSummary::for_period(scope, first, now));
                for period in &members {
                    match resources.get(&period.resource_id) {
                        Some(resource) if period.is_active => summary
                            .upsert_entry(period.resource_kind, SummaryEntry::build(period, resource)),
                        _ => {
                            summary.remove_entry(&period.id);
                        }
                    }
                }
                summary.updated_at = now;
                Self::store_summary(&db_tx, &summary, exists).await?;
                Ok::<_, EngineError>(())
            })?;
            written += 1;
        }
        tracing::debug!(periods = periods.len(), summaries = written, "summaries updated in batch");
        Ok(written)
    }

    /// Removes the entries of `periods` from every summary holding them.
    pub async fn remove_periods_from_summaries(
        &self,
        periods: &[ResourcePeriod],
    ) -> ResultEngine<usize> {
        let now = Utc::now();
        let mut grouped: BTreeMap<String, Vec<&str>> = BTreeMap::new();
        for period in periods {
            for scope in SummaryScope::for_period(period) {
                grouped
                    .entry(summary_id(&scope, period.period_type, &period.source_period_id))
                    .or_default()
                    .push(&period.id);
            }
        }

        let mut written = 0;
        for (id, period_ids) in grouped {
            let changed = with_tx!(self, |db_tx| {
                let mut changed = false;
                if let Some(mut summary) = Self::load_summary(&db_tx, &id).await? {
                    for period_id in &period_ids {
                        changed |= summary.remove_entry(period_id);
                    }
                    if changed {
                        summary.updated_at = now;
                        Self::store_summary(&db_tx, &summary, true).await?;
                    }
                }
                Ok::<_, EngineError>(changed)
            })?;
            if changed {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Re-patches the denormalized name and merchant of `resource_id` in
    /// every summary holding one of its periods.
    pub async fn sync_resource_name(&self, resource_id: &str) -> ResultEngine<usize> {
        let now = Utc::now();
        let resource = Self::load_resource(&self.database, resource_id).await?;
        let ids: BTreeSet<String> = resource_periods::Entity::find()
            .filter(resource_periods::Column::ResourceId.eq(resource_id))
            .all(&self.database)
            .await?
            .into_iter()
            .map(ResourcePeriod::try_from)
            .collect::<ResultEngine<Vec<_>>>()?
            .iter()
            .flat_map(|period| {
                SummaryScope::for_period(period)
                    .into_iter()
                    .map(|scope| summary_id(&scope, period.period_type, &period.source_period_id))
            })
            .collect();

        let mut patched = 0;
        for id in ids {
            let changed = with_tx!(self, |db_tx| {
                let mut changed = false;
                if let Some(mut summary) = Self::load_summary(&db_tx, &id).await? {
                    changed = summary.rename_resource(&resource);
                    if changed {
                        summary.updated_at = now;
                        Self::store_summary(&db_tx, &summary, true).await?;
                    }
                }
                Ok::<_, EngineError>(changed)
            })?;
            if changed {
                patched += 1;
            }
        }
        tracing::info!(resource_id, summaries = patched, "resource name synced");
        Ok(patched)
    }

    /// Rebuilds one summary from scratch out of the active resource periods
    /// it covers.
    pub async fn recalculate_period_summary(
        &self,
        scope: SummaryScope,
        period_type: PeriodType,
        source_period_id: &str,
    ) -> ResultEngine<PeriodSummary> {
        let now = Utc::now();
        let source_period = self.source_period(source_period_id).await?;
        if source_period.period_type != period_type {
            return Err(EngineError::InvalidPeriod(format!(
                "{source_period_id} is not a {period_type} period"
            )));
        }

        let mut query = resource_periods::Entity::find()
            .filter(resource_periods::Column::SourcePeriodId.eq(source_period_id))
            .filter(resource_periods::Column::IsActive.eq(true));
        query = match &scope {
            SummaryScope::User(owner_id) => {
                query.filter(resource_periods::Column::OwnerId.eq(owner_id.as_str()))
            }
            SummaryScope::Group(group_id) => query
                .filter(resource_periods::Column::GroupId.eq(group_id.as_str()))
                .filter(resource_periods::Column::IsPrivate.eq(false)),
        };
        let periods = query
            .all(&self.database)
            .await?
            .into_iter()
            .map(ResourcePeriod::try_from)
            .collect::<ResultEngine<Vec<_>>>()?;
        let resources = self.resource_cache(periods.iter()).await?;

        let mut summary = PeriodSummary::empty(
            scope,
            period_type,
            &source_period.id,
            source_period.start,
            source_period.end,
            now,
        );
        for period in &periods {
            if let Some(resource) = resources.get(&period.resource_id) {
                summary.upsert_entry(period.resource_kind, SummaryEntry::build(period, resource));
            }
        }

        with_tx!(self, |db_tx| {
            let exists = Self::load_summary(&db_tx, &summary.id).await?.is_some();
            Self::store_summary(&db_tx, &summary, exists).await?;
            Ok::<_, EngineError>(())
        })?;
        tracing::debug!(summary_id = %summary.id, entries = summary.entries().count(), "summary recalculated");
        Ok(summary)
    }

    /// Reads the caller's summary, building it on first access.
    pub async fn get_period_summary(
        &self,
        principal: &Principal,
        period_type: PeriodType,
        source_period_id: &str,
        include_entries: bool,
    ) -> ResultEngine<PeriodSummary> {
        let scope = SummaryScope::User(principal.uid.clone());
        let id = summary_id(&scope, period_type, source_period_id);
        let summary = match Self::load_summary(&self.database, &id).await? {
            Some(summary) => summary,
            None => {
                self.recalculate_period_summary(scope, period_type, source_period_id)
                    .await?
            }
        };
        Ok(if include_entries {
            summary
        } else {
            summary.without_entries()
        })
    }

    /// Rebuilds every summary derivable from the stored resource periods,
    /// optionally limited to one owner. Keys are processed one at a time
    /// with a pause in between; failures are counted and the run goes on.
    pub async fn backfill_summaries(
        &self,
        principal: &Principal,
        dry_run: bool,
        user_id: Option<&str>,
    ) -> ResultEngine<BackfillReport> {
        Self::require_admin(principal)?;
        let mut query = resource_periods::Entity::find()
            .select_only()
            .column(resource_periods::Column::OwnerId)
            .column(resource_periods::Column::GroupId)
            .column(resource_periods::Column::IsPrivate)
            .column(resource_periods::Column::PeriodType)
            .column(resource_periods::Column::SourcePeriodId)
            .filter(resource_periods::Column::IsActive.eq(true))
            .distinct();
        if let Some(user_id) = user_id {
            query = query.filter(resource_periods::Column::OwnerId.eq(user_id));
        }
        let rows: Vec<(String, Option<String>, bool, String, String)> =
            query.into_tuple().all(&self.database).await?;

        let mut keys: BTreeSet<(SummaryScope, PeriodType, String)> = BTreeSet::new();
        for (owner_id, group_id, is_private, period_type, source_period_id) in rows {
            let period_type = PeriodType::try_from(period_type.as_str())?;
            keys.insert((SummaryScope::User(owner_id), period_type, source_period_id.clone()));
            if let (Some(group_id), false) = (group_id, is_private) {
                keys.insert((SummaryScope::Group(group_id), period_type, source_period_id));
            }
        }

        let mut report = BackfillReport {
            keys: keys.len(),
            dry_run,
            ..BackfillReport::default()
        };
        if dry_run {
            tracing::info!(keys = report.keys, "backfill dry run");
            return Ok(report);
        }

        let throttle = self.settings.backfill_throttle();
        for (index, (scope, period_type, source_period_id)) in keys.into_iter().enumerate() {
            if index > 0 && !throttle.is_zero() {
                tokio::time::sleep(throttle).await;
            }
            let id = summary_id(&scope, period_type, &source_period_id);
            match self
                .recalculate_period_summary(scope, period_type, &source_period_id)
                .await
            {
                Ok(_) => report.rebuilt += 1,
                Err(err) => {
                    report.failed += 1;
                    tracing::error!(summary_id = %id, error = %err, "backfill failed for summary");
                }
            }
        }
        tracing::info!(
            keys = report.keys,
            rebuilt = report.rebuilt,
            failed = report.failed,
            "backfill finished"
        );
        Ok(report)
    }

    /// The stored summary document, without any lazy rebuild.
    pub async fn stored_summary(&self, id: &str) -> ResultEngine<Option<PeriodSummary>> {
        Self::load_summary(&self.database, id).await
    }
}
