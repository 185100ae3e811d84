use chrono::{DateTime, Utc};
use sea_orm::{
    DatabaseTransaction, QueryFilter, QueryOrder, TransactionTrait, prelude::*,
    sea_query::OnConflict,
};

use crate::{
    EngineError, PeriodType, Principal, ResultEngine, SourcePeriod, calendar, source_periods,
};

use super::{Engine, with_tx};

impl Engine {
    /// Persists the calendar for `year_start..=year_end` and returns the
    /// number of source periods generated.
    ///
    /// Without `reset` this is an insert-if-absent by id, committed in
    /// chunks, so reruns never duplicate. With `reset` every stored period is
    /// deleted and the grid rebuilt inside a single store transaction.
    pub async fn generate_calendar(
        &self,
        principal: &Principal,
        year_start: i32,
        year_end: i32,
        reset: bool,
    ) -> ResultEngine<usize> {
        Self::require_admin(principal)?;
        let periods = calendar::generate(year_start, year_end)?;

        if reset {
            with_tx!(self, |db_tx| {
                let deleted = source_periods::Entity::delete_many().exec(&db_tx).await?;
                tracing::warn!(
                    deleted = deleted.rows_affected,
                    "regenerating calendar from scratch"
                );
                for chunk in periods.chunks(self.settings.batch_chunk_size) {
                    insert_source_periods(&db_tx, chunk).await?;
                }
                Ok::<_, EngineError>(())
            })?;
        } else {
            for chunk in periods.chunks(self.settings.batch_chunk_size) {
                with_tx!(self, |db_tx| {
                    insert_source_periods(&db_tx, chunk).await?;
                    Ok::<_, EngineError>(())
                })?;
            }
        }

        tracing::info!(
            year_start,
            year_end,
            periods = periods.len(),
            reset,
            "calendar generated"
        );
        Ok(periods.len())
    }

    /// Source periods of the given types overlapping `[start, end]`
    /// (inclusive on both sides), ordered by start date.
    pub async fn source_periods_overlapping(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        types: &[PeriodType],
    ) -> ResultEngine<Vec<SourcePeriod>> {
        Self::overlapping_in(&self.database, start, end, types).await
    }

    pub(super) async fn overlapping_in<C: ConnectionTrait>(
        db: &C,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        types: &[PeriodType],
    ) -> ResultEngine<Vec<SourcePeriod>> {
        let types: Vec<&str> = types.iter().map(|t| t.as_str()).collect();
        source_periods::Entity::find()
            .filter(source_periods::Column::EndDate.gte(start))
            .filter(source_periods::Column::StartDate.lte(end))
            .filter(source_periods::Column::PeriodType.is_in(types))
            .order_by_asc(source_periods::Column::StartDate)
            .order_by_asc(source_periods::Column::Id)
            .all(db)
            .await?
            .into_iter()
            .map(SourcePeriod::try_from)
            .collect()
    }

    /// The source period of `period_type` containing `now`.
    pub async fn current_source_period(
        &self,
        period_type: PeriodType,
        now: DateTime<Utc>,
    ) -> ResultEngine<SourcePeriod> {
        Self::overlapping_in(&self.database, now, now, &[period_type])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| {
                EngineError::MissingCalendar(format!("no {period_type} period contains {now}"))
            })
    }

    pub async fn source_period(&self, source_period_id: &str) -> ResultEngine<SourcePeriod> {
        source_periods::Entity::find_by_id(source_period_id.to_string())
            .one(&self.database)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(format!("source period {source_period_id}")))?
            .try_into()
    }
}

async fn insert_source_periods(
    db_tx: &DatabaseTransaction,
    periods: &[SourcePeriod],
) -> ResultEngine<()> {
    if periods.is_empty() {
        return Ok(());
    }
    source_periods::Entity::insert_many(periods.iter().map(source_periods::ActiveModel::from))
        .on_conflict(
            OnConflict::column(source_periods::Column::Id)
                .do_nothing()
                .to_owned(),
        )
        .do_nothing()
        .exec(db_tx)
        .await?;
    Ok(())
}
