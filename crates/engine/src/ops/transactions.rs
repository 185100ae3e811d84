use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseTransaction, QueryFilter, TransactionTrait, prelude::*};
use uuid::Uuid;

use crate::{
    Change, EngineError, NewTransactionCmd, Principal, ResourcePeriod, ResultEngine, Split,
    Transaction, UpdateTransactionCmd,
    reconcile::{self, MAX_CORRECTION_HOPS, SplitCheck},
    contributions,
    resource_periods::{self, TotalsDelta},
    resources::ResourceKind,
    splits,
    transactions::{self, split_active_model},
    util::normalize_optional_text,
};

use super::{Engine, with_tx};

impl Engine {
    /// Records a transaction for the caller, then reconciles it into the
    /// affected periods. Returns the stored transaction, including any split
    /// correction applied on the way.
    pub async fn create_transaction(
        &self,
        principal: &Principal,
        cmd: NewTransactionCmd,
    ) -> ResultEngine<Transaction> {
        let now = Utc::now();
        let currency = cmd.currency.unwrap_or(self.settings.currency);
        let mut tx = Transaction::new(
            principal.uid.as_str(),
            cmd.occurred_at,
            cmd.amount,
            currency,
            now,
        )?;
        tx.description = normalize_optional_text(cmd.description.as_deref());
        tx.merchant = normalize_optional_text(cmd.merchant.as_deref());
        tx.group_id = normalize_optional_text(cmd.group_id.as_deref());
        tx.source = cmd.source;
        tx.splits = cmd.splits;

        self.register_user(&tx.owner_id, now).await?;
        with_tx!(self, |db_tx| {
            Self::validate_split_targets(&db_tx, &tx, None).await?;
            transactions::ActiveModel::from(&tx).insert(&db_tx).await?;
            Self::replace_splits(&db_tx, &tx).await?;
            Ok::<_, EngineError>(())
        })?;
        tracing::info!(transaction_id = %tx.id, owner_id = %tx.owner_id, amount = %tx.amount, "transaction created");

        let id = tx.id;
        self.handle_transaction_change(Change::created(tx)).await;
        Self::load_transaction(&self.database, id).await
    }

    pub async fn update_transaction(
        &self,
        principal: &Principal,
        transaction_id: Uuid,
        cmd: UpdateTransactionCmd,
    ) -> ResultEngine<Transaction> {
        let now = Utc::now();
        let (before, after) = with_tx!(self, |db_tx| {
            let before = Self::load_transaction(&db_tx, transaction_id).await?;
            Self::require_access(principal, &before.owner_id, "transaction")?;
            if before.is_deleted() {
                return Err(EngineError::KeyNotFound(format!(
                    "transaction {transaction_id}"
                )));
            }
            let mut after = before.clone();
            if let Some(occurred_at) = cmd.occurred_at {
                after.occurred_at = occurred_at;
            }
            if let Some(amount) = cmd.amount {
                if amount.is_zero() {
                    return Err(EngineError::InvalidAmount(
                        "transaction amount must not be zero".to_string(),
                    ));
                }
                after.amount = amount;
            }
            if let Some(description) = &cmd.description {
                after.description = normalize_optional_text(Some(description));
            }
            if let Some(merchant) = &cmd.merchant {
                after.merchant = normalize_optional_text(Some(merchant));
            }
            if let Some(new_splits) = &cmd.splits {
                after.splits = new_splits.clone();
            }
            after.updated_at = now;

            Self::validate_split_targets(&db_tx, &after, Some(&before)).await?;
            transactions::ActiveModel::from(&after).update(&db_tx).await?;
            // Split rows carry the transaction date, so they are rewritten
            // on every update.
            Self::replace_splits(&db_tx, &after).await?;
            Ok::<_, EngineError>((before, after))
        })?;
        tracing::info!(transaction_id = %transaction_id, "transaction updated");

        self.handle_transaction_change(Change::updated(before, after))
            .await;
        Self::load_transaction(&self.database, transaction_id).await
    }

    /// Soft delete: the row stays with `deleted_at` set and its effects on
    /// period totals are reversed.
    pub async fn delete_transaction(
        &self,
        principal: &Principal,
        transaction_id: Uuid,
    ) -> ResultEngine<()> {
        let now = Utc::now();
        let before = with_tx!(self, |db_tx| {
            let before = Self::load_transaction(&db_tx, transaction_id).await?;
            Self::require_access(principal, &before.owner_id, "transaction")?;
            if before.is_deleted() {
                return Err(EngineError::KeyNotFound(format!(
                    "transaction {transaction_id}"
                )));
            }
            let mut deleted = before.clone();
            deleted.deleted_at = Some(now);
            deleted.updated_at = now;
            transactions::ActiveModel::from(&deleted)
                .update(&db_tx)
                .await?;
            Ok::<_, EngineError>(before)
        })?;
        tracing::info!(transaction_id = %transaction_id, "transaction deleted");

        self.handle_transaction_change(Change::deleted(before)).await;
        Ok(())
    }

    /// Derived updates after a transaction write.
    ///
    /// Splits that do not add up are corrected and persisted first; the
    /// corrected version then stands in for the written one. At most
    /// `MAX_CORRECTION_HOPS` corrections run per change, after which the
    /// change is reconciled as it is. Failures are logged, never returned.
    pub async fn handle_transaction_change(&self, change: Change<Transaction>) {
        let mut change = change;
        let mut hops = 0;
        while let Some(after) = change.after.as_ref().filter(|tx| !tx.is_deleted()) {
            let transaction_id = after.id;
            let SplitCheck::Corrected(corrected_splits) = reconcile::validate_splits(after) else {
                break;
            };
            if hops >= MAX_CORRECTION_HOPS {
                tracing::warn!(
                    transaction_id = %transaction_id,
                    "split correction limit reached, reconciling as is"
                );
                break;
            }
            hops += 1;
            let corrected = self.correct_splits(after, corrected_splits).await;
            match corrected {
                Ok(corrected) => change.after = Some(corrected),
                Err(err) => {
                    tracing::error!(transaction_id = %transaction_id, error = %err, "split correction failed");
                    return;
                }
            }
        }

        let transaction_id = change
            .after
            .as_ref()
            .or(change.before.as_ref())
            .map(|tx| tx.id);
        if let Err(err) = self.reconcile_change(&change).await {
            tracing::error!(
                transaction_id = ?transaction_id,
                error = %err,
                "reconciliation failed, totals need a rebuild"
            );
        }
    }

    async fn correct_splits(
        &self,
        tx: &Transaction,
        corrected_splits: Vec<Split>,
    ) -> ResultEngine<Transaction> {
        let mut corrected = tx.clone();
        corrected.splits = corrected_splits;
        with_tx!(self, |db_tx| {
            Self::replace_splits(&db_tx, &corrected).await?;
            Ok::<_, EngineError>(())
        })?;
        tracing::warn!(
            transaction_id = %tx.id,
            splits = corrected.splits.len(),
            "splits did not add up, corrected"
        );
        Ok(corrected)
    }

    /// Brings every period `change` touches in line with the transaction as
    /// it is now, then refreshes occurrences of the linked bills and income
    /// and pushes the resulting periods into their summaries.
    ///
    /// Each period moves by what the transaction should contribute minus
    /// what its contribution rows say it already did, inside one store
    /// transaction that also rewrites those rows. A period that no longer
    /// exists is skipped, one that did not exist yet receives nothing.
    async fn reconcile_change(&self, change: &Change<Transaction>) -> ResultEngine<()> {
        let (before, after) = (change.before.as_ref(), change.after.as_ref());
        if let (Some(before), Some(after)) = (before, after)
            && !reconcile::spending_changed(before, after)
        {
            tracing::debug!(transaction_id = %after.id, "no spending change");
            return Ok(());
        }
        let Some(tx) = after.or(before) else {
            return Ok(());
        };
        let transaction_id = tx.id.to_string();
        let owner_id = tx.owner_id.clone();
        let now = Utc::now();
        let everything_else = Self::everything_else_id(&self.database, &owner_id).await?;

        let before_effects = before
            .map(|tx| reconcile::effects(tx, everything_else.as_deref()))
            .unwrap_or_default();
        let after_effects = after
            .map(|tx| reconcile::effects(tx, everything_else.as_deref()))
            .unwrap_or_default();

        let mut touched = with_tx!(self, |db_tx| {
            let mut wanted: BTreeMap<String, (String, TotalsDelta)> = BTreeMap::new();
            for effect in &after_effects {
                let periods =
                    Self::periods_containing(&db_tx, &effect.resource_id, effect.at).await?;
                if periods.is_empty() {
                    tracing::debug!(
                        resource_id = %effect.resource_id,
                        at = %effect.at,
                        "no period covers the transaction date yet"
                    );
                }
                for period in periods {
                    wanted
                        .entry(period.id)
                        .or_insert_with(|| (effect.resource_id.clone(), TotalsDelta::default()))
                        .1 += effect.delta;
                }
            }

            let recorded = contributions::Entity::find()
                .filter(contributions::Column::TransactionId.eq(transaction_id.as_str()))
                .all(&db_tx)
                .await?;
            let mut deltas: BTreeMap<String, TotalsDelta> = wanted
                .iter()
                .map(|(period_id, (_, delta))| (period_id.clone(), *delta))
                .collect();
            for row in &recorded {
                *deltas.entry(row.resource_period_id.clone()).or_default() +=
                    row.delta().negated();
            }

            let mut touched: BTreeMap<String, (ResourcePeriod, ResourcePeriod)> = BTreeMap::new();
            for (period_id, delta) in deltas {
                if delta.is_zero() {
                    continue;
                }
                let Some(old) = Self::find_period(&db_tx, &period_id).await? else {
                    tracing::debug!(
                        period_id = %period_id,
                        "contribution to a removed period dropped"
                    );
                    continue;
                };
                let mut new = old.clone();
                new.totals.apply(delta);
                new.refresh_status(now, self.settings.due_soon_days);
                new.updated_at = now;
                new.last_calculated = now;
                Self::save_period(&db_tx, &new).await?;
                tracing::debug!(
                    period_id = %period_id,
                    spent = %new.totals.spent,
                    paid = %new.totals.total_amount_paid,
                    "period totals reconciled"
                );
                touched.insert(period_id, (old, new));
            }

            contributions::Entity::delete_many()
                .filter(contributions::Column::TransactionId.eq(transaction_id.as_str()))
                .exec(&db_tx)
                .await?;
            let rows: Vec<contributions::ActiveModel> = wanted
                .iter()
                .filter(|(_, (_, delta))| !delta.is_zero())
                .map(|(period_id, (resource_id, delta))| {
                    contributions::active_model(&transaction_id, period_id, resource_id, *delta)
                })
                .collect();
            if !rows.is_empty() {
                contributions::Entity::insert_many(rows).exec(&db_tx).await?;
            }
            Ok::<_, EngineError>(touched)
        })?;

        // Payment links are matched against the full set of payments, so
        // every linked period is refreshed even when its totals netted out.
        let mut linked: BTreeSet<String> = BTreeSet::new();
        for effect in before_effects.iter().chain(&after_effects) {
            if effect.kind == ResourceKind::Budget {
                continue;
            }
            for period in Self::periods_containing(&self.database, &effect.resource_id, effect.at).await? {
                linked.insert(period.id);
            }
        }
        for period_id in linked {
            if let Some(refreshed) = self.refresh_occurrences_of(&period_id, now).await?
                && let Some(new) = refreshed.after
            {
                match touched.get_mut(&period_id) {
                    Some(entry) => entry.1 = new,
                    None => {
                        if let Some(old) = refreshed.before {
                            touched.insert(period_id, (old, new));
                        }
                    }
                }
            }
        }

        for (period_id, (old, new)) in touched {
            if let Err(err) = self.apply_period_to_summaries(Change::updated(old, new)).await {
                tracing::error!(period_id = %period_id, error = %err, "summary update failed");
            }
        }
        Ok(())
    }

    /// Every period of `resource_id` whose range contains `at`, one per
    /// period type.
    async fn periods_containing<C: ConnectionTrait>(
        db: &C,
        resource_id: &str,
        at: DateTime<Utc>,
    ) -> ResultEngine<Vec<ResourcePeriod>> {
        resource_periods::Entity::find()
            .filter(resource_periods::Column::ResourceId.eq(resource_id))
            .filter(resource_periods::Column::PeriodStart.lte(at))
            .filter(resource_periods::Column::PeriodEnd.gte(at))
            .all(db)
            .await?
            .into_iter()
            .map(ResourcePeriod::try_from)
            .collect()
    }

    /// Split targets must exist, belong to the transaction owner and have
    /// the kind the link implies. Income receipts cannot also be spending.
    ///
    /// Targets already linked by `previous` are not looked up again: a
    /// resource deleted since then must not block edits of the transaction.
    async fn validate_split_targets<C: ConnectionTrait>(
        db: &C,
        tx: &Transaction,
        previous: Option<&Transaction>,
    ) -> ResultEngine<()> {
        let known: BTreeSet<(&str, ResourceKind)> = previous
            .into_iter()
            .flat_map(|prev| &prev.splits)
            .flat_map(|split| {
                [
                    (split.budget_id.as_deref(), ResourceKind::Budget),
                    (split.outflow_id.as_deref(), ResourceKind::Outflow),
                    (split.inflow_id.as_deref(), ResourceKind::Inflow),
                ]
            })
            .filter_map(|(target, kind)| target.map(|id| (id, kind)))
            .collect();
        for split in &tx.splits {
            if split.withheld.is_negative() {
                return Err(EngineError::InvalidAmount(
                    "withheld amount must not be negative".to_string(),
                ));
            }
            if split.inflow_id.is_some()
                && (split.budget_id.is_some() || split.outflow_id.is_some())
            {
                return Err(EngineError::InvalidField(
                    "an income split cannot also target a budget or a bill".to_string(),
                ));
            }
            if split.inflow_id.is_none() && !split.withheld.is_zero() {
                return Err(EngineError::InvalidField(
                    "only income splits carry a withheld amount".to_string(),
                ));
            }
            let targets = [
                (split.budget_id.as_deref(), ResourceKind::Budget),
                (split.outflow_id.as_deref(), ResourceKind::Outflow),
                (split.inflow_id.as_deref(), ResourceKind::Inflow),
            ];
            for (target, kind) in targets {
                let Some(resource_id) = target else {
                    continue;
                };
                if known.contains(&(resource_id, kind)) {
                    continue;
                }
                let resource = Self::load_resource(db, resource_id).await?;
                if resource.owner_id != tx.owner_id {
                    return Err(EngineError::Forbidden(format!(
                        "resource {resource_id} belongs to another user"
                    )));
                }
                if resource.kind() != kind {
                    return Err(EngineError::InvalidField(format!(
                        "resource {resource_id} is a {}, not a {}",
                        resource.kind().as_str(),
                        kind.as_str()
                    )));
                }
            }
        }
        Ok(())
    }

    async fn replace_splits(db_tx: &DatabaseTransaction, tx: &Transaction) -> ResultEngine<()> {
        splits::Entity::delete_many()
            .filter(splits::Column::TransactionId.eq(tx.id.to_string()))
            .exec(db_tx)
            .await?;
        if tx.splits.is_empty() {
            return Ok(());
        }
        let models = tx
            .splits
            .iter()
            .enumerate()
            .map(|(position, split)| split_active_model(tx, position, split));
        splits::Entity::insert_many(models).exec(db_tx).await?;
        Ok(())
    }
}
