use sea_orm::{ActiveModelTrait, ConnectionTrait, QueryFilter, QueryOrder, prelude::*};

use crate::{
    EngineError, Principal, RecurringResource, ResourcePeriod, ResultEngine, Transaction,
    resource_periods, resources, splits, transactions,
};

use super::Engine;

impl Engine {
    pub(super) fn require_admin(principal: &Principal) -> ResultEngine<()> {
        if !principal.is_admin() {
            return Err(EngineError::Forbidden("admin role required".to_string()));
        }
        Ok(())
    }

    pub(super) fn require_access(
        principal: &Principal,
        owner_id: &str,
        what: &str,
    ) -> ResultEngine<()> {
        if !principal.can_access(owner_id) {
            return Err(EngineError::Forbidden(format!(
                "{what} belongs to another user"
            )));
        }
        Ok(())
    }

    pub(super) async fn find_resource<C: ConnectionTrait>(
        db: &C,
        resource_id: &str,
    ) -> ResultEngine<Option<RecurringResource>> {
        resources::Entity::find_by_id(resource_id.to_string())
            .one(db)
            .await?
            .map(RecurringResource::try_from)
            .transpose()
    }

    pub(super) async fn load_resource<C: ConnectionTrait>(
        db: &C,
        resource_id: &str,
    ) -> ResultEngine<RecurringResource> {
        Self::find_resource(db, resource_id)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(format!("resource {resource_id}")))
    }

    pub(super) async fn require_resource<C: ConnectionTrait>(
        db: &C,
        principal: &Principal,
        resource_id: &str,
    ) -> ResultEngine<RecurringResource> {
        let resource = Self::load_resource(db, resource_id).await?;
        Self::require_access(principal, &resource.owner_id, "resource")?;
        Ok(resource)
    }

    pub(super) async fn find_period<C: ConnectionTrait>(
        db: &C,
        period_id: &str,
    ) -> ResultEngine<Option<ResourcePeriod>> {
        resource_periods::Entity::find_by_id(period_id.to_string())
            .one(db)
            .await?
            .map(ResourcePeriod::try_from)
            .transpose()
    }

    pub(super) async fn load_period<C: ConnectionTrait>(
        db: &C,
        period_id: &str,
    ) -> ResultEngine<ResourcePeriod> {
        Self::find_period(db, period_id)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(format!("resource period {period_id}")))
    }

    pub(super) async fn load_transaction<C: ConnectionTrait>(
        db: &C,
        transaction_id: Uuid,
    ) -> ResultEngine<Transaction> {
        let model = transactions::Entity::find_by_id(transaction_id.to_string())
            .one(db)
            .await?
            .ok_or_else(|| EngineError::KeyNotFound(format!("transaction {transaction_id}")))?;
        let split_models = splits::Entity::find()
            .filter(splits::Column::TransactionId.eq(transaction_id.to_string()))
            .all(db)
            .await?;
        Transaction::from_models(model, split_models)
    }

    pub(super) async fn save_resource<C: ConnectionTrait>(
        db: &C,
        resource: &RecurringResource,
    ) -> ResultEngine<()> {
        resources::ActiveModel::try_from(resource)?.update(db).await?;
        Ok(())
    }

    pub(super) async fn save_period<C: ConnectionTrait>(
        db: &C,
        period: &ResourcePeriod,
    ) -> ResultEngine<()> {
        resource_periods::ActiveModel::try_from(period)?
            .update(db)
            .await?;
        Ok(())
    }

    /// Id of the owner's active everything-else budget, oldest first.
    pub(super) async fn everything_else_id<C: ConnectionTrait>(
        db: &C,
        owner_id: &str,
    ) -> ResultEngine<Option<String>> {
        Ok(resources::Entity::find()
            .filter(resources::Column::OwnerId.eq(owner_id))
            .filter(resources::Column::IsSystemEverythingElse.eq(true))
            .filter(resources::Column::IsActive.eq(true))
            .order_by_asc(resources::Column::CreatedAt)
            .one(db)
            .await?
            .map(|model| model.id))
    }

    /// Returns a resource the principal may read.
    pub async fn resource(
        &self,
        principal: &Principal,
        resource_id: &str,
    ) -> ResultEngine<RecurringResource> {
        Self::require_resource(&self.database, principal, resource_id).await
    }

    /// Returns every resource of the principal, oldest first.
    pub async fn resources(&self, principal: &Principal) -> ResultEngine<Vec<RecurringResource>> {
        resources::Entity::find()
            .filter(resources::Column::OwnerId.eq(principal.uid.as_str()))
            .order_by_asc(resources::Column::CreatedAt)
            .all(&self.database)
            .await?
            .into_iter()
            .map(RecurringResource::try_from)
            .collect()
    }

    /// Returns the periods of a resource ordered by start, then type.
    pub async fn resource_periods(
        &self,
        principal: &Principal,
        resource_id: &str,
    ) -> ResultEngine<Vec<ResourcePeriod>> {
        Self::require_resource(&self.database, principal, resource_id).await?;
        let mut periods = resource_periods::Entity::find()
            .filter(resource_periods::Column::ResourceId.eq(resource_id))
            .order_by_asc(resource_periods::Column::PeriodStart)
            .all(&self.database)
            .await?
            .into_iter()
            .map(ResourcePeriod::try_from)
            .collect::<ResultEngine<Vec<_>>>()?;
        periods.sort_by(|a, b| {
            a.period_start
                .cmp(&b.period_start)
                .then_with(|| a.period_type.cmp(&b.period_type))
        });
        Ok(periods)
    }

    pub async fn resource_period(
        &self,
        principal: &Principal,
        period_id: &str,
    ) -> ResultEngine<ResourcePeriod> {
        let period = Self::load_period(&self.database, period_id).await?;
        Self::require_access(principal, &period.owner_id, "resource period")?;
        Ok(period)
    }

    pub async fn transaction(
        &self,
        principal: &Principal,
        transaction_id: Uuid,
    ) -> ResultEngine<Transaction> {
        let tx = Self::load_transaction(&self.database, transaction_id).await?;
        Self::require_access(principal, &tx.owner_id, "transaction")?;
        Ok(tx)
    }
}
