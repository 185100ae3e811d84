//! Transaction primitives.
//!
//! A `Transaction` is a financial event split across one or more
//! [`Split`]s. Splits say where the money goes: a budget (or the owner's
//! everything-else budget when unassigned), optionally a bill payment and
//! optionally an income receipt. Transactions never store period totals.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Currency, EngineError, Money, ResultEngine, resources::RecordSource};

use super::splits;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub id: Uuid,
    pub amount: Money,
    /// Target budget; `None` resolves to the everything-else budget.
    pub budget_id: Option<String>,
    /// Outflow this split pays.
    pub outflow_id: Option<String>,
    /// Inflow this split receives. Receipts never count as spending.
    pub inflow_id: Option<String>,
    pub withheld: Money,
}

impl Split {
    #[must_use]
    pub fn new(amount: Money) -> Self {
        Self {
            id: Uuid::new_v4(),
            amount,
            budget_id: None,
            outflow_id: None,
            inflow_id: None,
            withheld: Money::ZERO,
        }
    }

    #[must_use]
    pub fn budget(mut self, budget_id: impl Into<String>) -> Self {
        self.budget_id = Some(budget_id.into());
        self
    }

    #[must_use]
    pub fn outflow(mut self, outflow_id: impl Into<String>) -> Self {
        self.outflow_id = Some(outflow_id.into());
        self
    }

    #[must_use]
    pub fn inflow(mut self, inflow_id: impl Into<String>) -> Self {
        self.inflow_id = Some(inflow_id.into());
        self
    }

    #[must_use]
    pub fn withheld(mut self, withheld: Money) -> Self {
        self.withheld = withheld;
        self
    }

    /// `true` for a split with no explicit target at all.
    pub fn is_unassigned(&self) -> bool {
        self.budget_id.is_none() && self.outflow_id.is_none() && self.inflow_id.is_none()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub owner_id: String,
    pub group_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub amount: Money,
    pub currency: Currency,
    pub description: Option<String>,
    pub merchant: Option<String>,
    pub source: RecordSource,
    pub splits: Vec<Split>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Transaction {
    pub fn new(
        owner_id: impl Into<String>,
        occurred_at: DateTime<Utc>,
        amount: Money,
        currency: Currency,
        now: DateTime<Utc>,
    ) -> ResultEngine<Self> {
        if amount.is_zero() {
            return Err(EngineError::InvalidAmount(
                "transaction amount must not be zero".to_string(),
            ));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            group_id: None,
            occurred_at,
            amount,
            currency,
            description: None,
            merchant: None,
            source: RecordSource::Manual,
            splits: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    pub fn split_total(&self) -> Money {
        self.splits.iter().map(|s| s.amount).sum()
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "transactions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub owner_id: String,
    pub group_id: Option<String>,
    pub occurred_at: DateTimeUtc,
    pub amount_minor: i64,
    pub currency: String,
    pub description: Option<String>,
    pub merchant: Option<String>,
    pub source: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub deleted_at: Option<DateTimeUtc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::splits::Entity")]
    Splits,
}

impl Related<super::splits::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Splits.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Transaction> for ActiveModel {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: ActiveValue::Set(tx.id.to_string()),
            owner_id: ActiveValue::Set(tx.owner_id.clone()),
            group_id: ActiveValue::Set(tx.group_id.clone()),
            occurred_at: ActiveValue::Set(tx.occurred_at),
            amount_minor: ActiveValue::Set(tx.amount.minor()),
            currency: ActiveValue::Set(tx.currency.code().to_string()),
            description: ActiveValue::Set(tx.description.clone()),
            merchant: ActiveValue::Set(tx.merchant.clone()),
            source: ActiveValue::Set(tx.source.as_str().to_string()),
            created_at: ActiveValue::Set(tx.created_at),
            updated_at: ActiveValue::Set(tx.updated_at),
            deleted_at: ActiveValue::Set(tx.deleted_at),
        }
    }
}

impl Transaction {
    /// Rebuilds a transaction from its row and split rows.
    pub(crate) fn from_models(
        model: Model,
        mut split_models: Vec<splits::Model>,
    ) -> ResultEngine<Self> {
        split_models.sort_by_key(|s| s.position);
        let splits = split_models
            .into_iter()
            .map(Split::try_from)
            .collect::<ResultEngine<Vec<_>>>()?;
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::KeyNotFound("transaction not exists".to_string()))?,
            currency: Currency::try_from(model.currency.as_str())?,
            source: RecordSource::try_from(model.source.as_str())?,
            owner_id: model.owner_id,
            group_id: model.group_id,
            occurred_at: model.occurred_at,
            amount: Money::new(model.amount_minor),
            description: model.description,
            merchant: model.merchant,
            splits,
            created_at: model.created_at,
            updated_at: model.updated_at,
            deleted_at: model.deleted_at,
        })
    }
}

impl TryFrom<splits::Model> for Split {
    type Error = EngineError;

    fn try_from(model: splits::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id)
                .map_err(|_| EngineError::InvalidField("invalid split id".to_string()))?,
            amount: Money::new(model.amount_minor),
            budget_id: model.budget_id,
            outflow_id: model.outflow_id,
            inflow_id: model.inflow_id,
            withheld: Money::new(model.withheld_minor),
        })
    }
}

pub(crate) fn split_active_model(
    tx: &Transaction,
    position: usize,
    split: &Split,
) -> splits::ActiveModel {
    splits::ActiveModel {
        id: ActiveValue::Set(split.id.to_string()),
        transaction_id: ActiveValue::Set(tx.id.to_string()),
        position: ActiveValue::Set(position as i32),
        owner_id: ActiveValue::Set(tx.owner_id.clone()),
        occurred_at: ActiveValue::Set(tx.occurred_at),
        amount_minor: ActiveValue::Set(split.amount.minor()),
        budget_id: ActiveValue::Set(split.budget_id.clone()),
        outflow_id: ActiveValue::Set(split.outflow_id.clone()),
        inflow_id: ActiveValue::Set(split.inflow_id.clone()),
        withheld_minor: ActiveValue::Set(split.withheld.minor()),
    }
}
