//! Resource periods: one recurring resource projected onto one source period.
//!
//! A [`ResourcePeriod`] is the system of record for running totals. Its id is
//! `{resourceId}_{sourcePeriodId}`, so there is never more than one per pair
//! and every write is an upsert by id.

use chrono::{DateTime, TimeDelta, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    EngineError, Money, PeriodType, ResultEngine, occurrences::OccurrenceState,
    resources::ResourceKind,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PeriodStatus {
    NotDue,
    DueSoon,
    Overdue,
    Partial,
    Paid,
    /// Budgets carry no payment state.
    Pending,
}

impl PeriodStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NotDue => "NOT_DUE",
            Self::DueSoon => "DUE_SOON",
            Self::Overdue => "OVERDUE",
            Self::Partial => "PARTIAL",
            Self::Paid => "PAID",
            Self::Pending => "PENDING",
        }
    }

    /// Derives the payment status of a period.
    ///
    /// `PAID` once paid covers due. Past the due date an uncovered period is
    /// `PARTIAL` with some payment and `OVERDUE` without. Before it, the
    /// period is `DUE_SOON` within `due_soon_days` and `NOT_DUE` otherwise.
    #[must_use]
    pub fn derive(
        kind: ResourceKind,
        totals: &PeriodTotals,
        due_date: DateTime<Utc>,
        now: DateTime<Utc>,
        due_soon_days: i64,
    ) -> Self {
        if kind == ResourceKind::Budget {
            return Self::Pending;
        }
        if totals.total_amount_paid >= totals.total_amount_due {
            return Self::Paid;
        }
        if now > due_date {
            return if totals.total_amount_paid.is_positive() {
                Self::Partial
            } else {
                Self::Overdue
            };
        }
        if due_date - now <= TimeDelta::days(due_soon_days) {
            Self::DueSoon
        } else {
            Self::NotDue
        }
    }
}

impl TryFrom<&str> for PeriodStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "NOT_DUE" => Ok(Self::NotDue),
            "DUE_SOON" => Ok(Self::DueSoon),
            "OVERDUE" => Ok(Self::Overdue),
            "PARTIAL" => Ok(Self::Partial),
            "PAID" => Ok(Self::Paid),
            "PENDING" => Ok(Self::Pending),
            other => Err(EngineError::InvalidField(format!(
                "invalid period status: {other}"
            ))),
        }
    }
}

/// Running totals of a period, in minor units.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodTotals {
    pub spent: Money,
    pub total_amount_due: Money,
    pub total_amount_paid: Money,
    pub total_amount_unpaid: Money,
    pub amount_withheld: Money,
}

/// Signed change to a period's running totals.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TotalsDelta {
    pub spent: Money,
    pub paid: Money,
    pub withheld: Money,
}

impl TotalsDelta {
    pub fn is_zero(&self) -> bool {
        self.spent.is_zero() && self.paid.is_zero() && self.withheld.is_zero()
    }

    #[must_use]
    pub fn negated(self) -> Self {
        Self {
            spent: -self.spent,
            paid: -self.paid,
            withheld: -self.withheld,
        }
    }
}

impl std::ops::AddAssign for TotalsDelta {
    fn add_assign(&mut self, rhs: Self) {
        self.spent += rhs.spent;
        self.paid += rhs.paid;
        self.withheld += rhs.withheld;
    }
}

impl PeriodTotals {
    /// Totals of a freshly projected period.
    pub fn for_allocation(kind: ResourceKind, allocated: Money) -> Self {
        match kind {
            ResourceKind::Budget => Self::default(),
            ResourceKind::Outflow | ResourceKind::Inflow => Self {
                total_amount_due: allocated,
                total_amount_unpaid: allocated.non_negative(),
                ..Self::default()
            },
        }
    }

    pub fn apply(&mut self, delta: TotalsDelta) {
        self.spent += delta.spent;
        self.total_amount_paid += delta.paid;
        self.amount_withheld += delta.withheld;
        self.refresh_unpaid();
    }

    /// Replaces the running totals with `sum`, keeping the due amount.
    pub fn rebuild(&mut self, sum: TotalsDelta) {
        self.spent = sum.spent;
        self.total_amount_paid = sum.paid;
        self.amount_withheld = sum.withheld;
        self.refresh_unpaid();
    }

    /// Sets the due amount after an allocation change.
    pub fn set_due(&mut self, due: Money) {
        self.total_amount_due = due;
        self.refresh_unpaid();
    }

    fn refresh_unpaid(&mut self) {
        self.total_amount_unpaid = (self.total_amount_due - self.total_amount_paid).non_negative();
    }
}

/// Ad hoc checklist row attached to a budget period.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub id: String,
    pub name: String,
    pub expected_amount: Money,
    pub actual_amount: Money,
    pub is_checked: bool,
    pub created_at: DateTime<Utc>,
}

impl ChecklistItem {
    pub fn new(name: impl Into<String>, expected_amount: Money, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            name: name.into(),
            expected_amount,
            actual_amount: Money::ZERO,
            is_checked: false,
            created_at: now,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourcePeriod {
    pub id: String,
    pub resource_id: String,
    pub resource_kind: ResourceKind,
    pub owner_id: String,
    pub group_id: Option<String>,
    pub is_private: bool,
    pub source_period_id: String,
    pub period_type: PeriodType,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub allocated_amount: Money,
    pub totals: PeriodTotals,
    pub status: PeriodStatus,
    pub occurrences: OccurrenceState,
    pub checklist: Vec<ChecklistItem>,
    pub is_active: bool,
    /// Set once a user overrides `allocated_amount`; recalculation skips it.
    pub is_modified: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_calculated: DateTime<Utc>,
}

impl ResourcePeriod {
    pub fn id_for(resource_id: &str, source_period_id: &str) -> String {
        format!("{resource_id}_{source_period_id}")
    }

    /// The date the period's status is measured against: the first unpaid
    /// occurrence, else the last occurrence, else the end of the period.
    #[must_use]
    pub fn due_date(&self) -> DateTime<Utc> {
        let occ = &self.occurrences;
        occ.due_dates
            .iter()
            .zip(&occ.paid_flags)
            .find(|(_, paid)| !**paid)
            .map(|(due, _)| *due)
            .or_else(|| occ.due_dates.last().copied())
            .unwrap_or(self.period_end)
    }

    /// Re-derives `status` from totals, occurrences and `now`.
    pub fn refresh_status(&mut self, now: DateTime<Utc>, due_soon_days: i64) {
        self.status = PeriodStatus::derive(
            self.resource_kind,
            &self.totals,
            self.due_date(),
            now,
            due_soon_days,
        );
    }

    /// Replaces the allocation, keeping derived totals consistent.
    pub fn set_allocation(&mut self, amount: Money) {
        self.allocated_amount = amount;
        if self.resource_kind != ResourceKind::Budget {
            self.totals.set_due(amount);
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.period_start <= at && at <= self.period_end
    }

    pub fn checklist_item_mut(&mut self, item_id: &str) -> ResultEngine<&mut ChecklistItem> {
        self.checklist
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| EngineError::KeyNotFound(format!("checklist item {item_id}")))
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "resource_periods")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub resource_id: String,
    pub resource_kind: String,
    pub owner_id: String,
    pub group_id: Option<String>,
    pub is_private: bool,
    pub source_period_id: String,
    pub period_type: String,
    pub period_start: DateTimeUtc,
    pub period_end: DateTimeUtc,
    pub allocated_minor: i64,
    pub spent_minor: i64,
    pub due_minor: i64,
    pub paid_minor: i64,
    pub unpaid_minor: i64,
    pub withheld_minor: i64,
    pub status: String,
    pub occurrences: Json,
    pub checklist: Json,
    pub is_active: bool,
    pub is_modified: bool,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
    pub last_calculated: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::resources::Entity",
        from = "Column::ResourceId",
        to = "super::resources::Column::Id"
    )]
    Resource,
}

impl Related<super::resources::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Resource.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&ResourcePeriod> for ActiveModel {
    type Error = EngineError;

    fn try_from(period: &ResourcePeriod) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ActiveValue::Set(period.id.clone()),
            resource_id: ActiveValue::Set(period.resource_id.clone()),
            resource_kind: ActiveValue::Set(period.resource_kind.as_str().to_string()),
            owner_id: ActiveValue::Set(period.owner_id.clone()),
            group_id: ActiveValue::Set(period.group_id.clone()),
            is_private: ActiveValue::Set(period.is_private),
            source_period_id: ActiveValue::Set(period.source_period_id.clone()),
            period_type: ActiveValue::Set(period.period_type.as_str().to_string()),
            period_start: ActiveValue::Set(period.period_start),
            period_end: ActiveValue::Set(period.period_end),
            allocated_minor: ActiveValue::Set(period.allocated_amount.minor()),
            spent_minor: ActiveValue::Set(period.totals.spent.minor()),
            due_minor: ActiveValue::Set(period.totals.total_amount_due.minor()),
            paid_minor: ActiveValue::Set(period.totals.total_amount_paid.minor()),
            unpaid_minor: ActiveValue::Set(period.totals.total_amount_unpaid.minor()),
            withheld_minor: ActiveValue::Set(period.totals.amount_withheld.minor()),
            status: ActiveValue::Set(period.status.as_str().to_string()),
            occurrences: ActiveValue::Set(serde_json::to_value(&period.occurrences)?),
            checklist: ActiveValue::Set(serde_json::to_value(&period.checklist)?),
            is_active: ActiveValue::Set(period.is_active),
            is_modified: ActiveValue::Set(period.is_modified),
            created_at: ActiveValue::Set(period.created_at),
            updated_at: ActiveValue::Set(period.updated_at),
            last_calculated: ActiveValue::Set(period.last_calculated),
        })
    }
}

impl TryFrom<Model> for ResourcePeriod {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            resource_kind: ResourceKind::try_from(model.resource_kind.as_str())?,
            period_type: PeriodType::try_from(model.period_type.as_str())?,
            status: PeriodStatus::try_from(model.status.as_str())?,
            occurrences: serde_json::from_value(model.occurrences)?,
            checklist: serde_json::from_value(model.checklist)?,
            totals: PeriodTotals {
                spent: Money::new(model.spent_minor),
                total_amount_due: Money::new(model.due_minor),
                total_amount_paid: Money::new(model.paid_minor),
                total_amount_unpaid: Money::new(model.unpaid_minor),
                amount_withheld: Money::new(model.withheld_minor),
            },
            allocated_amount: Money::new(model.allocated_minor),
            id: model.id,
            resource_id: model.resource_id,
            owner_id: model.owner_id,
            group_id: model.group_id,
            is_private: model.is_private,
            source_period_id: model.source_period_id,
            period_start: model.period_start,
            period_end: model.period_end,
            is_active: model.is_active,
            is_modified: model.is_modified,
            created_at: model.created_at,
            updated_at: model.updated_at,
            last_calculated: model.last_calculated,
        })
    }
}
