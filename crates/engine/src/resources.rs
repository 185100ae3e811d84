//! Recurring resources: budgets, outflows (bills) and inflows (income).
//!
//! All three kinds share one table. Kind-specific fields live in
//! [`ResourceDetails`], persisted as JSON next to a `details_version`.
//! Older document layouts are upgraded by [`ResourceDetails::migrate`], the
//! only place where legacy field names are looked at.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::{Currency, EngineError, Money, ResultEngine};

/// Display name of the per-user catch-all budget.
pub const EVERYTHING_ELSE_NAME: &str = "Everything Else";

/// Current layout of the `details` column.
pub const DETAILS_VERSION: i32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Budget,
    Outflow,
    Inflow,
}

impl ResourceKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Budget => "budget",
            Self::Outflow => "outflow",
            Self::Inflow => "inflow",
        }
    }
}

impl TryFrom<&str> for ResourceKind {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "budget" => Ok(Self::Budget),
            "outflow" => Ok(Self::Outflow),
            "inflow" => Ok(Self::Inflow),
            other => Err(EngineError::InvalidField(format!(
                "invalid resource kind: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    Weekly,
    BiWeekly,
    Monthly,
    Quarterly,
    Yearly,
}

impl Frequency {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Weekly => "weekly",
            Self::BiWeekly => "bi_weekly",
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
        }
    }
}

impl TryFrom<&str> for Frequency {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "weekly" => Ok(Self::Weekly),
            "bi_weekly" | "biweekly" => Ok(Self::BiWeekly),
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "yearly" | "annually" => Ok(Self::Yearly),
            other => Err(EngineError::InvalidField(format!(
                "invalid frequency: {other}"
            ))),
        }
    }
}

/// `Recurring` resources are open ended, `Limited` ones stop at an end date.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BudgetType {
    Recurring,
    Limited,
}

/// Provenance tag, informational only.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordSource {
    Plaid,
    #[default]
    Manual,
}

impl RecordSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Plaid => "plaid",
            Self::Manual => "manual",
        }
    }
}

impl TryFrom<&str> for RecordSource {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "plaid" => Ok(Self::Plaid),
            "manual" => Ok(Self::Manual),
            other => Err(EngineError::InvalidField(format!("invalid source: {other}"))),
        }
    }
}

/// Kind-specific payload of a recurring resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceDetails {
    Budget {
        #[serde(default)]
        category_ids: Vec<String>,
        #[serde(default)]
        is_system_everything_else: bool,
    },
    Outflow {
        #[serde(default)]
        merchant: Option<String>,
        #[serde(default)]
        due_day: Option<u32>,
        #[serde(default)]
        is_essential: bool,
    },
    Inflow {
        #[serde(default)]
        payer: Option<String>,
        #[serde(default)]
        is_regular_salary: bool,
    },
}

/// Version 1 documents: a flat object whose meaning depends on the row kind.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyDetails {
    #[serde(default)]
    category_ids: Vec<String>,
    #[serde(default)]
    is_system_everything_else: bool,
    #[serde(default, alias = "merchant")]
    merchant_name: Option<String>,
    #[serde(default)]
    due_day: Option<u32>,
    #[serde(default)]
    is_essential: bool,
    #[serde(default, alias = "payer")]
    payer_name: Option<String>,
    #[serde(default)]
    is_regular_salary: bool,
}

impl ResourceDetails {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Budget { .. } => ResourceKind::Budget,
            Self::Outflow { .. } => ResourceKind::Outflow,
            Self::Inflow { .. } => ResourceKind::Inflow,
        }
    }

    /// Upgrades a stored payload to the current layout.
    pub fn migrate(version: i32, raw: Value, kind: ResourceKind) -> ResultEngine<Self> {
        let details = match version {
            1 => {
                let legacy: LegacyDetails = serde_json::from_value(raw)?;
                match kind {
                    ResourceKind::Budget => Self::Budget {
                        category_ids: legacy.category_ids,
                        is_system_everything_else: legacy.is_system_everything_else,
                    },
                    ResourceKind::Outflow => Self::Outflow {
                        merchant: legacy.merchant_name,
                        due_day: legacy.due_day,
                        is_essential: legacy.is_essential,
                    },
                    ResourceKind::Inflow => Self::Inflow {
                        payer: legacy.payer_name,
                        is_regular_salary: legacy.is_regular_salary,
                    },
                }
            }
            DETAILS_VERSION => serde_json::from_value(raw)?,
            other => {
                return Err(EngineError::InvalidField(format!(
                    "unknown details version {other}"
                )));
            }
        };
        if details.kind() != kind {
            return Err(EngineError::InvalidField(format!(
                "details kind {} does not match resource kind {}",
                details.kind().as_str(),
                kind.as_str()
            )));
        }
        Ok(details)
    }
}

/// First and last source period id materialized for a resource.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodRange {
    pub start_period: Option<String>,
    pub end_period: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RecurringResource {
    pub id: String,
    pub owner_id: String,
    pub group_id: Option<String>,
    pub is_private: bool,
    pub name: String,
    /// Monthly-equivalent base amount.
    pub amount: Money,
    pub currency: Currency,
    pub frequency: Frequency,
    pub start_date: Option<DateTime<Utc>>,
    pub selected_start_period: Option<String>,
    pub is_ongoing: bool,
    pub budget_end_date: Option<DateTime<Utc>>,
    /// Legacy end date, superseded by `budget_end_date`.
    pub end_date: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub details: ResourceDetails,
    pub periods_generated_until: Option<DateTime<Utc>>,
    pub active_period_range: PeriodRange,
    pub can_extend_periods: bool,
    pub needs_scheduled_extension: bool,
    pub last_extended: Option<DateTime<Utc>>,
    pub source: RecordSource,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecurringResource {
    pub fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        amount: Money,
        currency: Currency,
        frequency: Frequency,
        details: ResourceDetails,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            group_id: None,
            is_private: false,
            name: name.into(),
            amount,
            currency,
            frequency,
            start_date: None,
            selected_start_period: None,
            is_ongoing: true,
            budget_end_date: None,
            end_date: None,
            is_active: true,
            details,
            periods_generated_until: None,
            active_period_range: PeriodRange::default(),
            can_extend_periods: true,
            needs_scheduled_extension: true,
            last_extended: None,
            source: RecordSource::Manual,
            created_at: now,
            updated_at: now,
        }
    }

    /// The per-user catch-all budget.
    pub fn everything_else(owner_id: &str, currency: Currency, now: DateTime<Utc>) -> Self {
        let mut budget = Self::new(
            owner_id,
            EVERYTHING_ELSE_NAME,
            Money::ZERO,
            currency,
            Frequency::Monthly,
            ResourceDetails::Budget {
                category_ids: Vec::new(),
                is_system_everything_else: true,
            },
            now,
        );
        budget.is_private = true;
        budget
    }

    pub fn kind(&self) -> ResourceKind {
        self.details.kind()
    }

    pub fn budget_type(&self) -> BudgetType {
        if self.is_ongoing {
            BudgetType::Recurring
        } else {
            BudgetType::Limited
        }
    }

    /// End date of a limited resource, preferring `budget_end_date`.
    pub fn resolved_end_date(&self) -> Option<DateTime<Utc>> {
        self.budget_end_date.or(self.end_date)
    }

    pub fn is_everything_else(&self) -> bool {
        matches!(
            self.details,
            ResourceDetails::Budget {
                is_system_everything_else: true,
                ..
            }
        )
    }

    pub fn category_ids(&self) -> &[String] {
        match &self.details {
            ResourceDetails::Budget { category_ids, .. } => category_ids,
            _ => &[],
        }
    }

    pub fn merchant(&self) -> Option<&str> {
        match &self.details {
            ResourceDetails::Outflow { merchant, .. } => merchant.as_deref(),
            ResourceDetails::Inflow { payer, .. } => payer.as_deref(),
            ResourceDetails::Budget { .. } => None,
        }
    }

    pub fn due_day(&self) -> Option<u32> {
        match &self.details {
            ResourceDetails::Outflow { due_day, .. } => *due_day,
            _ => None,
        }
    }

    pub fn is_essential(&self) -> bool {
        matches!(
            self.details,
            ResourceDetails::Outflow {
                is_essential: true,
                ..
            }
        )
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "recurring_resources")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub kind: String,
    pub owner_id: String,
    pub group_id: Option<String>,
    pub is_private: bool,
    pub name: String,
    pub amount_minor: i64,
    pub currency: String,
    pub frequency: String,
    pub start_date: Option<DateTimeUtc>,
    pub selected_start_period: Option<String>,
    pub is_ongoing: bool,
    pub budget_end_date: Option<DateTimeUtc>,
    pub end_date: Option<DateTimeUtc>,
    pub is_active: bool,
    pub is_system_everything_else: bool,
    pub details: Json,
    pub details_version: i32,
    pub periods_generated_until: Option<DateTimeUtc>,
    pub active_start_period: Option<String>,
    pub active_end_period: Option<String>,
    pub can_extend_periods: bool,
    pub needs_scheduled_extension: bool,
    pub last_extended: Option<DateTimeUtc>,
    pub source: String,
    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::resource_periods::Entity")]
    ResourcePeriods,
}

impl Related<super::resource_periods::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ResourcePeriods.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&RecurringResource> for ActiveModel {
    type Error = EngineError;

    fn try_from(resource: &RecurringResource) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ActiveValue::Set(resource.id.clone()),
            kind: ActiveValue::Set(resource.kind().as_str().to_string()),
            owner_id: ActiveValue::Set(resource.owner_id.clone()),
            group_id: ActiveValue::Set(resource.group_id.clone()),
            is_private: ActiveValue::Set(resource.is_private),
            name: ActiveValue::Set(resource.name.clone()),
            amount_minor: ActiveValue::Set(resource.amount.minor()),
            currency: ActiveValue::Set(resource.currency.code().to_string()),
            frequency: ActiveValue::Set(resource.frequency.as_str().to_string()),
            start_date: ActiveValue::Set(resource.start_date),
            selected_start_period: ActiveValue::Set(resource.selected_start_period.clone()),
            is_ongoing: ActiveValue::Set(resource.is_ongoing),
            budget_end_date: ActiveValue::Set(resource.budget_end_date),
            end_date: ActiveValue::Set(resource.end_date),
            is_active: ActiveValue::Set(resource.is_active),
            is_system_everything_else: ActiveValue::Set(resource.is_everything_else()),
            details: ActiveValue::Set(serde_json::to_value(&resource.details)?),
            details_version: ActiveValue::Set(DETAILS_VERSION),
            periods_generated_until: ActiveValue::Set(resource.periods_generated_until),
            active_start_period: ActiveValue::Set(
                resource.active_period_range.start_period.clone(),
            ),
            active_end_period: ActiveValue::Set(resource.active_period_range.end_period.clone()),
            can_extend_periods: ActiveValue::Set(resource.can_extend_periods),
            needs_scheduled_extension: ActiveValue::Set(resource.needs_scheduled_extension),
            last_extended: ActiveValue::Set(resource.last_extended),
            source: ActiveValue::Set(resource.source.as_str().to_string()),
            created_at: ActiveValue::Set(resource.created_at),
            updated_at: ActiveValue::Set(resource.updated_at),
        })
    }
}

impl TryFrom<Model> for RecurringResource {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let kind = ResourceKind::try_from(model.kind.as_str())?;
        Ok(Self {
            details: ResourceDetails::migrate(model.details_version, model.details, kind)?,
            currency: Currency::try_from(model.currency.as_str())?,
            frequency: Frequency::try_from(model.frequency.as_str())?,
            source: RecordSource::try_from(model.source.as_str())?,
            id: model.id,
            owner_id: model.owner_id,
            group_id: model.group_id,
            is_private: model.is_private,
            name: model.name,
            amount: Money::new(model.amount_minor),
            start_date: model.start_date,
            selected_start_period: model.selected_start_period,
            is_ongoing: model.is_ongoing,
            budget_end_date: model.budget_end_date,
            end_date: model.end_date,
            is_active: model.is_active,
            periods_generated_until: model.periods_generated_until,
            active_period_range: PeriodRange {
                start_period: model.active_start_period,
                end_period: model.active_end_period,
            },
            can_extend_periods: model.can_extend_periods,
            needs_scheduled_extension: model.needs_scheduled_extension,
            last_extended: model.last_extended,
            created_at: model.created_at,
            updated_at: model.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn migrates_flat_v1_outflow() {
        let raw = json!({ "merchantName": "Netflix", "dueDay": 12, "isEssential": false });
        let details = ResourceDetails::migrate(1, raw, ResourceKind::Outflow).unwrap();
        assert_eq!(
            details,
            ResourceDetails::Outflow {
                merchant: Some("Netflix".to_string()),
                due_day: Some(12),
                is_essential: false,
            }
        );
    }

    #[test]
    fn migrates_flat_v1_everything_else() {
        let raw = json!({ "categoryIds": [], "isSystemEverythingElse": true });
        let details = ResourceDetails::migrate(1, raw, ResourceKind::Budget).unwrap();
        assert!(matches!(
            details,
            ResourceDetails::Budget {
                is_system_everything_else: true,
                ..
            }
        ));
    }

    #[test]
    fn current_layout_round_trips_through_json() {
        let details = ResourceDetails::Inflow {
            payer: Some("ACME".to_string()),
            is_regular_salary: true,
        };
        let raw = serde_json::to_value(&details).unwrap();
        assert_eq!(raw["kind"], "inflow");
        let back = ResourceDetails::migrate(DETAILS_VERSION, raw, ResourceKind::Inflow).unwrap();
        assert_eq!(back, details);
    }

    #[test]
    fn rejects_kind_mismatch_and_unknown_versions() {
        let raw = json!({ "kind": "budget" });
        assert!(ResourceDetails::migrate(DETAILS_VERSION, raw.clone(), ResourceKind::Inflow).is_err());
        assert!(ResourceDetails::migrate(7, raw, ResourceKind::Budget).is_err());
    }

    #[test]
    fn budget_end_date_wins_over_legacy_end_date() {
        let now = Utc::now();
        let mut budget = RecurringResource::everything_else("alice", Currency::Usd, now);
        budget.end_date = Some(now);
        assert_eq!(budget.resolved_end_date(), Some(now));
        let later = now + chrono::TimeDelta::days(30);
        budget.budget_end_date = Some(later);
        assert_eq!(budget.resolved_end_date(), Some(later));
        assert_eq!(budget.budget_type(), BudgetType::Recurring);
    }
}
