//! Period summaries.
//!
//! One document per scope (a user or a group), period type and source
//! period. It holds a lightweight [`SummaryEntry`] per resource period plus
//! per-kind totals. Summaries are derived data: every one can be rebuilt from
//! resource periods at any time.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{
    EngineError, Money, PeriodType, ResultEngine,
    resource_periods::{PeriodStatus, ResourcePeriod},
    resources::{RecurringResource, ResourceKind},
};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "snake_case")]
pub enum SummaryScope {
    User(String),
    Group(String),
}

impl SummaryScope {
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Group(_) => "group",
        }
    }

    pub fn scope_id(&self) -> &str {
        match self {
            Self::User(id) | Self::Group(id) => id,
        }
    }

    fn parse(kind: &str, id: String) -> ResultEngine<Self> {
        match kind {
            "user" => Ok(Self::User(id)),
            "group" => Ok(Self::Group(id)),
            other => Err(EngineError::InvalidField(format!(
                "invalid summary scope: {other}"
            ))),
        }
    }

    /// Scopes a resource period rolls up into. Private periods stay out of
    /// group summaries.
    pub fn for_period(period: &ResourcePeriod) -> Vec<Self> {
        let mut scopes = vec![Self::User(period.owner_id.clone())];
        if let (Some(group_id), false) = (&period.group_id, period.is_private) {
            scopes.push(Self::Group(group_id.clone()));
        }
        scopes
    }
}

/// `user_{owner}_{type}_{sourcePeriod}` or `group_{group}_{type}_{sourcePeriod}`.
pub fn summary_id(scope: &SummaryScope, period_type: PeriodType, source_period_id: &str) -> String {
    format!(
        "{}_{}_{}_{}",
        scope.kind_str(),
        scope.scope_id(),
        period_type.as_str(),
        source_period_id
    )
}

/// Denormalized snapshot of one resource period.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SummaryEntry {
    pub resource_period_id: String,
    pub resource_id: String,
    pub name: String,
    pub merchant: Option<String>,
    pub allocated: Money,
    pub spent: Money,
    pub paid: Money,
    pub unpaid: Money,
    pub withheld: Money,
    pub remaining: Money,
    pub progress_pct: f64,
    pub status: PeriodStatus,
    pub occurrences_paid: usize,
    pub occurrences_total: usize,
    pub is_essential: bool,
    pub due_date: Option<DateTime<Utc>>,
}

impl SummaryEntry {
    pub fn build(period: &ResourcePeriod, resource: &RecurringResource) -> Self {
        let totals = &period.totals;
        let (progressed, target, remaining) = match period.resource_kind {
            ResourceKind::Budget => (
                totals.spent,
                period.allocated_amount,
                period.allocated_amount - totals.spent,
            ),
            ResourceKind::Outflow => (
                totals.total_amount_paid,
                totals.total_amount_due,
                totals.total_amount_unpaid,
            ),
            ResourceKind::Inflow => (
                totals.total_amount_paid,
                totals.total_amount_due,
                (totals.total_amount_due - totals.total_amount_paid).non_negative(),
            ),
        };
        Self {
            resource_period_id: period.id.clone(),
            resource_id: period.resource_id.clone(),
            name: resource.name.clone(),
            merchant: resource.merchant().map(ToString::to_string),
            allocated: period.allocated_amount,
            spent: totals.spent,
            paid: totals.total_amount_paid,
            unpaid: totals.total_amount_unpaid,
            withheld: totals.amount_withheld,
            remaining,
            progress_pct: progress_pct(progressed, target),
            status: period.status,
            occurrences_paid: period.occurrences.paid_count(),
            occurrences_total: period.occurrences.len(),
            is_essential: resource.is_essential(),
            due_date: (period.resource_kind != ResourceKind::Budget).then(|| period.due_date()),
        }
    }
}

/// Percentage rounded to two decimals; zero when there is no target.
fn progress_pct(value: Money, target: Money) -> f64 {
    if target.minor() <= 0 {
        return 0.0;
    }
    let pct = value.minor() as f64 * 100.0 / target.minor() as f64;
    (pct * 100.0).round() / 100.0
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryTotals {
    pub budgets_allocated: Money,
    pub budgets_spent: Money,
    pub budgets_remaining: Money,
    pub outflows_due: Money,
    pub outflows_paid: Money,
    pub outflows_unpaid: Money,
    pub inflows_expected: Money,
    pub inflows_received: Money,
    pub inflows_withheld: Money,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeriodSummary {
    pub id: String,
    pub scope: SummaryScope,
    pub period_type: PeriodType,
    pub source_period_id: String,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub outflows: Vec<SummaryEntry>,
    pub budgets: Vec<SummaryEntry>,
    pub inflows: Vec<SummaryEntry>,
    pub totals: SummaryTotals,
    pub last_recalculated: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PeriodSummary {
    /// Empty summary whose metadata comes from `period`.
    pub fn empty(
        scope: SummaryScope,
        period_type: PeriodType,
        source_period_id: &str,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: summary_id(&scope, period_type, source_period_id),
            scope,
            period_type,
            source_period_id: source_period_id.to_string(),
            period_start,
            period_end,
            outflows: Vec::new(),
            budgets: Vec::new(),
            inflows: Vec::new(),
            totals: SummaryTotals::default(),
            last_recalculated: now,
            updated_at: now,
        }
    }

    pub fn for_period(scope: SummaryScope, period: &ResourcePeriod, now: DateTime<Utc>) -> Self {
        Self::empty(
            scope,
            period.period_type,
            &period.source_period_id,
            period.period_start,
            period.period_end,
            now,
        )
    }

    fn entries_mut(&mut self, kind: ResourceKind) -> &mut Vec<SummaryEntry> {
        match kind {
            ResourceKind::Budget => &mut self.budgets,
            ResourceKind::Outflow => &mut self.outflows,
            ResourceKind::Inflow => &mut self.inflows,
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &SummaryEntry> {
        self.outflows
            .iter()
            .chain(self.budgets.iter())
            .chain(self.inflows.iter())
    }

    /// Inserts or replaces the entry for `entry.resource_period_id`.
    ///
    /// The id is removed from every array first, so the summary never holds
    /// two entries for one resource period.
    pub fn upsert_entry(&mut self, kind: ResourceKind, entry: SummaryEntry) {
        self.remove_entry(&entry.resource_period_id);
        let entries = self.entries_mut(kind);
        entries.push(entry);
        entries.sort_by(|a, b| a.resource_period_id.cmp(&b.resource_period_id));
        self.recompute_totals();
    }

    /// Returns `true` when an entry was removed.
    pub fn remove_entry(&mut self, resource_period_id: &str) -> bool {
        let mut removed = false;
        for kind in [ResourceKind::Budget, ResourceKind::Outflow, ResourceKind::Inflow] {
            let entries = self.entries_mut(kind);
            let before = entries.len();
            entries.retain(|e| e.resource_period_id != resource_period_id);
            removed |= entries.len() != before;
        }
        if removed {
            self.recompute_totals();
        }
        removed
    }

    /// Re-patches the denormalized display fields of `resource`'s entries.
    pub fn rename_resource(&mut self, resource: &RecurringResource) -> bool {
        let mut changed = false;
        let merchant = resource.merchant().map(ToString::to_string);
        for kind in [ResourceKind::Budget, ResourceKind::Outflow, ResourceKind::Inflow] {
            for entry in self.entries_mut(kind) {
                if entry.resource_id == resource.id
                    && (entry.name != resource.name || entry.merchant != merchant)
                {
                    entry.name = resource.name.clone();
                    entry.merchant = merchant.clone();
                    changed = true;
                }
            }
        }
        changed
    }

    pub fn recompute_totals(&mut self) {
        let mut totals = SummaryTotals::default();
        for entry in &self.budgets {
            totals.budgets_allocated += entry.allocated;
            totals.budgets_spent += entry.spent;
            totals.budgets_remaining += entry.remaining;
        }
        for entry in &self.outflows {
            totals.outflows_due += entry.allocated;
            totals.outflows_paid += entry.paid;
            totals.outflows_unpaid += entry.unpaid;
        }
        for entry in &self.inflows {
            totals.inflows_expected += entry.allocated;
            totals.inflows_received += entry.paid;
            totals.inflows_withheld += entry.withheld;
        }
        self.totals = totals;
    }

    /// Copy without entry arrays, for reads that only want totals.
    #[must_use]
    pub fn without_entries(mut self) -> Self {
        self.outflows.clear();
        self.budgets.clear();
        self.inflows.clear();
        self
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "period_summaries")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub scope: String,
    pub scope_id: String,
    pub period_type: String,
    pub source_period_id: String,
    pub period_start: DateTimeUtc,
    pub period_end: DateTimeUtc,
    pub outflows: Json,
    pub budgets: Json,
    pub inflows: Json,
    pub totals: Json,
    pub last_recalculated: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl TryFrom<&PeriodSummary> for ActiveModel {
    type Error = EngineError;

    fn try_from(summary: &PeriodSummary) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ActiveValue::Set(summary.id.clone()),
            scope: ActiveValue::Set(summary.scope.kind_str().to_string()),
            scope_id: ActiveValue::Set(summary.scope.scope_id().to_string()),
            period_type: ActiveValue::Set(summary.period_type.as_str().to_string()),
            source_period_id: ActiveValue::Set(summary.source_period_id.clone()),
            period_start: ActiveValue::Set(summary.period_start),
            period_end: ActiveValue::Set(summary.period_end),
            outflows: ActiveValue::Set(serde_json::to_value(&summary.outflows)?),
            budgets: ActiveValue::Set(serde_json::to_value(&summary.budgets)?),
            inflows: ActiveValue::Set(serde_json::to_value(&summary.inflows)?),
            totals: ActiveValue::Set(serde_json::to_value(summary.totals)?),
            last_recalculated: ActiveValue::Set(summary.last_recalculated),
            updated_at: ActiveValue::Set(summary.updated_at),
        })
    }
}

impl TryFrom<Model> for PeriodSummary {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            scope: SummaryScope::parse(&model.scope, model.scope_id)?,
            period_type: PeriodType::try_from(model.period_type.as_str())?,
            outflows: serde_json::from_value(model.outflows)?,
            budgets: serde_json::from_value(model.budgets)?,
            inflows: serde_json::from_value(model.inflows)?,
            totals: serde_json::from_value(model.totals)?,
            id: model.id,
            source_period_id: model.source_period_id,
            period_start: model.period_start,
            period_end: model.period_end,
            last_recalculated: model.last_recalculated,
            updated_at: model.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use crate::{
        Currency,
        calendar,
        projection::{self, Window},
        resources::{Frequency, ResourceDetails},
    };

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
    }

    fn rent() -> (RecurringResource, ResourcePeriod) {
        let resource = RecurringResource::new(
            "alice",
            "Rent",
            Money::new(150_000),
            Currency::Usd,
            Frequency::Monthly,
            ResourceDetails::Outflow {
                merchant: Some("Landlord".to_string()),
                due_day: Some(1),
                is_essential: true,
            },
            now(),
        );
        let calendar = calendar::generate(2025, 2025).unwrap();
        let window = Window {
            start: now(),
            end: now(),
        };
        let mut projection = projection::project(&resource, window, &calendar, now(), 3);
        let period = projection
            .periods
            .drain(..)
            .find(|p| p.period_type == PeriodType::Monthly)
            .unwrap();
        (resource, period)
    }

    #[test]
    fn ids_are_derived_from_scope_type_and_period() {
        let scope = SummaryScope::User("alice".to_string());
        assert_eq!(
            summary_id(&scope, PeriodType::Monthly, "2025M03"),
            "user_alice_monthly_2025M03"
        );
        let scope = SummaryScope::Group("family".to_string());
        assert_eq!(
            summary_id(&scope, PeriodType::BiMonthly, "2025BM03A"),
            "group_family_bi_monthly_2025BM03A"
        );
    }

    #[test]
    fn repeated_upserts_keep_one_entry_per_period() {
        let (resource, mut period) = rent();
        let mut summary =
            PeriodSummary::for_period(SummaryScope::User("alice".into()), &period, now());
        summary.upsert_entry(period.resource_kind, SummaryEntry::build(&period, &resource));
        period.totals.total_amount_paid = Money::new(50_000);
        summary.upsert_entry(period.resource_kind, SummaryEntry::build(&period, &resource));
        summary.upsert_entry(period.resource_kind, SummaryEntry::build(&period, &resource));

        assert_eq!(summary.entries().count(), 1);
        assert_eq!(summary.outflows[0].paid, Money::new(50_000));
        assert_eq!(summary.totals.outflows_due, Money::new(150_000));
        assert!((summary.outflows[0].progress_pct - 33.33).abs() < 1e-9);

        assert!(summary.remove_entry(&period.id));
        assert!(!summary.remove_entry(&period.id));
        assert_eq!(summary.totals, SummaryTotals::default());
    }

    #[test]
    fn rename_patches_name_and_merchant() {
        let (mut resource, period) = rent();
        let mut summary =
            PeriodSummary::for_period(SummaryScope::User("alice".into()), &period, now());
        summary.upsert_entry(period.resource_kind, SummaryEntry::build(&period, &resource));

        resource.name = "Apartment".to_string();
        assert!(summary.rename_resource(&resource));
        assert!(!summary.rename_resource(&resource));
        assert_eq!(summary.outflows[0].name, "Apartment");
        assert_eq!(summary.outflows[0].merchant.as_deref(), Some("Landlord"));
    }
}
