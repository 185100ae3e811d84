use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Usd,
    Eur,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Monthly,
    BiMonthly,
    Weekly,
}

pub mod user {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct UserRegistered {
        pub user_id: String,
        /// Id of the user's catch-all budget.
        pub everything_else_id: String,
    }
}

pub mod resource {
    use super::*;

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum ResourceKind {
        Budget,
        Outflow,
        Inflow,
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

    /// Request body for creating a budget, bill or income.
    ///
    /// Kind-specific fields are ignored for the other kinds.
    #[derive(Debug, Serialize, Deserialize)]
    pub struct ResourceNew {
        pub kind: ResourceKind,
        pub name: String,
        /// Base amount per `frequency`, in minor units.
        pub amount_minor: i64,
        pub currency: Option<Currency>,
        pub frequency: Frequency,
        pub group_id: Option<String>,
        pub is_private: Option<bool>,
        /// RFC3339 timestamp, including timezone offset.
        pub start_date: Option<DateTime<FixedOffset>>,
        /// Source period id (e.g. `2025M03`) the resource starts from.
        pub selected_start_period: Option<String>,
        /// Makes the resource limited.
        pub end_date: Option<DateTime<FixedOffset>>,
        pub category_ids: Option<Vec<String>>,
        pub merchant: Option<String>,
        pub due_day: Option<u32>,
        pub is_essential: Option<bool>,
        pub payer: Option<String>,
        pub is_regular_salary: Option<bool>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct ResourceUpdate {
        pub name: Option<String>,
        pub amount_minor: Option<i64>,
        pub category_ids: Option<Vec<String>>,
        pub merchant: Option<String>,
        pub due_day: Option<u32>,
        pub is_essential: Option<bool>,
        pub is_active: Option<bool>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ResourceView {
        pub id: String,
        pub kind: ResourceKind,
        pub owner_id: String,
        pub group_id: Option<String>,
        pub is_private: bool,
        pub name: String,
        pub amount_minor: i64,
        pub currency: Currency,
        pub frequency: Frequency,
        pub is_ongoing: bool,
        pub end_date: Option<DateTime<Utc>>,
        pub is_active: bool,
        pub is_everything_else: bool,
        pub periods_generated_until: Option<DateTime<Utc>>,
        pub start_period: Option<String>,
        pub end_period: Option<String>,
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum DurationOperation {
        Extend,
        Shorten,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct DurationUpdate {
        pub new_end_date: DateTime<FixedOffset>,
        pub operation: DurationOperation,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct DurationChanged {
        pub periods_affected: usize,
        pub new_end_date: DateTime<Utc>,
        pub operation_details: String,
    }
}

pub mod period {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ChecklistItemView {
        pub id: String,
        pub name: String,
        pub expected_amount_minor: i64,
        pub actual_amount_minor: i64,
        pub is_checked: bool,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct PeriodView {
        pub id: String,
        pub resource_id: String,
        pub source_period_id: String,
        pub period_type: PeriodType,
        pub period_start: DateTime<Utc>,
        pub period_end: DateTime<Utc>,
        pub allocated_minor: i64,
        pub spent_minor: i64,
        pub due_minor: i64,
        pub paid_minor: i64,
        pub unpaid_minor: i64,
        pub withheld_minor: i64,
        /// `NOT_DUE`, `DUE_SOON`, `OVERDUE`, `PARTIAL`, `PAID` or `PENDING`.
        pub status: String,
        pub due_dates: Vec<DateTime<Utc>>,
        pub paid_flags: Vec<bool>,
        pub checklist: Vec<ChecklistItemView>,
        pub is_active: bool,
        pub is_modified: bool,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct PeriodList {
        pub periods: Vec<PeriodView>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct AllocationUpdate {
        pub allocated_minor: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ChecklistItemNew {
        pub name: String,
        pub expected_amount_minor: i64,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct ChecklistItemUpdate {
        pub name: Option<String>,
        pub expected_amount_minor: Option<i64>,
        pub actual_amount_minor: Option<i64>,
    }
}

pub mod transaction {
    use super::*;

    /// One slice of a transaction. At most one of `budget_id` and
    /// `inflow_id` is set; a split with no target lands in the
    /// everything-else budget.
    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub struct SplitInput {
        pub amount_minor: i64,
        pub budget_id: Option<String>,
        pub outflow_id: Option<String>,
        pub inflow_id: Option<String>,
        /// Income only.
        pub withheld_minor: Option<i64>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionNew {
        pub amount_minor: i64,
        pub currency: Option<Currency>,
        pub description: Option<String>,
        pub merchant: Option<String>,
        pub group_id: Option<String>,
        /// Omitted or empty: the whole amount is unassigned.
        pub splits: Option<Vec<SplitInput>>,
        /// RFC3339 timestamp, including timezone offset (local user time).
        pub occurred_at: DateTime<FixedOffset>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct TransactionUpdate {
        pub amount_minor: Option<i64>,
        pub description: Option<String>,
        pub merchant: Option<String>,
        /// Replaces every split when present.
        pub splits: Option<Vec<SplitInput>>,
        pub occurred_at: Option<DateTime<FixedOffset>>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SplitView {
        pub id: Uuid,
        pub amount_minor: i64,
        pub budget_id: Option<String>,
        pub outflow_id: Option<String>,
        pub inflow_id: Option<String>,
        pub withheld_minor: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TransactionView {
        pub id: Uuid,
        pub occurred_at: DateTime<Utc>,
        pub amount_minor: i64,
        pub currency: Currency,
        pub description: Option<String>,
        pub merchant: Option<String>,
        pub splits: Vec<SplitView>,
        pub deleted: bool,
    }
}

pub mod summary {
    use super::*;

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct SummaryQuery {
        /// Defaults to `true`.
        pub include_entries: Option<bool>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SummaryEntryView {
        pub resource_period_id: String,
        pub resource_id: String,
        pub name: String,
        pub merchant: Option<String>,
        pub allocated_minor: i64,
        pub spent_minor: i64,
        pub paid_minor: i64,
        pub unpaid_minor: i64,
        pub withheld_minor: i64,
        pub remaining_minor: i64,
        pub progress_pct: f64,
        pub status: String,
        pub occurrences_paid: usize,
        pub occurrences_total: usize,
        pub is_essential: bool,
        pub due_date: Option<DateTime<Utc>>,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct SummaryTotalsView {
        pub budgets_allocated_minor: i64,
        pub budgets_spent_minor: i64,
        pub budgets_remaining_minor: i64,
        pub outflows_due_minor: i64,
        pub outflows_paid_minor: i64,
        pub outflows_unpaid_minor: i64,
        pub inflows_expected_minor: i64,
        pub inflows_received_minor: i64,
        pub inflows_withheld_minor: i64,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct SummaryView {
        pub id: String,
        pub period_type: PeriodType,
        pub source_period_id: String,
        pub period_start: DateTime<Utc>,
        pub period_end: DateTime<Utc>,
        pub outflows: Vec<SummaryEntryView>,
        pub budgets: Vec<SummaryEntryView>,
        pub inflows: Vec<SummaryEntryView>,
        pub totals: SummaryTotalsView,
        pub last_recalculated: DateTime<Utc>,
    }
}

pub mod admin {
    use super::*;

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CalendarGenerate {
        pub year_start: i32,
        pub year_end: i32,
        /// Delete every stored period first.
        pub reset: Option<bool>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct CalendarGenerated {
        pub periods: usize,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct BackfillRequest {
        pub dry_run: Option<bool>,
        pub user_id: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct BackfillView {
        pub keys: usize,
        pub rebuilt: usize,
        pub failed: usize,
        pub dry_run: bool,
    }

    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct ExtendRequest {
        /// Time budget of the run; the default is nine minutes.
        pub max_run_seconds: Option<u64>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct ExtensionView {
        pub examined: usize,
        pub extended: usize,
        pub skipped: usize,
        pub periods_created: usize,
        pub failed: usize,
        pub timed_out: bool,
    }

    /// Exactly one of the two ids is required.
    #[derive(Debug, Default, Serialize, Deserialize)]
    pub struct TotalsRequest {
        pub resource_id: Option<String>,
        pub period_id: Option<String>,
    }

    #[derive(Debug, Serialize, Deserialize)]
    pub struct TotalsView {
        pub periods: usize,
        pub corrected: usize,
    }
}
