//! Conversions between engine types and wire DTOs.

use api_types::{
    period::{ChecklistItemView, PeriodView},
    resource::{Frequency as ApiFrequency, ResourceKind as ApiKind, ResourceView},
    summary::{SummaryEntryView, SummaryTotalsView, SummaryView},
    transaction::{SplitInput, SplitView, TransactionView},
};
use chrono::{DateTime, FixedOffset, Utc};

use crate::ServerError;

pub fn currency_to_api(currency: engine::Currency) -> api_types::Currency {
    match currency {
        engine::Currency::Usd => api_types::Currency::Usd,
        engine::Currency::Eur => api_types::Currency::Eur,
    }
}

pub fn currency_from_api(currency: api_types::Currency) -> engine::Currency {
    match currency {
        api_types::Currency::Usd => engine::Currency::Usd,
        api_types::Currency::Eur => engine::Currency::Eur,
    }
}

pub fn period_type_to_api(period_type: engine::PeriodType) -> api_types::PeriodType {
    match period_type {
        engine::PeriodType::Monthly => api_types::PeriodType::Monthly,
        engine::PeriodType::BiMonthly => api_types::PeriodType::BiMonthly,
        engine::PeriodType::Weekly => api_types::PeriodType::Weekly,
    }
}

pub fn kind_to_api(kind: engine::ResourceKind) -> ApiKind {
    match kind {
        engine::ResourceKind::Budget => ApiKind::Budget,
        engine::ResourceKind::Outflow => ApiKind::Outflow,
        engine::ResourceKind::Inflow => ApiKind::Inflow,
    }
}

pub fn frequency_to_api(frequency: engine::Frequency) -> ApiFrequency {
    match frequency {
        engine::Frequency::Weekly => ApiFrequency::Weekly,
        engine::Frequency::BiWeekly => ApiFrequency::BiWeekly,
        engine::Frequency::Monthly => ApiFrequency::Monthly,
        engine::Frequency::Quarterly => ApiFrequency::Quarterly,
        engine::Frequency::Yearly => ApiFrequency::Yearly,
    }
}

pub fn frequency_from_api(frequency: ApiFrequency) -> engine::Frequency {
    match frequency {
        ApiFrequency::Weekly => engine::Frequency::Weekly,
        ApiFrequency::BiWeekly => engine::Frequency::BiWeekly,
        ApiFrequency::Monthly => engine::Frequency::Monthly,
        ApiFrequency::Quarterly => engine::Frequency::Quarterly,
        ApiFrequency::Yearly => engine::Frequency::Yearly,
    }
}

pub fn to_utc(at: DateTime<FixedOffset>) -> DateTime<Utc> {
    at.with_timezone(&Utc)
}

pub fn resource_view(resource: engine::RecurringResource) -> ResourceView {
    ResourceView {
        kind: kind_to_api(resource.kind()),
        is_everything_else: resource.is_everything_else(),
        end_date: resource.resolved_end_date(),
        id: resource.id,
        owner_id: resource.owner_id,
        group_id: resource.group_id,
        is_private: resource.is_private,
        name: resource.name,
        amount_minor: resource.amount.minor(),
        currency: currency_to_api(resource.currency),
        frequency: frequency_to_api(resource.frequency),
        is_ongoing: resource.is_ongoing,
        is_active: resource.is_active,
        periods_generated_until: resource.periods_generated_until,
        start_period: resource.active_period_range.start_period,
        end_period: resource.active_period_range.end_period,
    }
}

pub fn checklist_item_view(item: engine::ChecklistItem) -> ChecklistItemView {
    ChecklistItemView {
        id: item.id,
        name: item.name,
        expected_amount_minor: item.expected_amount.minor(),
        actual_amount_minor: item.actual_amount.minor(),
        is_checked: item.is_checked,
    }
}

pub fn period_view(period: engine::ResourcePeriod) -> PeriodView {
    let totals = period.totals;
    PeriodView {
        id: period.id,
        resource_id: period.resource_id,
        source_period_id: period.source_period_id,
        period_type: period_type_to_api(period.period_type),
        period_start: period.period_start,
        period_end: period.period_end,
        allocated_minor: period.allocated_amount.minor(),
        spent_minor: totals.spent.minor(),
        due_minor: totals.total_amount_due.minor(),
        paid_minor: totals.total_amount_paid.minor(),
        unpaid_minor: totals.total_amount_unpaid.minor(),
        withheld_minor: totals.amount_withheld.minor(),
        status: period.status.as_str().to_string(),
        due_dates: period.occurrences.due_dates,
        paid_flags: period.occurrences.paid_flags,
        checklist: period.checklist.into_iter().map(checklist_item_view).collect(),
        is_active: period.is_active,
        is_modified: period.is_modified,
    }
}

/// Builds an engine split, rejecting negative withholding up front.
pub fn split_from_api(input: SplitInput) -> Result<engine::Split, ServerError> {
    let mut split = engine::Split::new(engine::Money::new(input.amount_minor));
    if let Some(budget_id) = input.budget_id {
        split = split.budget(budget_id);
    }
    if let Some(outflow_id) = input.outflow_id {
        split = split.outflow(outflow_id);
    }
    if let Some(inflow_id) = input.inflow_id {
        split = split.inflow(inflow_id);
    }
    if let Some(withheld) = input.withheld_minor {
        if withheld < 0 {
            return Err(ServerError::Generic(
                "withheld_minor must not be negative".to_string(),
            ));
        }
        split = split.withheld(engine::Money::new(withheld));
    }
    Ok(split)
}

pub fn transaction_view(tx: engine::Transaction) -> TransactionView {
    let deleted = tx.is_deleted();
    TransactionView {
        id: tx.id,
        occurred_at: tx.occurred_at,
        amount_minor: tx.amount.minor(),
        currency: currency_to_api(tx.currency),
        description: tx.description,
        merchant: tx.merchant,
        splits: tx
            .splits
            .into_iter()
            .map(|split| SplitView {
                id: split.id,
                amount_minor: split.amount.minor(),
                budget_id: split.budget_id,
                outflow_id: split.outflow_id,
                inflow_id: split.inflow_id,
                withheld_minor: split.withheld.minor(),
            })
            .collect(),
        deleted,
    }
}

fn entry_view(entry: engine::SummaryEntry) -> SummaryEntryView {
    SummaryEntryView {
        resource_period_id: entry.resource_period_id,
        resource_id: entry.resource_id,
        name: entry.name,
        merchant: entry.merchant,
        allocated_minor: entry.allocated.minor(),
        spent_minor: entry.spent.minor(),
        paid_minor: entry.paid.minor(),
        unpaid_minor: entry.unpaid.minor(),
        withheld_minor: entry.withheld.minor(),
        remaining_minor: entry.remaining.minor(),
        progress_pct: entry.progress_pct,
        status: entry.status.as_str().to_string(),
        occurrences_paid: entry.occurrences_paid,
        occurrences_total: entry.occurrences_total,
        is_essential: entry.is_essential,
        due_date: entry.due_date,
    }
}

pub fn summary_view(summary: engine::PeriodSummary) -> SummaryView {
    let totals = summary.totals;
    SummaryView {
        id: summary.id,
        period_type: period_type_to_api(summary.period_type),
        source_period_id: summary.source_period_id,
        period_start: summary.period_start,
        period_end: summary.period_end,
        outflows: summary.outflows.into_iter().map(entry_view).collect(),
        budgets: summary.budgets.into_iter().map(entry_view).collect(),
        inflows: summary.inflows.into_iter().map(entry_view).collect(),
        totals: SummaryTotalsView {
            budgets_allocated_minor: totals.budgets_allocated.minor(),
            budgets_spent_minor: totals.budgets_spent.minor(),
            budgets_remaining_minor: totals.budgets_remaining.minor(),
            outflows_due_minor: totals.outflows_due.minor(),
            outflows_paid_minor: totals.outflows_paid.minor(),
            outflows_unpaid_minor: totals.outflows_unpaid.minor(),
            inflows_expected_minor: totals.inflows_expected.minor(),
            inflows_received_minor: totals.inflows_received.minor(),
            inflows_withheld_minor: totals.inflows_withheld.minor(),
        },
        last_recalculated: summary.last_recalculated,
    }
}
