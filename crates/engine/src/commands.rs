//! Command structs for engine operations.
//!
//! These types group parameters for write operations on resources,
//! transactions and checklists, keeping call sites readable and avoiding long
//! argument lists.

use chrono::{DateTime, Utc};

use crate::{
    Currency, EngineError, Money, ResultEngine,
    resources::{Frequency, RecordSource, ResourceDetails},
    transactions::Split,
};

/// Create a budget, outflow or inflow.
#[derive(Clone, Debug)]
pub struct NewResourceCmd {
    pub name: String,
    pub amount: Money,
    pub currency: Option<Currency>,
    pub frequency: Frequency,
    pub details: ResourceDetails,
    pub group_id: Option<String>,
    pub is_private: bool,
    pub start_date: Option<DateTime<Utc>>,
    pub selected_start_period: Option<String>,
    pub end_date: Option<DateTime<Utc>>,
    pub source: RecordSource,
}

impl NewResourceCmd {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        amount: Money,
        frequency: Frequency,
        details: ResourceDetails,
    ) -> Self {
        Self {
            name: name.into(),
            amount,
            currency: None,
            frequency,
            details,
            group_id: None,
            is_private: false,
            start_date: None,
            selected_start_period: None,
            end_date: None,
            source: RecordSource::Manual,
        }
    }

    #[must_use]
    pub fn currency(mut self, currency: Currency) -> Self {
        self.currency = Some(currency);
        self
    }

    #[must_use]
    pub fn group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    #[must_use]
    pub fn private(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }

    #[must_use]
    pub fn start_date(mut self, start: DateTime<Utc>) -> Self {
        self.start_date = Some(start);
        self
    }

    #[must_use]
    pub fn selected_start_period(mut self, source_period_id: impl Into<String>) -> Self {
        self.selected_start_period = Some(source_period_id.into());
        self
    }

    /// Makes the resource limited, ending at `end`.
    #[must_use]
    pub fn end_date(mut self, end: DateTime<Utc>) -> Self {
        self.end_date = Some(end);
        self
    }

    #[must_use]
    pub fn source(mut self, source: RecordSource) -> Self {
        self.source = source;
        self
    }
}

/// Partial update of a resource. `None` leaves a field untouched.
#[derive(Clone, Debug, Default)]
pub struct UpdateResourceCmd {
    pub name: Option<String>,
    pub amount: Option<Money>,
    pub category_ids: Option<Vec<String>>,
    pub merchant: Option<String>,
    pub due_day: Option<u32>,
    pub is_essential: Option<bool>,
    pub is_active: Option<bool>,
}

impl UpdateResourceCmd {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    #[must_use]
    pub fn category_ids(mut self, category_ids: Vec<String>) -> Self {
        self.category_ids = Some(category_ids);
        self
    }

    #[must_use]
    pub fn merchant(mut self, merchant: impl Into<String>) -> Self {
        self.merchant = Some(merchant.into());
        self
    }

    #[must_use]
    pub fn due_day(mut self, due_day: u32) -> Self {
        self.due_day = Some(due_day);
        self
    }

    #[must_use]
    pub fn essential(mut self, is_essential: bool) -> Self {
        self.is_essential = Some(is_essential);
        self
    }

    #[must_use]
    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.amount.is_none()
            && self.category_ids.is_none()
            && self.merchant.is_none()
            && self.due_day.is_none()
            && self.is_essential.is_none()
            && self.is_active.is_none()
    }
}

/// Create a transaction.
#[derive(Clone, Debug)]
pub struct NewTransactionCmd {
    pub occurred_at: DateTime<Utc>,
    pub amount: Money,
    pub currency: Option<Currency>,
    pub description: Option<String>,
    pub merchant: Option<String>,
    pub group_id: Option<String>,
    pub splits: Vec<Split>,
    pub source: RecordSource,
}

impl NewTransactionCmd {
    #[must_use]
    pub fn new(occurred_at: DateTime<Utc>, amount: Money) -> Self {
        Self {
            occurred_at,
            amount,
            currency: None,
            description: None,
            merchant: None,
            group_id: None,
            splits: Vec::new(),
            source: RecordSource::Manual,
        }
    }

    #[must_use]
    pub fn currency(mut self, currency: Currency) -> Self {
        self.currency = Some(currency);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn merchant(mut self, merchant: impl Into<String>) -> Self {
        self.merchant = Some(merchant.into());
        self
    }

    #[must_use]
    pub fn group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    #[must_use]
    pub fn split(mut self, split: Split) -> Self {
        self.splits.push(split);
        self
    }

    #[must_use]
    pub fn source(mut self, source: RecordSource) -> Self {
        self.source = source;
        self
    }
}

/// Partial update of a transaction. `splits`, when set, replaces them all.
#[derive(Clone, Debug, Default)]
pub struct UpdateTransactionCmd {
    pub occurred_at: Option<DateTime<Utc>>,
    pub amount: Option<Money>,
    pub description: Option<String>,
    pub merchant: Option<String>,
    pub splits: Option<Vec<Split>>,
}

impl UpdateTransactionCmd {
    #[must_use]
    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    #[must_use]
    pub fn amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    #[must_use]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    #[must_use]
    pub fn merchant(mut self, merchant: impl Into<String>) -> Self {
        self.merchant = Some(merchant.into());
        self
    }

    #[must_use]
    pub fn splits(mut self, splits: Vec<Split>) -> Self {
        self.splits = Some(splits);
        self
    }
}

/// Partial update of a checklist item.
#[derive(Clone, Debug, Default)]
pub struct ChecklistPatch {
    pub name: Option<String>,
    pub expected_amount: Option<Money>,
    pub actual_amount: Option<Money>,
}

impl ChecklistPatch {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn expected_amount(mut self, amount: Money) -> Self {
        self.expected_amount = Some(amount);
        self
    }

    #[must_use]
    pub fn actual_amount(mut self, amount: Money) -> Self {
        self.actual_amount = Some(amount);
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DurationOperation {
    Extend,
    Shorten,
}

impl DurationOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Extend => "extend",
            Self::Shorten => "shorten",
        }
    }
}

impl TryFrom<&str> for DurationOperation {
    type Error = EngineError;

    fn try_from(value: &str) -> ResultEngine<Self> {
        match value {
            "extend" => Ok(Self::Extend),
            "shorten" => Ok(Self::Shorten),
            other => Err(EngineError::InvalidField(format!(
                "invalid duration operation: {other}"
            ))),
        }
    }
}
