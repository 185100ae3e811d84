//! Period projection and incremental aggregation engine.
//!
//! Recurring budgets, bills (outflows) and income (inflows) are projected
//! onto a canonical calendar of weekly, bi-monthly and monthly source
//! periods. Each projection is a [`ResourcePeriod`] carrying an allocated
//! amount and running totals, kept up to date as transactions come and go,
//! and folded into per-user and per-group [`PeriodSummary`] documents.
//!
//! Pure building blocks live in [`calendar`], [`allocation`], [`projection`],
//! [`occurrences`] and [`reconcile`]. [`Engine`] persists them and runs the
//! derived updates.

pub use commands::{
    ChecklistPatch, DurationOperation, NewResourceCmd, NewTransactionCmd, UpdateResourceCmd,
    UpdateTransactionCmd,
};
pub use currency::Currency;
pub use error::EngineError;
pub use events::Change;
pub use money::Money;
pub use ops::{
    BackfillReport, DurationChange, Engine, EngineBuilder, EngineSettings, ExtensionReport,
    ProjectionOutcome, TotalsReport, TotalsTarget,
};
pub use period_type::PeriodType;
pub use principal::{Principal, Role};
pub use resource_periods::{ChecklistItem, PeriodStatus, PeriodTotals, ResourcePeriod};
pub use resources::{
    BudgetType, Frequency, RecordSource, RecurringResource, ResourceDetails, ResourceKind,
};
pub use source_periods::SourcePeriod;
pub use summaries::{PeriodSummary, SummaryEntry, SummaryScope, SummaryTotals};
pub use transactions::{Split, Transaction};

pub mod allocation;
pub mod calendar;
mod commands;
pub mod contributions;
mod currency;
mod error;
mod events;
mod money;
pub mod occurrences;
mod ops;
mod period_type;
mod principal;
pub mod projection;
pub mod reconcile;
pub mod resource_periods;
pub mod resources;
pub mod source_periods;
mod splits;
pub mod summaries;
pub mod transactions;
mod users;
mod util;

pub type ResultEngine<T> = Result<T, EngineError>;
