//! Initial schema.
//!
//! - `users`: registered principals and their default currency
//! - `source_periods`: the shared calendar of monthly, bi-monthly and weekly periods
//! - `recurring_resources`: budgets, outflows (bills) and inflows (income)
//! - `resource_periods`: one instance of a resource per calendar period
//! - `transactions`: spending and payments, soft-deleted
//! - `splits`: allocation of a transaction to resources
//! - `period_summaries`: per-user and per-group period rollups

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// ─────────────────────────────────────────────────────────────────────────────
// Table identifiers
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Iden)]
enum Users {
    Table,
    Id,
    Currency,
    CreatedAt,
}

#[derive(Iden)]
enum SourcePeriods {
    Table,
    Id,
    PeriodType,
    Year,
    PeriodIndex,
    StartDate,
    EndDate,
    IsoWeek,
    CalendarVersion,
}

#[derive(Iden)]
enum RecurringResources {
    Table,
    Id,
    Kind,
    OwnerId,
    GroupId,
    IsPrivate,
    Name,
    AmountMinor,
    Currency,
    Frequency,
    StartDate,
    SelectedStartPeriod,
    IsOngoing,
    BudgetEndDate,
    EndDate,
    IsActive,
    IsSystemEverythingElse,
    Details,
    DetailsVersion,
    PeriodsGeneratedUntil,
    ActiveStartPeriod,
    ActiveEndPeriod,
    CanExtendPeriods,
    NeedsScheduledExtension,
    LastExtended,
    Source,
    CreatedAt,
    UpdatedAt,
}

#[derive(Iden)]
enum ResourcePeriods {
    Table,
    Id,
    ResourceId,
    ResourceKind,
    OwnerId,
    GroupId,
    IsPrivate,
    SourcePeriodId,
    PeriodType,
    PeriodStart,
    PeriodEnd,
    AllocatedMinor,
    SpentMinor,
    DueMinor,
    PaidMinor,
    UnpaidMinor,
    WithheldMinor,
    Status,
    Occurrences,
    Checklist,
    IsActive,
    IsModified,
    CreatedAt,
    UpdatedAt,
    LastCalculated,
}

#[derive(Iden)]
enum Transactions {
    Table,
    Id,
    OwnerId,
    GroupId,
    OccurredAt,
    AmountMinor,
    Currency,
    Description,
    Merchant,
    Source,
    CreatedAt,
    UpdatedAt,
    DeletedAt,
}

#[derive(Iden)]
enum Splits {
    Table,
    Id,
    TransactionId,
    Position,
    OwnerId,
    OccurredAt,
    AmountMinor,
    BudgetId,
    OutflowId,
    InflowId,
    WithheldMinor,
}

#[derive(Iden)]
enum PeriodSummaries {
    Table,
    Id,
    Scope,
    ScopeId,
    PeriodType,
    SourcePeriodId,
    PeriodStart,
    PeriodEnd,
    Outflows,
    Budgets,
    Inflows,
    Totals,
    LastRecalculated,
    UpdatedAt,
}

// ─────────────────────────────────────────────────────────────────────────────
// Migration implementation
// ─────────────────────────────────────────────────────────────────────────────

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // ───────────────────────────────────────────────────────────────────
        // 1. Users
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Users::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Users::Id).string().not_null().primary_key())
                    .col(
                        ColumnDef::new(Users::Currency)
                            .string()
                            .not_null()
                            .default("USD"),
                    )
                    .col(
                        ColumnDef::new(Users::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 2. Source periods
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(SourcePeriods::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SourcePeriods::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(SourcePeriods::PeriodType).string().not_null())
                    .col(ColumnDef::new(SourcePeriods::Year).integer().not_null())
                    .col(ColumnDef::new(SourcePeriods::PeriodIndex).integer().not_null())
                    .col(
                        ColumnDef::new(SourcePeriods::StartDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(SourcePeriods::EndDate)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(SourcePeriods::IsoWeek).integer())
                    .col(
                        ColumnDef::new(SourcePeriods::CalendarVersion)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-source_periods-type-start")
                    .table(SourcePeriods::Table)
                    .col(SourcePeriods::PeriodType)
                    .col(SourcePeriods::StartDate)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 3. Recurring resources
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(RecurringResources::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(RecurringResources::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(RecurringResources::Kind).string().not_null())
                    .col(ColumnDef::new(RecurringResources::OwnerId).string().not_null())
                    .col(ColumnDef::new(RecurringResources::GroupId).string())
                    .col(
                        ColumnDef::new(RecurringResources::IsPrivate)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(RecurringResources::Name).string().not_null())
                    .col(
                        ColumnDef::new(RecurringResources::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(RecurringResources::Currency).string().not_null())
                    .col(ColumnDef::new(RecurringResources::Frequency).string().not_null())
                    .col(ColumnDef::new(RecurringResources::StartDate).timestamp_with_time_zone())
                    .col(ColumnDef::new(RecurringResources::SelectedStartPeriod).string())
                    .col(
                        ColumnDef::new(RecurringResources::IsOngoing)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(RecurringResources::BudgetEndDate)
                            .timestamp_with_time_zone(),
                    )
                    .col(ColumnDef::new(RecurringResources::EndDate).timestamp_with_time_zone())
                    .col(
                        ColumnDef::new(RecurringResources::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(RecurringResources::IsSystemEverythingElse)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(ColumnDef::new(RecurringResources::Details).json().not_null())
                    .col(
                        ColumnDef::new(RecurringResources::DetailsVersion)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(RecurringResources::PeriodsGeneratedUntil)
                            .timestamp_with_time_zone(),
                    )
                    .col(ColumnDef::new(RecurringResources::ActiveStartPeriod).string())
                    .col(ColumnDef::new(RecurringResources::ActiveEndPeriod).string())
                    .col(
                        ColumnDef::new(RecurringResources::CanExtendPeriods)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(RecurringResources::NeedsScheduledExtension)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(RecurringResources::LastExtended)
                            .timestamp_with_time_zone(),
                    )
                    .col(ColumnDef::new(RecurringResources::Source).string().not_null())
                    .col(
                        ColumnDef::new(RecurringResources::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(RecurringResources::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-recurring_resources-owner_id-kind")
                    .table(RecurringResources::Table)
                    .col(RecurringResources::OwnerId)
                    .col(RecurringResources::Kind)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 4. Resource periods
        // ───────────────────────────────────────────────────────────────────
        // No foreign key to recurring_resources: a resource delete removes its
        // summary entries before the periods go.
        manager
            .create_table(
                Table::create()
                    .table(ResourcePeriods::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ResourcePeriods::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ResourcePeriods::ResourceId).string().not_null())
                    .col(ColumnDef::new(ResourcePeriods::ResourceKind).string().not_null())
                    .col(ColumnDef::new(ResourcePeriods::OwnerId).string().not_null())
                    .col(ColumnDef::new(ResourcePeriods::GroupId).string())
                    .col(
                        ColumnDef::new(ResourcePeriods::IsPrivate)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ResourcePeriods::SourcePeriodId)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(ResourcePeriods::PeriodType).string().not_null())
                    .col(
                        ColumnDef::new(ResourcePeriods::PeriodStart)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ResourcePeriods::PeriodEnd)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ResourcePeriods::AllocatedMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ResourcePeriods::SpentMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ResourcePeriods::DueMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ResourcePeriods::PaidMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ResourcePeriods::UnpaidMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(ResourcePeriods::WithheldMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(ResourcePeriods::Status).string().not_null())
                    .col(ColumnDef::new(ResourcePeriods::Occurrences).json().not_null())
                    .col(ColumnDef::new(ResourcePeriods::Checklist).json().not_null())
                    .col(
                        ColumnDef::new(ResourcePeriods::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ResourcePeriods::IsModified)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ResourcePeriods::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ResourcePeriods::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ResourcePeriods::LastCalculated)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-resource_periods-resource_id-start")
                    .table(ResourcePeriods::Table)
                    .col(ResourcePeriods::ResourceId)
                    .col(ResourcePeriods::PeriodStart)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-resource_periods-owner-source_period")
                    .table(ResourcePeriods::Table)
                    .col(ResourcePeriods::OwnerId)
                    .col(ResourcePeriods::PeriodType)
                    .col(ResourcePeriods::SourcePeriodId)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 5. Transactions
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Transactions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Transactions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Transactions::OwnerId).string().not_null())
                    .col(ColumnDef::new(Transactions::GroupId).string())
                    .col(
                        ColumnDef::new(Transactions::OccurredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::AmountMinor)
                            .big_integer()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::Currency).string().not_null())
                    .col(ColumnDef::new(Transactions::Description).string())
                    .col(ColumnDef::new(Transactions::Merchant).string())
                    .col(ColumnDef::new(Transactions::Source).string().not_null())
                    .col(
                        ColumnDef::new(Transactions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Transactions::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Transactions::DeletedAt).timestamp_with_time_zone())
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-transactions-owner_id-occurred_at")
                    .table(Transactions::Table)
                    .col(Transactions::OwnerId)
                    .col(Transactions::OccurredAt)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 6. Splits
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(Splits::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Splits::Id).string().not_null().primary_key())
                    .col(ColumnDef::new(Splits::TransactionId).string().not_null())
                    .col(ColumnDef::new(Splits::Position).integer().not_null())
                    .col(ColumnDef::new(Splits::OwnerId).string().not_null())
                    .col(
                        ColumnDef::new(Splits::OccurredAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Splits::AmountMinor).big_integer().not_null())
                    .col(ColumnDef::new(Splits::BudgetId).string())
                    .col(ColumnDef::new(Splits::OutflowId).string())
                    .col(ColumnDef::new(Splits::InflowId).string())
                    .col(
                        ColumnDef::new(Splits::WithheldMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk-splits-transaction_id")
                            .from(Splits::Table, Splits::TransactionId)
                            .to(Transactions::Table, Transactions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-splits-transaction_id")
                    .table(Splits::Table)
                    .col(Splits::TransactionId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-splits-outflow_id")
                    .table(Splits::Table)
                    .col(Splits::OutflowId)
                    .col(Splits::OccurredAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-splits-inflow_id")
                    .table(Splits::Table)
                    .col(Splits::InflowId)
                    .col(Splits::OccurredAt)
                    .to_owned(),
            )
            .await?;

        // ───────────────────────────────────────────────────────────────────
        // 7. Period summaries
        // ───────────────────────────────────────────────────────────────────
        manager
            .create_table(
                Table::create()
                    .table(PeriodSummaries::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PeriodSummaries::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PeriodSummaries::Scope).string().not_null())
                    .col(ColumnDef::new(PeriodSummaries::ScopeId).string().not_null())
                    .col(ColumnDef::new(PeriodSummaries::PeriodType).string().not_null())
                    .col(
                        ColumnDef::new(PeriodSummaries::SourcePeriodId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PeriodSummaries::PeriodStart)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PeriodSummaries::PeriodEnd)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(ColumnDef::new(PeriodSummaries::Outflows).json().not_null())
                    .col(ColumnDef::new(PeriodSummaries::Budgets).json().not_null())
                    .col(ColumnDef::new(PeriodSummaries::Inflows).json().not_null())
                    .col(ColumnDef::new(PeriodSummaries::Totals).json().not_null())
                    .col(
                        ColumnDef::new(PeriodSummaries::LastRecalculated)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PeriodSummaries::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-period_summaries-scope")
                    .table(PeriodSummaries::Table)
                    .col(PeriodSummaries::Scope)
                    .col(PeriodSummaries::ScopeId)
                    .col(PeriodSummaries::PeriodType)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PeriodSummaries::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Splits::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Transactions::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(ResourcePeriods::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(RecurringResources::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(SourcePeriods::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(Users::Table).to_owned())
            .await?;
        Ok(())
    }
}
