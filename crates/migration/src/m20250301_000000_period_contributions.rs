//! Per-transaction contributions to period totals, and one everything-else
//! budget per owner.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[derive(Iden)]
enum PeriodContributions {
    Table,
    Id,
    TransactionId,
    ResourcePeriodId,
    ResourceId,
    SpentMinor,
    PaidMinor,
    WithheldMinor,
}

const EVERYTHING_ELSE_INDEX: &str = "uidx-recurring_resources-owner_id-everything_else";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PeriodContributions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PeriodContributions::Id)
                            .string()
                            .not_null()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(PeriodContributions::TransactionId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PeriodContributions::ResourcePeriodId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PeriodContributions::ResourceId)
                            .string()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PeriodContributions::SpentMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PeriodContributions::PaidMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(PeriodContributions::WithheldMinor)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-period_contributions-transaction_id")
                    .table(PeriodContributions::Table)
                    .col(PeriodContributions::TransactionId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx-period_contributions-resource_period_id")
                    .table(PeriodContributions::Table)
                    .col(PeriodContributions::ResourcePeriodId)
                    .to_owned(),
            )
            .await?;

        // Partial index, not expressible through the index builder.
        manager
            .get_connection()
            .execute_unprepared(&format!(
                r#"CREATE UNIQUE INDEX IF NOT EXISTS "{EVERYTHING_ELSE_INDEX}"
                   ON "recurring_resources" ("owner_id")
                   WHERE "is_system_everything_else""#
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared(&format!(r#"DROP INDEX IF EXISTS "{EVERYTHING_ELSE_INDEX}""#))
            .await?;
        manager
            .drop_table(Table::drop().table(PeriodContributions::Table).to_owned())
            .await?;
        Ok(())
    }
}
