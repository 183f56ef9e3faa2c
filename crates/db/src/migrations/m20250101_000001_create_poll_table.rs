//! Create `poll` table.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Poll::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Poll::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(Poll::Title).string_len(256).not_null())
                    .col(
                        ColumnDef::new(Poll::MinChoices)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Poll::MaxChoices)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(Poll::StartAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Poll::EndAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Poll::State)
                            .string_len(16)
                            .not_null()
                            .default("draft"),
                    )
                    .col(
                        ColumnDef::new(Poll::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(ColumnDef::new(Poll::UpdatedAt).timestamp_with_time_zone())
                    .check(Expr::col(Poll::MinChoices).gte(1))
                    .check(Expr::col(Poll::MinChoices).lte(Expr::col(Poll::MaxChoices)))
                    .check(Expr::col(Poll::StartAt).lt(Expr::col(Poll::EndAt)))
                    .to_owned(),
            )
            .await?;

        // Composite index for the lifecycle scans
        manager
            .create_index(
                Index::create()
                    .name("idx_poll_state_start_at")
                    .table(Poll::Table)
                    .col(Poll::State)
                    .col(Poll::StartAt)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_poll_state_end_at")
                    .table(Poll::Table)
                    .col(Poll::State)
                    .col(Poll::EndAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Poll::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum Poll {
    Table,
    Id,
    Title,
    MinChoices,
    MaxChoices,
    StartAt,
    EndAt,
    State,
    CreatedAt,
    UpdatedAt,
}
