//! Create `vote_statistics` table.

use sea_orm_migration::prelude::*;

use super::m20250101_000001_create_poll_table::Poll;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(VoteStatistics::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(VoteStatistics::PollId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteStatistics::OptionId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(VoteStatistics::Count)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(VoteStatistics::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .primary_key(
                        Index::create()
                            .col(VoteStatistics::PollId)
                            .col(VoteStatistics::OptionId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_vote_statistics_poll")
                            .from(VoteStatistics::Table, VoteStatistics::PollId)
                            .to(Poll::Table, Poll::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(VoteStatistics::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum VoteStatistics {
    Table,
    PollId,
    OptionId,
    Count,
    CreatedAt,
}
