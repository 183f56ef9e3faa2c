//! Create `poll_vote` and `poll_vote_choice` tables.

use sea_orm_migration::prelude::*;

use super::m20250101_000001_create_poll_table::Poll;
use super::m20250101_000002_create_poll_option_table::PollOption;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(PollVote::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PollVote::Id)
                            .string_len(36)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PollVote::PollId).string_len(32).not_null())
                    .col(ColumnDef::new(PollVote::UserId).string_len(64).not_null())
                    .col(
                        ColumnDef::new(PollVote::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_poll_vote_poll")
                            .from(PollVote::Table, PollVote::PollId)
                            .to(Poll::Table, Poll::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // At most one ballot per user and poll
        manager
            .create_index(
                Index::create()
                    .name("uq_poll_vote_poll_id_user_id")
                    .table(PollVote::Table)
                    .col(PollVote::PollId)
                    .col(PollVote::UserId)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(PollVoteChoice::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PollVoteChoice::VoteId)
                            .string_len(36)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PollVoteChoice::OptionId)
                            .string_len(32)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(PollVoteChoice::PollId)
                            .string_len(32)
                            .not_null(),
                    )
                    .primary_key(
                        Index::create()
                            .col(PollVoteChoice::VoteId)
                            .col(PollVoteChoice::OptionId),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_poll_vote_choice_vote")
                            .from(PollVoteChoice::Table, PollVoteChoice::VoteId)
                            .to(PollVote::Table, PollVote::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_poll_vote_choice_option")
                            .from(PollVoteChoice::Table, PollVoteChoice::OptionId)
                            .to(PollOption::Table, PollOption::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Tally queries group by option within a poll
        manager
            .create_index(
                Index::create()
                    .name("idx_poll_vote_choice_poll_id_option_id")
                    .table(PollVoteChoice::Table)
                    .col(PollVoteChoice::PollId)
                    .col(PollVoteChoice::OptionId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PollVoteChoice::Table).to_owned())
            .await?;
        manager
            .drop_table(Table::drop().table(PollVote::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
enum PollVote {
    Table,
    Id,
    PollId,
    UserId,
    CreatedAt,
}

#[derive(Iden)]
enum PollVoteChoice {
    Table,
    VoteId,
    OptionId,
    PollId,
}
