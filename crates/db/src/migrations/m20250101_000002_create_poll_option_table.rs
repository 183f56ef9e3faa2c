//! Create `poll_option` table.

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
                    .table(PollOption::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(PollOption::Id)
                            .string_len(32)
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(PollOption::PollId).string_len(32).not_null())
                    .col(ColumnDef::new(PollOption::Title).string_len(128).not_null())
                    .col(ColumnDef::new(PollOption::ImageUrl).string_len(512))
                    .col(ColumnDef::new(PollOption::SortOrder).integer().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_poll_option_poll")
                            .from(PollOption::Table, PollOption::PollId)
                            .to(Poll::Table, Poll::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_poll_option_poll_id_sort_order")
                    .table(PollOption::Table)
                    .col(PollOption::PollId)
                    .col(PollOption::SortOrder)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(PollOption::Table).to_owned())
            .await
    }
}

#[derive(Iden)]
pub enum PollOption {
    Table,
    Id,
    PollId,
    Title,
    ImageUrl,
    SortOrder,
}
