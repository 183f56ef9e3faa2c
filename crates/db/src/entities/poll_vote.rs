//! Poll vote entity: one row per ballot.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "poll_vote")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Poll the ballot was cast on. Unique together with `user_id`.
    #[sea_orm(indexed)]
    pub poll_id: String,

    /// User who voted
    pub user_id: String,

    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::poll::Entity",
        from = "Column::PollId",
        to = "super::poll::Column::Id",
        on_delete = "Cascade"
    )]
    Poll,
    #[sea_orm(has_many = "super::poll_vote_choice::Entity")]
    PollVoteChoice,
}

impl Related<super::poll::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Poll.def()
    }
}

impl Related<super::poll_vote_choice::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PollVoteChoice.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
