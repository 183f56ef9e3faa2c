//! Options selected by a ballot.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "poll_vote_choice")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub vote_id: String,

    #[sea_orm(primary_key, auto_increment = false)]
    pub option_id: String,

    /// Denormalized from the ballot so tallies group without a join.
    #[sea_orm(indexed)]
    pub poll_id: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::poll_vote::Entity",
        from = "Column::VoteId",
        to = "super::poll_vote::Column::Id",
        on_delete = "Cascade"
    )]
    PollVote,
    #[sea_orm(
        belongs_to = "super::poll_option::Entity",
        from = "Column::OptionId",
        to = "super::poll_option::Column::Id",
        on_delete = "Cascade"
    )]
    PollOption,
}

impl Related<super::poll_vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PollVote.def()
    }
}

impl Related<super::poll_option::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PollOption.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
