//! Materialized per-option vote counts.
//!
//! Rows are derived from `poll_vote_choice` and replaced wholesale on every
//! aggregation pass.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "vote_statistics")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub poll_id: String,

    #[sea_orm(primary_key, auto_increment = false)]
    pub option_id: String,

    pub count: i64,

    /// When this row was last recomputed.
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
}

impl Related<super::poll::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Poll.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
