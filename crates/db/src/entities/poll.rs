//! Poll entity.

use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Lifecycle state of a poll.
///
/// States only ever move forward: `Draft -> Scheduled -> Published -> Deleted`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum PollState {
    /// Created by an administrator, not yet visible.
    #[sea_orm(string_value = "draft")]
    Draft,
    /// Waiting for its voting window to open.
    #[sea_orm(string_value = "scheduled")]
    Scheduled,
    /// Open for votes.
    #[sea_orm(string_value = "published")]
    Published,
    /// Voting window closed. Data is retained.
    #[sea_orm(string_value = "deleted")]
    Deleted,
}

impl PollState {
    /// Whether `next` is the single state this one may move to.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Draft, Self::Scheduled)
                | (Self::Scheduled, Self::Published)
                | (Self::Published, Self::Deleted)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "poll")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    pub title: String,

    /// Minimum number of options a ballot must select.
    pub min_choices: i32,

    /// Maximum number of options a ballot may select.
    pub max_choices: i32,

    /// Voting opens at this instant (inclusive).
    #[sea_orm(indexed)]
    pub start_at: DateTimeWithTimeZone,

    /// Voting closes at this instant (exclusive).
    #[sea_orm(indexed)]
    pub end_at: DateTimeWithTimeZone,

    #[sea_orm(indexed)]
    pub state: PollState,

    pub created_at: DateTimeWithTimeZone,

    #[sea_orm(nullable)]
    pub updated_at: Option<DateTimeWithTimeZone>,
}

impl Model {
    /// Whether `now` falls inside `[start_at, end_at)`.
    #[must_use]
    pub fn window_contains(&self, now: DateTime<Utc>) -> bool {
        self.start_at.with_timezone(&Utc) <= now && now < self.end_at.with_timezone(&Utc)
    }

    /// Whether `count` selected options satisfies the choice bounds.
    #[must_use]
    pub fn accepts_selection_count(&self, count: usize) -> bool {
        let count = count as i64;
        i64::from(self.min_choices) <= count && count <= i64::from(self.max_choices)
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::poll_option::Entity")]
    PollOption,
    #[sea_orm(has_many = "super::poll_vote::Entity")]
    PollVote,
    #[sea_orm(has_many = "super::vote_statistics::Entity")]
    VoteStatistics,
}

impl Related<super::poll_option::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PollOption.def()
    }
}

impl Related<super::poll_vote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PollVote.def()
    }
}

impl Related<super::vote_statistics::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::VoteStatistics.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn poll_at(start: DateTime<Utc>, end: DateTime<Utc>) -> Model {
        Model {
            id: "p1".to_string(),
            title: "Lunch".to_string(),
            min_choices: 1,
            max_choices: 2,
            start_at: start.into(),
            end_at: end.into(),
            state: PollState::Published,
            created_at: start.into(),
            updated_at: None,
        }
    }

    #[test]
    fn test_transitions_only_move_forward() {
        assert!(PollState::Draft.can_transition_to(PollState::Scheduled));
        assert!(PollState::Scheduled.can_transition_to(PollState::Published));
        assert!(PollState::Published.can_transition_to(PollState::Deleted));

        assert!(!PollState::Draft.can_transition_to(PollState::Published));
        assert!(!PollState::Published.can_transition_to(PollState::Scheduled));
        assert!(!PollState::Deleted.can_transition_to(PollState::Draft));
        assert!(!PollState::Deleted.can_transition_to(PollState::Deleted));
    }

    #[test]
    fn test_window_is_half_open() {
        let start = Utc::now();
        let end = start + Duration::hours(1);
        let poll = poll_at(start, end);

        assert!(!poll.window_contains(start - Duration::seconds(1)));
        assert!(poll.window_contains(start));
        assert!(poll.window_contains(end - Duration::seconds(1)));
        assert!(!poll.window_contains(end));
    }

    #[test]
    fn test_selection_bounds() {
        let now = Utc::now();
        let poll = poll_at(now, now + Duration::hours(1));

        assert!(!poll.accepts_selection_count(0));
        assert!(poll.accepts_selection_count(1));
        assert!(poll.accepts_selection_count(2));
        assert!(!poll.accepts_selection_count(3));
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&PollState::Published).unwrap_or_default();
        assert_eq!(json, "\"published\"");
    }
}
