//! Poll vote repository.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ColumnTrait, DatabaseConnection, DbErr, EntityTrait, FromQueryResult, PaginatorTrait,
    QueryFilter, QuerySelect, Set, SqlErr, TransactionTrait,
};
use tally_common::{AppError, AppResult};

use crate::entities::{PollVote, PollVoteChoice, poll_vote, poll_vote_choice};

/// Outcome of an attempt to record a ballot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteInsertion {
    /// The ballot was stored under this ID.
    Recorded(String),
    /// The user already has a ballot for this poll.
    AlreadyVoted,
}

#[derive(Debug, FromQueryResult)]
struct OptionCount {
    option_id: String,
    count: i64,
}

/// Poll vote repository for database operations.
#[derive(Clone)]
pub struct PollVoteRepository {
    db: Arc<DatabaseConnection>,
}

impl PollVoteRepository {
    /// Create a new poll vote repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Record a ballot and its chosen options unless the user already voted.
    ///
    /// The `(poll_id, user_id)` unique index is the duplicate check, so two
    /// concurrent submissions cannot both succeed.
    pub async fn insert_if_absent(
        &self,
        vote_id: &str,
        user_id: &str,
        poll_id: &str,
        option_ids: &[String],
        at: DateTime<Utc>,
    ) -> AppResult<VoteInsertion> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let ballot = poll_vote::ActiveModel {
            id: Set(vote_id.to_string()),
            poll_id: Set(poll_id.to_string()),
            user_id: Set(user_id.to_string()),
            created_at: Set(at.into()),
        };

        // Dropping the transaction rolls it back.
        if let Err(e) = PollVote::insert(ballot).exec_without_returning(&txn).await {
            return if is_unique_violation(&e) {
                Ok(VoteInsertion::AlreadyVoted)
            } else {
                Err(AppError::Database(e.to_string()))
            };
        }

        let choices: Vec<poll_vote_choice::ActiveModel> = option_ids
            .iter()
            .map(|option_id| poll_vote_choice::ActiveModel {
                vote_id: Set(vote_id.to_string()),
                option_id: Set(option_id.clone()),
                poll_id: Set(poll_id.to_string()),
            })
            .collect();

        if !choices.is_empty() {
            PollVoteChoice::insert_many(choices)
                .exec_without_returning(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(VoteInsertion::Recorded(vote_id.to_string()))
    }

    /// Check if a user has voted on a poll.
    pub async fn has_voted(&self, user_id: &str, poll_id: &str) -> AppResult<bool> {
        let count = PollVote::find()
            .filter(poll_vote::Column::UserId.eq(user_id))
            .filter(poll_vote::Column::PollId.eq(poll_id))
            .count(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(count > 0)
    }

    /// Count how many ballots selected each option of a poll.
    ///
    /// Options nobody selected are absent from the map.
    pub async fn count_by_option(&self, poll_id: &str) -> AppResult<HashMap<String, u64>> {
        let rows = PollVoteChoice::find()
            .select_only()
            .column(poll_vote_choice::Column::OptionId)
            .column_as(
                Expr::col(poll_vote_choice::Column::OptionId).count(),
                "count",
            )
            .filter(poll_vote_choice::Column::PollId.eq(poll_id))
            .group_by(poll_vote_choice::Column::OptionId)
            .into_model::<OptionCount>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| (row.option_id, row.count.max(0) as u64))
            .collect())
    }

    /// IDs of every poll with at least one ballot.
    pub async fn find_voted_poll_ids(&self) -> AppResult<Vec<String>> {
        PollVote::find()
            .select_only()
            .column(poll_vote::Column::PollId)
            .distinct()
            .into_tuple::<String>()
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}
