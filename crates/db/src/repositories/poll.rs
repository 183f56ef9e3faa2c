//! Poll repository.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveEnum, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use tally_common::{AppError, AppResult};

use crate::entities::poll::PollState;
use crate::entities::{Poll, PollOption, poll, poll_option};

/// Poll repository for database operations.
#[derive(Clone)]
pub struct PollRepository {
    db: Arc<DatabaseConnection>,
}

impl PollRepository {
    /// Create a new poll repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Find a poll by ID.
    pub async fn find_by_id(&self, id: &str) -> AppResult<Option<poll::Model>> {
        Poll::find_by_id(id)
            .one(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Get the options of a poll in display order.
    pub async fn find_options(&self, poll_id: &str) -> AppResult<Vec<poll_option::Model>> {
        PollOption::find()
            .filter(poll_option::Column::PollId.eq(poll_id))
            .order_by_asc(poll_option::Column::SortOrder)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Insert a poll together with its options.
    ///
    /// Both inserts share one transaction so a poll never exists without
    /// its options.
    pub async fn create_with_options(
        &self,
        poll: poll::ActiveModel,
        options: Vec<poll_option::ActiveModel>,
    ) -> AppResult<()> {
        let txn = self
            .db
            .begin()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Poll::insert(poll)
            .exec_without_returning(&txn)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        if !options.is_empty() {
            PollOption::insert_many(options)
                .exec_without_returning(&txn)
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }

        txn.commit()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find all polls in the given state.
    pub async fn find_by_state(&self, state: PollState) -> AppResult<Vec<poll::Model>> {
        Poll::find()
            .filter(poll::Column::State.eq(state))
            .order_by_asc(poll::Column::StartAt)
            .order_by_asc(poll::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find polls in `state` whose voting window closed before `at`.
    pub async fn find_by_state_and_end_before(
        &self,
        state: PollState,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<poll::Model>> {
        Poll::find()
            .filter(poll::Column::State.eq(state))
            .filter(poll::Column::EndAt.lt(at))
            .order_by_asc(poll::Column::EndAt)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Find polls in `state` whose voting window `[start_at, end_at)` contains `at`.
    pub async fn find_by_state_and_window_contains(
        &self,
        state: PollState,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<poll::Model>> {
        Poll::find()
            .filter(poll::Column::State.eq(state))
            .filter(poll::Column::StartAt.lte(at))
            .filter(poll::Column::EndAt.gt(at))
            .order_by_asc(poll::Column::StartAt)
            .order_by_asc(poll::Column::Id)
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Move a poll from `from` to `to` in a single conditional update.
    ///
    /// Returns `false` when the poll is missing or no longer in `from`.
    pub async fn transition_state(
        &self,
        id: &str,
        from: PollState,
        to: PollState,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        if !from.can_transition_to(to) {
            return Err(AppError::Conflict(format!(
                "Poll state cannot move from {from:?} to {to:?}"
            )));
        }

        let updated_at: sea_orm::prelude::DateTimeWithTimeZone = at.into();
        let result = Poll::update_many()
            .col_expr(poll::Column::State, Expr::value(to.to_value()))
            .col_expr(poll::Column::UpdatedAt, Expr::value(updated_at))
            .filter(poll::Column::Id.eq(id))
            .filter(poll::Column::State.eq(from))
            .exec(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected == 1)
    }
}
