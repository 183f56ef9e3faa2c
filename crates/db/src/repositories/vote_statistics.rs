//! Vote statistics repository.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set};
use tally_common::{AppError, AppResult};

use crate::entities::{VoteStatistics, vote_statistics};

/// Repository for the materialized per-option counts.
#[derive(Clone)]
pub struct VoteStatisticsRepository {
    db: Arc<DatabaseConnection>,
}

impl VoteStatisticsRepository {
    /// Create a new vote statistics repository.
    #[must_use]
    pub const fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Write the count for one option, replacing any previous row.
    pub async fn upsert(
        &self,
        poll_id: &str,
        option_id: &str,
        count: u64,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let model = vote_statistics::ActiveModel {
            poll_id: Set(poll_id.to_string()),
            option_id: Set(option_id.to_string()),
            count: Set(count as i64),
            created_at: Set(at.into()),
        };

        VoteStatistics::insert(model)
            .on_conflict(
                OnConflict::columns([
                    vote_statistics::Column::PollId,
                    vote_statistics::Column::OptionId,
                ])
                .update_columns([
                    vote_statistics::Column::Count,
                    vote_statistics::Column::CreatedAt,
                ])
                .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    /// Get the snapshot rows of a poll.
    pub async fn find_by_poll(&self, poll_id: &str) -> AppResult<Vec<vote_statistics::Model>> {
        VoteStatistics::find()
            .filter(vote_statistics::Column::PollId.eq(poll_id))
            .all(self.db.as_ref())
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    #[tokio::test]
    async fn test_upsert() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );

        let repo = VoteStatisticsRepository::new(db);
        repo.upsert("poll1", "optA", 4, Utc::now()).await.unwrap();
    }

    #[tokio::test]
    async fn test_find_by_poll() {
        let now = Utc::now();
        let row = vote_statistics::Model {
            poll_id: "poll1".to_string(),
            option_id: "optA".to_string(),
            count: 4,
            created_at: now.into(),
        };

        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_query_results([[row]])
                .into_connection(),
        );

        let repo = VoteStatisticsRepository::new(db);
        let rows = repo.find_by_poll("poll1").await.unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].count, 4);
    }
}
