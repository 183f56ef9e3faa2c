//! sea-orm backed poll store.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::DatabaseConnection;
use tally_common::{AppResult, IdGenerator};
use tally_db::entities::poll::PollState;
use tally_db::entities::{poll, poll_option, vote_statistics};
use tally_db::repositories::{
    PollRepository, PollVoteRepository, VoteInsertion, VoteStatisticsRepository,
};

use super::{PollStore, PollWithOptions};

/// Poll store on top of the database repositories.
#[derive(Clone)]
pub struct DbPollStore {
    poll_repo: PollRepository,
    vote_repo: PollVoteRepository,
    statistics_repo: VoteStatisticsRepository,
    id_gen: IdGenerator,
}

impl DbPollStore {
    /// Create a store sharing one connection pool across repositories.
    #[must_use]
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            poll_repo: PollRepository::new(Arc::clone(&db)),
            vote_repo: PollVoteRepository::new(Arc::clone(&db)),
            statistics_repo: VoteStatisticsRepository::new(db),
            id_gen: IdGenerator::new(),
        }
    }
}

#[async_trait]
impl PollStore for DbPollStore {
    async fn create_poll(
        &self,
        poll: poll::Model,
        options: Vec<poll_option::Model>,
    ) -> AppResult<()> {
        let options = options.into_iter().map(Into::into).collect();
        self.poll_repo
            .create_with_options(poll.into(), options)
            .await
    }

    async fn find_poll(&self, poll_id: &str) -> AppResult<Option<PollWithOptions>> {
        let Some(poll) = self.poll_repo.find_by_id(poll_id).await? else {
            return Ok(None);
        };
        let options = self.poll_repo.find_options(poll_id).await?;
        Ok(Some(PollWithOptions { poll, options }))
    }

    async fn find_polls_by_state(&self, state: PollState) -> AppResult<Vec<poll::Model>> {
        self.poll_repo.find_by_state(state).await
    }

    async fn find_polls_by_state_and_end_before(
        &self,
        state: PollState,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<poll::Model>> {
        self.poll_repo.find_by_state_and_end_before(state, at).await
    }

    async fn find_polls_by_state_and_window_contains(
        &self,
        state: PollState,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<poll::Model>> {
        self.poll_repo
            .find_by_state_and_window_contains(state, at)
            .await
    }

    async fn transition_state(
        &self,
        poll_id: &str,
        expected: PollState,
        new_state: PollState,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.poll_repo
            .transition_state(poll_id, expected, new_state, at)
            .await
    }

    async fn insert_vote_if_absent(
        &self,
        user_id: &str,
        poll_id: &str,
        option_ids: &[String],
        at: DateTime<Utc>,
    ) -> AppResult<VoteInsertion> {
        let vote_id = self.id_gen.generate_uuid_v7();
        self.vote_repo
            .insert_if_absent(&vote_id, user_id, poll_id, option_ids, at)
            .await
    }

    async fn has_voted(&self, user_id: &str, poll_id: &str) -> AppResult<bool> {
        self.vote_repo.has_voted(user_id, poll_id).await
    }

    async fn find_voted_poll_ids(&self) -> AppResult<Vec<String>> {
        self.vote_repo.find_voted_poll_ids().await
    }

    async fn count_votes_by_option(&self, poll_id: &str) -> AppResult<HashMap<String, u64>> {
        self.vote_repo.count_by_option(poll_id).await
    }

    async fn upsert_statistics(
        &self,
        poll_id: &str,
        option_id: &str,
        count: u64,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.statistics_repo
            .upsert(poll_id, option_id, count, at)
            .await
    }

    async fn find_statistics(&self, poll_id: &str) -> AppResult<Vec<vote_statistics::Model>> {
        self.statistics_repo.find_by_poll(poll_id).await
    }
}
