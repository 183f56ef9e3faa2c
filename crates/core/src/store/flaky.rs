//! Test store that fails one kind of call for one poll.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tally_common::{AppError, AppResult};
use tally_db::entities::poll::PollState;
use tally_db::entities::{poll, poll_option, vote_statistics};

use super::{MemoryPollStore, PollStore, PollWithOptions, VoteInsertion};

/// Which store call breaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailingCall {
    TransitionState,
    CountVotesByOption,
}

/// Delegates to a [`MemoryPollStore`] except for `failing` on `broken_poll`.
pub struct FlakyStore {
    pub inner: MemoryPollStore,
    broken_poll: String,
    failing: FailingCall,
}

impl FlakyStore {
    pub fn new(broken_poll: &str, failing: FailingCall) -> Self {
        Self {
            inner: MemoryPollStore::new(),
            broken_poll: broken_poll.to_string(),
            failing,
        }
    }

    fn check(&self, call: FailingCall, poll_id: &str) -> AppResult<()> {
        if call == self.failing && poll_id == self.broken_poll {
            return Err(AppError::Database("connection reset".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl PollStore for FlakyStore {
    async fn create_poll(
        &self,
        poll: poll::Model,
        options: Vec<poll_option::Model>,
    ) -> AppResult<()> {
        self.inner.create_poll(poll, options).await
    }

    async fn find_poll(&self, poll_id: &str) -> AppResult<Option<PollWithOptions>> {
        self.inner.find_poll(poll_id).await
    }

    async fn find_polls_by_state(&self, state: PollState) -> AppResult<Vec<poll::Model>> {
        self.inner.find_polls_by_state(state).await
    }

    async fn find_polls_by_state_and_end_before(
        &self,
        state: PollState,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<poll::Model>> {
        self.inner.find_polls_by_state_and_end_before(state, at).await
    }

    async fn find_polls_by_state_and_window_contains(
        &self,
        state: PollState,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<poll::Model>> {
        self.inner
            .find_polls_by_state_and_window_contains(state, at)
            .await
    }

    async fn transition_state(
        &self,
        poll_id: &str,
        expected: PollState,
        new_state: PollState,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        self.check(FailingCall::TransitionState, poll_id)?;
        self.inner
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
        self.inner
            .insert_vote_if_absent(user_id, poll_id, option_ids, at)
            .await
    }

    async fn has_voted(&self, user_id: &str, poll_id: &str) -> AppResult<bool> {
        self.inner.has_voted(user_id, poll_id).await
    }

    async fn find_voted_poll_ids(&self) -> AppResult<Vec<String>> {
        self.inner.find_voted_poll_ids().await
    }

    async fn count_votes_by_option(&self, poll_id: &str) -> AppResult<HashMap<String, u64>> {
        self.check(FailingCall::CountVotesByOption, poll_id)?;
        self.inner.count_votes_by_option(poll_id).await
    }

    async fn upsert_statistics(
        &self,
        poll_id: &str,
        option_id: &str,
        count: u64,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        self.inner
            .upsert_statistics(poll_id, option_id, count, at)
            .await
    }

    async fn find_statistics(&self, poll_id: &str) -> AppResult<Vec<vote_statistics::Model>> {
        self.inner.find_statistics(poll_id).await
    }
}
