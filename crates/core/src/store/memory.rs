//! In-process poll store.
//!
//! Every operation runs under one async mutex, so the duplicate-ballot check
//! and the insert are a single atomic step, as are state transitions.
//!
//! That mutex serializes all polls, not just the one being touched. It is
//! meant for embedding and tests; production deployments use [`DbPollStore`],
//! where row-level constraints and conditional updates scope contention to a
//! single poll or ballot.
//!
//! [`DbPollStore`]: super::DbPollStore

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tally_common::{AppError, AppResult, IdGenerator};
use tally_db::entities::poll::PollState;
use tally_db::entities::{poll, poll_option, poll_vote, poll_vote_choice, vote_statistics};
use tokio::sync::Mutex;

use super::{PollStore, PollWithOptions, VoteInsertion};

#[derive(Debug, Default)]
struct MemoryState {
    polls: HashMap<String, poll::Model>,
    options: HashMap<String, Vec<poll_option::Model>>,
    /// Keyed by `(poll_id, user_id)`.
    ballots: HashMap<(String, String), poll_vote::Model>,
    choices: Vec<poll_vote_choice::Model>,
    /// Keyed by `(poll_id, option_id)`.
    statistics: HashMap<(String, String), vote_statistics::Model>,
}

impl MemoryState {
    fn polls_matching(&self, predicate: impl Fn(&poll::Model) -> bool) -> Vec<poll::Model> {
        let mut polls: Vec<poll::Model> = self
            .polls
            .values()
            .filter(|p| predicate(p))
            .cloned()
            .collect();
        polls.sort_by(|a, b| a.start_at.cmp(&b.start_at).then_with(|| a.id.cmp(&b.id)));
        polls
    }
}

/// Poll store that keeps everything in memory.
#[derive(Debug, Default)]
pub struct MemoryPollStore {
    state: Mutex<MemoryState>,
    id_gen: IdGenerator,
}

impl MemoryPollStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ballots recorded for a poll.
    pub async fn ballot_count(&self, poll_id: &str) -> usize {
        let state = self.state.lock().await;
        state.ballots.keys().filter(|(p, _)| p == poll_id).count()
    }

    /// Number of option selections recorded for a poll.
    pub async fn selection_count(&self, poll_id: &str) -> usize {
        let state = self.state.lock().await;
        state.choices.iter().filter(|c| c.poll_id == poll_id).count()
    }
}

#[async_trait]
impl PollStore for MemoryPollStore {
    async fn create_poll(
        &self,
        poll: poll::Model,
        mut options: Vec<poll_option::Model>,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.polls.contains_key(&poll.id) {
            return Err(AppError::Conflict(format!("Poll {} already exists", poll.id)));
        }
        options.sort_by_key(|o| o.sort_order);
        state.options.insert(poll.id.clone(), options);
        state.polls.insert(poll.id.clone(), poll);
        Ok(())
    }

    async fn find_poll(&self, poll_id: &str) -> AppResult<Option<PollWithOptions>> {
        let state = self.state.lock().await;
        Ok(state.polls.get(poll_id).map(|poll| PollWithOptions {
            poll: poll.clone(),
            options: state.options.get(poll_id).cloned().unwrap_or_default(),
        }))
    }

    async fn find_polls_by_state(&self, state_filter: PollState) -> AppResult<Vec<poll::Model>> {
        let state = self.state.lock().await;
        Ok(state.polls_matching(|p| p.state == state_filter))
    }

    async fn find_polls_by_state_and_end_before(
        &self,
        state_filter: PollState,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<poll::Model>> {
        let state = self.state.lock().await;
        Ok(state.polls_matching(|p| p.state == state_filter && p.end_at.with_timezone(&Utc) < at))
    }

    async fn find_polls_by_state_and_window_contains(
        &self,
        state_filter: PollState,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<poll::Model>> {
        let state = self.state.lock().await;
        Ok(state.polls_matching(|p| p.state == state_filter && p.window_contains(at)))
    }

    async fn transition_state(
        &self,
        poll_id: &str,
        expected: PollState,
        new_state: PollState,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        if !expected.can_transition_to(new_state) {
            return Err(AppError::Conflict(format!(
                "Poll state cannot move from {expected:?} to {new_state:?}"
            )));
        }

        let mut state = self.state.lock().await;
        match state.polls.get_mut(poll_id) {
            Some(poll) if poll.state == expected => {
                poll.state = new_state;
                poll.updated_at = Some(at.into());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_vote_if_absent(
        &self,
        user_id: &str,
        poll_id: &str,
        option_ids: &[String],
        at: DateTime<Utc>,
    ) -> AppResult<VoteInsertion> {
        let mut state = self.state.lock().await;
        let key = (poll_id.to_string(), user_id.to_string());
        if state.ballots.contains_key(&key) {
            return Ok(VoteInsertion::AlreadyVoted);
        }

        let vote_id = self.id_gen.generate_uuid_v7();
        state.ballots.insert(
            key,
            poll_vote::Model {
                id: vote_id.clone(),
                poll_id: poll_id.to_string(),
                user_id: user_id.to_string(),
                created_at: at.into(),
            },
        );
        state
            .choices
            .extend(option_ids.iter().map(|option_id| poll_vote_choice::Model {
                vote_id: vote_id.clone(),
                option_id: option_id.clone(),
                poll_id: poll_id.to_string(),
            }));

        Ok(VoteInsertion::Recorded(vote_id))
    }

    async fn has_voted(&self, user_id: &str, poll_id: &str) -> AppResult<bool> {
        let state = self.state.lock().await;
        Ok(state
            .ballots
            .contains_key(&(poll_id.to_string(), user_id.to_string())))
    }

    async fn find_voted_poll_ids(&self) -> AppResult<Vec<String>> {
        let state = self.state.lock().await;
        let mut ids: Vec<String> = state.ballots.keys().map(|(p, _)| p.clone()).collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn count_votes_by_option(&self, poll_id: &str) -> AppResult<HashMap<String, u64>> {
        let state = self.state.lock().await;
        let mut counts = HashMap::new();
        for choice in state.choices.iter().filter(|c| c.poll_id == poll_id) {
            *counts.entry(choice.option_id.clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn upsert_statistics(
        &self,
        poll_id: &str,
        option_id: &str,
        count: u64,
        at: DateTime<Utc>,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        state.statistics.insert(
            (poll_id.to_string(), option_id.to_string()),
            vote_statistics::Model {
                poll_id: poll_id.to_string(),
                option_id: option_id.to_string(),
                count: count as i64,
                created_at: at.into(),
            },
        );
        Ok(())
    }

    async fn find_statistics(&self, poll_id: &str) -> AppResult<Vec<vote_statistics::Model>> {
        let state = self.state.lock().await;
        Ok(state
            .statistics
            .values()
            .filter(|s| s.poll_id == poll_id)
            .cloned()
            .collect())
    }
}
