//! Voting engine.
//!
//! Validates a ballot against the poll's current state and choice rules and
//! records it. Tallies are not touched here; the statistics aggregator picks
//! new ballots up on its next pass.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tally_common::AppError;
use tally_db::entities::poll::PollState;
use thiserror::Error;
use tracing::{debug, info};

use crate::store::{DEFAULT_STORE_TIMEOUT, PollStoreService, VoteInsertion, bounded};

/// Reasons a ballot is refused.
#[derive(Debug, Error)]
pub enum VoteError {
    #[error("Poll not found: {0}")]
    PollNotFound(String),

    #[error("Poll {poll_id} is not open for voting (state: {state:?})")]
    PollNotVotable { poll_id: String, state: PollState },

    #[error("Poll {0} is outside its voting window")]
    OutsideVotingWindow(String),

    #[error("Option {option_id} does not belong to poll {poll_id}")]
    UnknownOption { poll_id: String, option_id: String },

    #[error("Selected {count} options, poll requires between {min} and {max}")]
    InvalidSelectionCount { count: usize, min: i32, max: i32 },

    #[error("User {user_id} has already voted on poll {poll_id}")]
    AlreadyVoted { user_id: String, poll_id: String },

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<VoteError> for AppError {
    fn from(err: VoteError) -> Self {
        match err {
            VoteError::PollNotFound(_) | VoteError::UnknownOption { .. } => {
                Self::NotFound(err.to_string())
            }
            VoteError::InvalidSelectionCount { .. } => Self::Validation(err.to_string()),
            VoteError::PollNotVotable { .. }
            | VoteError::OutsideVotingWindow(_)
            | VoteError::AlreadyVoted { .. } => Self::Conflict(err.to_string()),
            VoteError::Store(inner) => inner,
        }
    }
}

/// Voting service for recording ballots.
#[derive(Clone)]
pub struct VotingService {
    store: PollStoreService,
    store_timeout: Duration,
}

impl VotingService {
    /// Create a new voting service.
    #[must_use]
    pub const fn new(store: PollStoreService) -> Self {
        Self {
            store,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Override the per-call store timeout.
    #[must_use]
    pub const fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Cast a ballot at the current time.
    pub async fn cast_vote(
        &self,
        user_id: &str,
        poll_id: &str,
        option_ids: &[String],
    ) -> Result<(), VoteError> {
        self.cast_vote_at(user_id, poll_id, option_ids, Utc::now())
            .await
    }

    /// Cast a ballot as of `now`.
    ///
    /// Checks run in a fixed order: poll exists, poll is published, `now` is
    /// inside `[start_at, end_at)`, every option belongs to the poll, the
    /// selection size is within bounds, and finally the atomic insert that
    /// rejects a second ballot from the same user.
    pub async fn cast_vote_at(
        &self,
        user_id: &str,
        poll_id: &str,
        option_ids: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), VoteError> {
        let found = bounded(self.store_timeout, "find_poll", self.store.find_poll(poll_id))
            .await?
            .ok_or_else(|| VoteError::PollNotFound(poll_id.to_string()))?;
        let poll = &found.poll;

        if poll.state != PollState::Published {
            return Err(VoteError::PollNotVotable {
                poll_id: poll_id.to_string(),
                state: poll.state,
            });
        }

        // State follows the clock only eventually, so check the window too.
        if !poll.window_contains(now) {
            return Err(VoteError::OutsideVotingWindow(poll_id.to_string()));
        }

        let selection: BTreeSet<&str> = option_ids.iter().map(String::as_str).collect();
        if let Some(unknown) = selection.iter().find(|id| !found.has_option(id)) {
            return Err(VoteError::UnknownOption {
                poll_id: poll_id.to_string(),
                option_id: (*unknown).to_string(),
            });
        }

        if !poll.accepts_selection_count(selection.len()) {
            return Err(VoteError::InvalidSelectionCount {
                count: selection.len(),
                min: poll.min_choices,
                max: poll.max_choices,
            });
        }

        let selection: Vec<String> = selection.into_iter().map(str::to_string).collect();
        let outcome = bounded(
            self.store_timeout,
            "insert_vote_if_absent",
            self.store
                .insert_vote_if_absent(user_id, poll_id, &selection, now),
        )
        .await?;

        match outcome {
            VoteInsertion::Recorded(vote_id) => {
                info!(
                    vote_id = %vote_id,
                    poll_id = %poll_id,
                    user_id = %user_id,
                    choices = selection.len(),
                    "Ballot recorded"
                );
                Ok(())
            }
            VoteInsertion::AlreadyVoted => {
                debug!(poll_id = %poll_id, user_id = %user_id, "Duplicate ballot rejected");
                Err(VoteError::AlreadyVoted {
                    user_id: user_id.to_string(),
                    poll_id: poll_id.to_string(),
                })
            }
        }
    }
}
