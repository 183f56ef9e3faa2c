//! The poll store seam.
//!
//! Services talk to storage only through [`PollStore`]. Two implementations
//! ship with the crate: [`DbPollStore`] backed by sea-orm and
//! [`MemoryPollStore`] for embedding and tests.

mod db;
#[cfg(test)]
pub(crate) mod flaky;
mod memory;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_common::{AppError, AppResult};
use tally_db::entities::poll::PollState;
use tally_db::entities::{poll, poll_option, vote_statistics};
pub use tally_db::repositories::VoteInsertion;

pub use db::DbPollStore;
pub use memory::MemoryPollStore;

/// Default upper bound for a single store call.
pub const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(10);

/// A poll with its options in display order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollWithOptions {
    /// The poll itself.
    pub poll: poll::Model,
    /// Options sorted by `sort_order`.
    pub options: Vec<poll_option::Model>,
}

impl PollWithOptions {
    /// Whether `option_id` belongs to this poll.
    #[must_use]
    pub fn has_option(&self, option_id: &str) -> bool {
        self.options.iter().any(|o| o.id == option_id)
    }
}

/// Storage primitives consumed by the poll services.
///
/// Implementations must make [`PollStore::transition_state`] and
/// [`PollStore::insert_vote_if_absent`] atomic per poll and per
/// `(user_id, poll_id)` respectively.
#[async_trait]
pub trait PollStore: Send + Sync {
    /// Insert a poll together with all of its options.
    async fn create_poll(
        &self,
        poll: poll::Model,
        options: Vec<poll_option::Model>,
    ) -> AppResult<()>;

    /// Load a poll and its options.
    async fn find_poll(&self, poll_id: &str) -> AppResult<Option<PollWithOptions>>;

    /// All polls currently in `state`.
    async fn find_polls_by_state(&self, state: PollState) -> AppResult<Vec<poll::Model>>;

    /// Polls in `state` whose `end_at` is before `at`.
    async fn find_polls_by_state_and_end_before(
        &self,
        state: PollState,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<poll::Model>>;

    /// Polls in `state` with `start_at <= at < end_at`.
    async fn find_polls_by_state_and_window_contains(
        &self,
        state: PollState,
        at: DateTime<Utc>,
    ) -> AppResult<Vec<poll::Model>>;

    /// Compare-and-set the poll state. `false` if `expected` did not match.
    async fn transition_state(
        &self,
        poll_id: &str,
        expected: PollState,
        new_state: PollState,
        at: DateTime<Utc>,
    ) -> AppResult<bool>;

    /// Record a ballot unless the user already has one for the poll.
    async fn insert_vote_if_absent(
        &self,
        user_id: &str,
        poll_id: &str,
        option_ids: &[String],
        at: DateTime<Utc>,
    ) -> AppResult<VoteInsertion>;

    /// Whether the user has a ballot for the poll.
    async fn has_voted(&self, user_id: &str, poll_id: &str) -> AppResult<bool>;

    /// IDs of polls with at least one ballot.
    async fn find_voted_poll_ids(&self) -> AppResult<Vec<String>>;

    /// Number of ballots selecting each option. Unselected options are absent.
    async fn count_votes_by_option(&self, poll_id: &str) -> AppResult<HashMap<String, u64>>;

    /// Replace the snapshot row for one option.
    async fn upsert_statistics(
        &self,
        poll_id: &str,
        option_id: &str,
        count: u64,
        at: DateTime<Utc>,
    ) -> AppResult<()>;

    /// Snapshot rows of a poll.
    async fn find_statistics(&self, poll_id: &str) -> AppResult<Vec<vote_statistics::Model>>;
}

/// Shared handle to a poll store.
pub type PollStoreService = Arc<dyn PollStore>;

/// Run a store call with an upper bound on its duration.
pub(crate) async fn bounded<T, F>(limit: Duration, operation: &'static str, call: F) -> AppResult<T>
where
    F: Future<Output = AppResult<T>>,
{
    tokio::time::timeout(limit, call).await.map_err(|_| {
        AppError::Timeout(format!(
            "{operation} did not complete within {}ms",
            limit.as_millis()
        ))
    })?
}
