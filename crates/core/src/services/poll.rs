//! Poll service.
//!
//! Administrative entry points: creating and scheduling polls and reading
//! them back together with their latest statistics.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tally_common::{AppError, AppResult, IdGenerator};
use tally_db::entities::poll::{self, PollState};
use tally_db::entities::poll_option;
use tracing::info;
use validator::Validate;

use super::statistics::PollStatisticsSnapshot;
use crate::store::{DEFAULT_STORE_TIMEOUT, PollStoreService, PollWithOptions, bounded};

/// Input for creating a poll.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollInput {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(range(min = 1))]
    pub min_choices: i32,
    #[validate(range(min = 1))]
    pub max_choices: i32,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    #[validate(length(min = 2, max = 20), nested)]
    pub options: Vec<CreatePollOptionInput>,
}

/// A single option of a new poll. Display order follows input order.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreatePollOptionInput {
    #[validate(length(min = 1, max = 100))]
    pub title: String,
    #[validate(length(max = 512))]
    pub image_url: Option<String>,
}

impl CreatePollInput {
    fn check_bounds(&self) -> AppResult<()> {
        if self.min_choices > self.max_choices {
            return Err(AppError::Validation(format!(
                "minChoices ({}) exceeds maxChoices ({})",
                self.min_choices, self.max_choices
            )));
        }
        if self.min_choices as usize > self.options.len() {
            return Err(AppError::Validation(format!(
                "minChoices ({}) exceeds the number of options ({})",
                self.min_choices,
                self.options.len()
            )));
        }
        if self.start_at >= self.end_at {
            return Err(AppError::Validation(
                "startAt must be before endAt".to_string(),
            ));
        }
        Ok(())
    }
}

/// Poll service for business logic.
#[derive(Clone)]
pub struct PollService {
    store: PollStoreService,
    id_gen: IdGenerator,
    store_timeout: Duration,
}

impl PollService {
    /// Create a new poll service.
    #[must_use]
    pub const fn new(store: PollStoreService) -> Self {
        Self {
            store,
            id_gen: IdGenerator::new(),
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Override the per-call store timeout.
    #[must_use]
    pub const fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Create a poll in `Draft` and return its ID.
    pub async fn create_poll(&self, input: CreatePollInput) -> AppResult<String> {
        input.validate()?;
        input.check_bounds()?;

        let now = Utc::now();
        let poll_id = self.id_gen.generate();

        let options = input
            .options
            .iter()
            .enumerate()
            .map(|(i, option)| poll_option::Model {
                id: self.id_gen.generate(),
                poll_id: poll_id.clone(),
                title: option.title.clone(),
                image_url: option.image_url.clone(),
                sort_order: i as i32,
            })
            .collect();

        let model = poll::Model {
            id: poll_id.clone(),
            title: input.title,
            min_choices: input.min_choices,
            max_choices: input.max_choices,
            start_at: input.start_at.into(),
            end_at: input.end_at.into(),
            state: PollState::Draft,
            created_at: now.into(),
            updated_at: None,
        };

        bounded(
            self.store_timeout,
            "create_poll",
            self.store.create_poll(model, options),
        )
        .await?;

        info!(poll_id = %poll_id, "Created poll");
        Ok(poll_id)
    }

    /// Move a draft poll to `Scheduled`.
    pub async fn schedule_poll(&self, poll_id: &str) -> AppResult<()> {
        let found = self.get_poll(poll_id).await?;
        if found.poll.state != PollState::Draft {
            return Err(AppError::Conflict(format!(
                "Poll {poll_id} is {:?}, only drafts can be scheduled",
                found.poll.state
            )));
        }

        let moved = bounded(
            self.store_timeout,
            "transition_state",
            self.store.transition_state(
                poll_id,
                PollState::Draft,
                PollState::Scheduled,
                Utc::now(),
            ),
        )
        .await?;
        if !moved {
            return Err(AppError::Conflict(format!(
                "Poll {poll_id} changed state concurrently"
            )));
        }

        info!(poll_id = %poll_id, "Scheduled poll");
        Ok(())
    }

    /// Get a poll and its options.
    pub async fn get_poll(&self, poll_id: &str) -> AppResult<PollWithOptions> {
        bounded(self.store_timeout, "find_poll", self.store.find_poll(poll_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {poll_id}")))
    }

    /// The published poll whose window contains `now`, if any.
    pub async fn get_active_poll(&self, now: DateTime<Utc>) -> AppResult<Option<poll::Model>> {
        let active = bounded(
            self.store_timeout,
            "find_polls_by_state_and_window_contains",
            self.store
                .find_polls_by_state_and_window_contains(PollState::Published, now),
        )
        .await?;
        Ok(active.into_iter().next())
    }

    /// Whether the user has already voted on the poll.
    pub async fn has_voted(&self, user_id: &str, poll_id: &str) -> AppResult<bool> {
        bounded(
            self.store_timeout,
            "has_voted",
            self.store.has_voted(user_id, poll_id),
        )
        .await
    }

    /// Latest aggregated statistics of a poll.
    ///
    /// Reflects the last aggregation pass, not ballots recorded since.
    pub async fn get_statistics(&self, poll_id: &str) -> AppResult<PollStatisticsSnapshot> {
        let found = self.get_poll(poll_id).await?;
        let rows = bounded(
            self.store_timeout,
            "find_statistics",
            self.store.find_statistics(poll_id),
        )
        .await?;

        Ok(PollStatisticsSnapshot::from_rows(
            poll_id,
            &found.options,
            &rows,
        ))
    }
}
