//! Poll lifecycle passes.
//!
//! Two passes move polls forward along `Scheduled -> Published -> Deleted`.
//! Both are driven by the clock value handed in by the caller and are safe to
//! repeat: every transition is a compare-and-set on the expected state.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_common::AppResult;
use tally_db::entities::poll::{self, PollState};
use tracing::{debug, info, warn};

use super::event_publisher::{PollEvent, PollEventPublisherService};
use crate::store::{DEFAULT_STORE_TIMEOUT, PollStoreService, bounded};

/// Outcome of one scheduled pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassReport {
    /// Candidates the pass looked at.
    pub examined: usize,
    /// Candidates the pass changed.
    pub applied: usize,
    /// Candidates already moved by someone else.
    pub skipped: usize,
    /// Candidates that hit a store error.
    pub failed: usize,
}

impl PassReport {
    /// Whether every candidate was handled without error.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failed == 0
    }
}

/// Result of a full lifecycle run. `None` means the pass could not fetch its
/// candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleReport {
    pub retired: Option<PassReport>,
    pub published: Option<PassReport>,
}

/// Runs the retire and publish passes.
#[derive(Clone)]
pub struct LifecycleService {
    store: PollStoreService,
    events: PollEventPublisherService,
    store_timeout: Duration,
}

impl LifecycleService {
    /// Create a new lifecycle service.
    #[must_use]
    pub const fn new(store: PollStoreService, events: PollEventPublisherService) -> Self {
        Self {
            store,
            events,
            store_timeout: DEFAULT_STORE_TIMEOUT,
        }
    }

    /// Override the per-call store timeout.
    #[must_use]
    pub const fn with_store_timeout(mut self, store_timeout: Duration) -> Self {
        self.store_timeout = store_timeout;
        self
    }

    /// Retire every published poll whose window ended before `now`.
    ///
    /// A failure on one poll is logged and counted; the rest still run.
    pub async fn retire_pass(&self, now: DateTime<Utc>) -> AppResult<PassReport> {
        let expired = bounded(
            self.store_timeout,
            "find_polls_by_state_and_end_before",
            self.store
                .find_polls_by_state_and_end_before(PollState::Published, now),
        )
        .await?;

        let mut report = PassReport {
            examined: expired.len(),
            ..PassReport::default()
        };

        for poll in expired {
            match self
                .transition(&poll.id, PollState::Published, PollState::Deleted, now)
                .await
            {
                Ok(true) => {
                    report.applied += 1;
                    info!(poll_id = %poll.id, "Retired poll");
                    self.notify(PollEvent::Retired {
                        poll_id: poll.id.clone(),
                    });
                }
                Ok(false) => {
                    report.skipped += 1;
                    debug!(poll_id = %poll.id, "Poll already retired");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(poll_id = %poll.id, error = %e, "Failed to retire poll");
                }
            }
        }

        Ok(report)
    }

    /// Publish the earliest scheduled poll whose window contains `now`.
    ///
    /// Nothing is promoted while a published poll is still inside its own
    /// window. Ties on `start_at` go to the smallest poll id.
    pub async fn publish_pass(&self, now: DateTime<Utc>) -> AppResult<PassReport> {
        let active = bounded(
            self.store_timeout,
            "find_polls_by_state_and_window_contains",
            self.store
                .find_polls_by_state_and_window_contains(PollState::Published, now),
        )
        .await?;
        if let Some(current) = active.first() {
            debug!(poll_id = %current.id, "A poll is already published, skipping");
            return Ok(PassReport::default());
        }

        let eligible = bounded(
            self.store_timeout,
            "find_polls_by_state_and_window_contains",
            self.store
                .find_polls_by_state_and_window_contains(PollState::Scheduled, now),
        )
        .await?;

        let mut report = PassReport {
            examined: eligible.len(),
            ..PassReport::default()
        };

        let Some(winner) = select_next(&eligible) else {
            return Ok(report);
        };

        match self
            .transition(&winner.id, PollState::Scheduled, PollState::Published, now)
            .await
        {
            Ok(true) => {
                report.applied = 1;
                info!(
                    poll_id = %winner.id,
                    start_at = %winner.start_at,
                    candidates = eligible.len(),
                    "Published poll"
                );
                self.notify(PollEvent::Published {
                    poll_id: winner.id.clone(),
                    title: winner.title.clone(),
                });
            }
            Ok(false) => {
                report.skipped = 1;
                debug!(poll_id = %winner.id, "Poll was published concurrently");
            }
            Err(e) => {
                report.failed = 1;
                warn!(poll_id = %winner.id, error = %e, "Failed to publish poll");
            }
        }

        Ok(report)
    }

    /// Run retire then publish, so a poll that just closed frees the slot
    /// for its successor in the same run.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> LifecycleReport {
        let retired = match self.retire_pass(now).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "Retire pass failed");
                None
            }
        };
        let published = match self.publish_pass(now).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(error = %e, "Publish pass failed");
                None
            }
        };

        LifecycleReport { retired, published }
    }

    async fn transition(
        &self,
        poll_id: &str,
        expected: PollState,
        new_state: PollState,
        now: DateTime<Utc>,
    ) -> AppResult<bool> {
        bounded(
            self.store_timeout,
            "transition_state",
            self.store
                .transition_state(poll_id, expected, new_state, now),
        )
        .await
    }

    fn notify(&self, event: PollEvent) {
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Err(e) = events.publish(&event).await {
                warn!(poll_id = %event.poll_id(), error = %e, "Failed to publish poll event");
            }
        });
    }
}

/// Earliest `start_at`, then smallest id.
///
/// Ids compare as opaque strings, so `"10"` sorts before `"5"`. Generated
/// ULIDs sort by creation time under this ordering.
fn select_next(candidates: &[poll::Model]) -> Option<&poll::Model> {
    candidates
        .iter()
        .min_by(|a, b| a.start_at.cmp(&b.start_at).then_with(|| a.id.cmp(&b.id)))
}
