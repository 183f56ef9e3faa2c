//! Vote statistics aggregation.
//!
//! Each pass recomputes per-option tallies from the recorded ballots and
//! overwrites the snapshot rows. Snapshots are replaced, never incremented,
//! so running a pass twice over the same ballots is harmless.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tally_common::{AppError, AppResult};
use tally_db::entities::poll::PollState;
use tally_db::entities::{poll_option, vote_statistics};
use tracing::{debug, info, warn};

use super::lifecycle::PassReport;
use crate::store::{DEFAULT_STORE_TIMEOUT, PollStoreService, bounded};

/// Tally for one option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptionTally {
    pub option_id: String,
    pub title: String,
    pub sort_order: i32,
    pub count: u64,
}

/// Latest aggregated tallies of a poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PollStatisticsSnapshot {
    pub poll_id: String,
    /// When the snapshot was last written. `None` before the first pass.
    pub aggregated_at: Option<DateTime<Utc>>,
    pub total_selections: u64,
    pub options: Vec<OptionTally>,
}

impl PollStatisticsSnapshot {
    /// Join snapshot rows onto the poll's options. Options without a row
    /// report zero.
    #[must_use]
    pub fn from_rows(
        poll_id: &str,
        options: &[poll_option::Model],
        rows: &[vote_statistics::Model],
    ) -> Self {
        let tallies: Vec<OptionTally> = options
            .iter()
            .map(|option| OptionTally {
                option_id: option.id.clone(),
                title: option.title.clone(),
                sort_order: option.sort_order,
                count: rows
                    .iter()
                    .find(|row| row.option_id == option.id)
                    .map_or(0, |row| row.count.max(0) as u64),
            })
            .collect();

        Self {
            poll_id: poll_id.to_string(),
            aggregated_at: rows
                .iter()
                .map(|row| row.created_at.with_timezone(&Utc))
                .max(),
            total_selections: tallies.iter().map(|t| t.count).sum(),
            options: tallies,
        }
    }

    /// Whether any pass has written this poll yet.
    #[must_use]
    pub const fn is_aggregated(&self) -> bool {
        self.aggregated_at.is_some()
    }
}

/// Recomputes vote statistics snapshots.
#[derive(Clone)]
pub struct StatisticsAggregator {
    store: PollStoreService,
    store_timeout: Duration,
}

impl StatisticsAggregator {
    /// Create a new aggregator.
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

    /// Aggregate every published poll and every poll that has ballots.
    ///
    /// A failure on one poll is logged and counted; the rest still run.
    pub async fn aggregate_pass(&self, now: DateTime<Utc>) -> AppResult<PassReport> {
        let published = bounded(
            self.store_timeout,
            "find_polls_by_state",
            self.store.find_polls_by_state(PollState::Published),
        )
        .await?;
        let voted = bounded(
            self.store_timeout,
            "find_voted_poll_ids",
            self.store.find_voted_poll_ids(),
        )
        .await?;

        let targets: BTreeSet<String> = published
            .into_iter()
            .map(|poll| poll.id)
            .chain(voted)
            .collect();

        let mut report = PassReport {
            examined: targets.len(),
            ..PassReport::default()
        };

        for poll_id in &targets {
            match self.aggregate_poll(poll_id, now).await {
                Ok(total) => {
                    report.applied += 1;
                    debug!(poll_id = %poll_id, total, "Aggregated poll statistics");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(poll_id = %poll_id, error = %e, "Failed to aggregate poll statistics");
                }
            }
        }

        if report.examined > 0 {
            info!(
                polls = report.examined,
                failed = report.failed,
                "Statistics pass finished"
            );
        }

        Ok(report)
    }

    /// Recompute and store the tallies of one poll.
    ///
    /// Every option gets a row, including options nobody picked. Returns the
    /// total number of selections written.
    pub async fn aggregate_poll(&self, poll_id: &str, now: DateTime<Utc>) -> AppResult<u64> {
        let found = bounded(self.store_timeout, "find_poll", self.store.find_poll(poll_id))
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Poll not found: {poll_id}")))?;

        let counts = bounded(
            self.store_timeout,
            "count_votes_by_option",
            self.store.count_votes_by_option(poll_id),
        )
        .await?;

        let mut total = 0;
        for option in &found.options {
            let count = counts.get(&option.id).copied().unwrap_or(0);
            bounded(
                self.store_timeout,
                "upsert_statistics",
                self.store.upsert_statistics(poll_id, &option.id, count, now),
            )
            .await?;
            total += count;
        }

        Ok(total)
    }
}
