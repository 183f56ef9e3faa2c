//! Job executor backed by the poll services.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tally_core::{LifecycleService, StatisticsAggregator};

use crate::scheduler::{JobExecutor, JobResult};

/// Runs the scheduled poll jobs against the core services.
#[derive(Clone)]
pub struct PollJobExecutor {
    lifecycle: LifecycleService,
    aggregator: StatisticsAggregator,
}

impl PollJobExecutor {
    /// Create a new executor.
    #[must_use]
    pub const fn new(lifecycle: LifecycleService, aggregator: StatisticsAggregator) -> Self {
        Self {
            lifecycle,
            aggregator,
        }
    }
}

#[async_trait]
impl JobExecutor for PollJobExecutor {
    async fn run_lifecycle(&self, now: DateTime<Utc>) -> JobResult {
        let report = self.lifecycle.run_pass(now).await;

        let (Some(retired), Some(published)) = (report.retired, report.published) else {
            return Err("lifecycle pass could not load its candidates".into());
        };
        if !retired.is_clean() || !published.is_clean() {
            return Err(format!(
                "lifecycle pass left {} poll(s) unprocessed",
                retired.failed + published.failed
            )
            .into());
        }

        Ok((retired.applied + published.applied) as u64)
    }

    async fn aggregate_statistics(&self, now: DateTime<Utc>) -> JobResult {
        let report = self.aggregator.aggregate_pass(now).await?;
        if !report.is_clean() {
            return Err(format!(
                "statistics pass failed for {} of {} poll(s)",
                report.failed, report.examined
            )
            .into());
        }
        Ok(report.applied as u64)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::sync::Arc;
    use tally_core::{MemoryPollStore, NoOpPollEventPublisher, PollStore};
    use tally_db::entities::poll::{self, PollState};

    #[tokio::test]
    async fn test_executor_runs_passes() {
        let store = Arc::new(MemoryPollStore::new());
        let now = Utc::now();
        store
            .create_poll(
                poll::Model {
                    id: "p1".to_string(),
                    title: "Lunch".to_string(),
                    min_choices: 1,
                    max_choices: 1,
                    start_at: now.into(),
                    end_at: (now + Duration::hours(1)).into(),
                    state: PollState::Scheduled,
                    created_at: now.into(),
                    updated_at: None,
                },
                vec![],
            )
            .await
            .unwrap();

        let executor = PollJobExecutor::new(
            LifecycleService::new(store.clone(), Arc::new(NoOpPollEventPublisher)),
            StatisticsAggregator::new(store.clone()),
        );

        assert_eq!(executor.run_lifecycle(now).await.unwrap(), 1);
        assert_eq!(executor.run_lifecycle(now).await.unwrap(), 0);
        assert_eq!(executor.aggregate_statistics(now).await.unwrap(), 1);
    }
}
