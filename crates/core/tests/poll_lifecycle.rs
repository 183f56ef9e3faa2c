//! End-to-end poll lifecycle against the in-memory store.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use tally_core::{
    CreatePollInput, CreatePollOptionInput, LifecycleService, MemoryPollStore,
    NoOpPollEventPublisher, PollService, PollStore, StatisticsAggregator, VoteError,
    VotingService,
};
use tally_db::entities::poll::PollState;

struct Harness {
    store: Arc<MemoryPollStore>,
    polls: PollService,
    voting: VotingService,
    lifecycle: LifecycleService,
    aggregator: StatisticsAggregator,
}

impl Harness {
    fn new() -> Self {
        let store = Arc::new(MemoryPollStore::new());
        Self {
            polls: PollService::new(store.clone()),
            voting: VotingService::new(store.clone()),
            lifecycle: LifecycleService::new(store.clone(), Arc::new(NoOpPollEventPublisher)),
            aggregator: StatisticsAggregator::new(store.clone()),
            store,
        }
    }

    async fn scheduled_poll(
        &self,
        options: &[&str],
        start_at: DateTime<Utc>,
        end_at: DateTime<Utc>,
    ) -> (String, Vec<String>) {
        let poll_id = self
            .polls
            .create_poll(CreatePollInput {
                title: "Where should we eat?".to_string(),
                min_choices: 1,
                max_choices: 2,
                start_at,
                end_at,
                options: options
                    .iter()
                    .map(|title| CreatePollOptionInput {
                        title: (*title).to_string(),
                        image_url: None,
                    })
                    .collect(),
            })
            .await
            .unwrap();
        self.polls.schedule_poll(&poll_id).await.unwrap();

        let option_ids = self
            .polls
            .get_poll(&poll_id)
            .await
            .unwrap()
            .options
            .into_iter()
            .map(|o| o.id)
            .collect();
        (poll_id, option_ids)
    }

    async fn state(&self, poll_id: &str) -> PollState {
        self.polls.get_poll(poll_id).await.unwrap().poll.state
    }
}

#[tokio::test]
async fn test_ballot_rules_scenario() {
    let h = Harness::new();
    let t0 = Utc::now();
    let (poll_id, options) = h
        .scheduled_poll(&["A", "B", "C"], t0, t0 + Duration::hours(1))
        .await;
    h.lifecycle.run_pass(t0).await;
    assert_eq!(h.state(&poll_id).await, PollState::Published);

    let (a, b, c) = (options[0].clone(), options[1].clone(), options[2].clone());
    let now = t0 + Duration::minutes(1);

    h.voting
        .cast_vote_at("alice", &poll_id, &[a.clone(), b.clone()], now)
        .await
        .unwrap();

    let repeat = h
        .voting
        .cast_vote_at("alice", &poll_id, &[c.clone()], now)
        .await;
    assert!(matches!(repeat, Err(VoteError::AlreadyVoted { .. })));

    let too_many = h.voting.cast_vote_at("bob", &poll_id, &[a, b, c], now).await;
    assert!(matches!(
        too_many,
        Err(VoteError::InvalidSelectionCount { count: 3, .. })
    ));

    assert!(h.polls.has_voted("alice", &poll_id).await.unwrap());
    assert!(!h.polls.has_voted("bob", &poll_id).await.unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_identical_votes_record_one_ballot() {
    let h = Harness::new();
    let t0 = Utc::now();
    let (poll_id, options) = h
        .scheduled_poll(&["A", "B"], t0, t0 + Duration::hours(1))
        .await;
    h.lifecycle.run_pass(t0).await;

    let selection = vec![options[0].clone()];
    let attempts = (0..32).map(|_| {
        let voting = h.voting.clone();
        let poll_id = poll_id.clone();
        let selection = selection.clone();
        tokio::spawn(async move { voting.cast_vote_at("carol", &poll_id, &selection, t0).await })
    });
    let results: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(Result::unwrap)
        .collect();

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    let duplicates = results
        .iter()
        .filter(|r| matches!(r, Err(VoteError::AlreadyVoted { .. })))
        .count();
    assert_eq!(accepted, 1);
    assert_eq!(duplicates, 31);
    assert_eq!(h.store.ballot_count(&poll_id).await, 1);
}

#[tokio::test]
async fn test_window_enforced_regardless_of_state() {
    let h = Harness::new();
    let t0 = Utc::now();
    let t1 = t0 + Duration::hours(1);
    let (poll_id, options) = h.scheduled_poll(&["A", "B"], t0, t1).await;
    h.lifecycle.run_pass(t0).await;

    // Still PUBLISHED because no retire pass has run past t1.
    assert_eq!(h.state(&poll_id).await, PollState::Published);
    let late = h
        .voting
        .cast_vote_at("dave", &poll_id, &options[..1], t1)
        .await;
    let early = h
        .voting
        .cast_vote_at("erin", &poll_id, &options[..1], t0 - Duration::seconds(1))
        .await;

    assert!(matches!(late, Err(VoteError::OutsideVotingWindow(_))));
    assert!(matches!(early, Err(VoteError::OutsideVotingWindow(_))));
}

#[tokio::test]
async fn test_full_lifecycle_never_regresses() {
    let h = Harness::new();
    let t0 = Utc::now();
    let t1 = t0 + Duration::hours(1);
    let t2 = t1 + Duration::hours(1);
    let (first, first_options) = h.scheduled_poll(&["A", "B"], t0, t1).await;
    let (second, _) = h.scheduled_poll(&["C", "D"], t1, t2).await;

    h.lifecycle.run_pass(t0).await;
    h.lifecycle.run_pass(t0).await;
    assert_eq!(h.state(&first).await, PollState::Published);
    assert_eq!(h.state(&second).await, PollState::Scheduled);

    h.voting
        .cast_vote_at("frank", &first, &first_options, t0)
        .await
        .unwrap();

    h.lifecycle.run_pass(t1 + Duration::seconds(1)).await;
    assert_eq!(h.state(&first).await, PollState::Deleted);
    assert_eq!(h.state(&second).await, PollState::Published);

    h.lifecycle.run_pass(t2 + Duration::seconds(1)).await;
    h.lifecycle.run_pass(t0).await;
    assert_eq!(h.state(&first).await, PollState::Deleted);
    assert_eq!(h.state(&second).await, PollState::Deleted);

    // Retired polls keep their ballots and statistics.
    h.aggregator.aggregate_pass(t2).await.unwrap();
    let stats = h.polls.get_statistics(&first).await.unwrap();
    assert_eq!(stats.total_selections, 2);
}

#[tokio::test]
async fn test_statistics_sum_matches_selections() {
    let h = Harness::new();
    let t0 = Utc::now();
    let (poll_id, options) = h
        .scheduled_poll(&["A", "B", "C"], t0, t0 + Duration::hours(1))
        .await;
    h.lifecycle.run_pass(t0).await;

    let ballots: [(&str, Vec<String>); 4] = [
        ("u1", vec![options[0].clone(), options[1].clone()]),
        ("u2", vec![options[0].clone()]),
        ("u3", vec![options[2].clone()]),
        ("u4", vec![options[1].clone(), options[2].clone()]),
    ];
    for (user, selection) in &ballots {
        h.voting
            .cast_vote_at(user, &poll_id, selection, t0)
            .await
            .unwrap();
    }

    let before = h.polls.get_statistics(&poll_id).await.unwrap();
    assert!(!before.is_aggregated());

    h.aggregator.aggregate_pass(t0).await.unwrap();
    let after = h.polls.get_statistics(&poll_id).await.unwrap();

    assert_eq!(
        after.total_selections,
        h.store.selection_count(&poll_id).await as u64
    );
    let counts: Vec<u64> = after.options.iter().map(|o| o.count).collect();
    assert_eq!(counts, vec![2, 2, 2]);
}

#[tokio::test]
async fn test_tie_goes_to_smallest_id() {
    let store = Arc::new(MemoryPollStore::new());
    let lifecycle = LifecycleService::new(store.clone(), Arc::new(NoOpPollEventPublisher));
    let t = Utc::now();

    for id in ["7", "5"] {
        store
            .create_poll(
                tally_db::entities::poll::Model {
                    id: id.to_string(),
                    title: format!("Poll {id}"),
                    min_choices: 1,
                    max_choices: 1,
                    start_at: t.into(),
                    end_at: (t + Duration::hours(1)).into(),
                    state: PollState::Scheduled,
                    created_at: t.into(),
                    updated_at: None,
                },
                vec![],
            )
            .await
            .unwrap();
    }

    let first = lifecycle.publish_pass(t + Duration::seconds(1)).await.unwrap();
    let second = lifecycle.publish_pass(t + Duration::seconds(1)).await.unwrap();

    assert_eq!(first.applied + second.applied, 1);
    let five = store.find_poll("5").await.unwrap().unwrap();
    let seven = store.find_poll("7").await.unwrap().unwrap();
    assert_eq!(five.poll.state, PollState::Published);
    assert_eq!(seven.poll.state, PollState::Scheduled);
}
