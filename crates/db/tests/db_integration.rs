//! Database integration tests.
//!
//! These tests require a running `PostgreSQL` instance.
//! Run with: `cargo test --test db_integration -- --ignored`
//!
//! Environment variables:
//!   `TEST_DB_HOST` (default: localhost)
//!   `TEST_DB_PORT` (default: 5433)
//!   `TEST_DB_USER` (default: `tally_test`)
//!   `TEST_DB_PASSWORD` (default: `tally_test`)
//!   `TEST_DB_NAME` (default: `tally_test`)

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use chrono::{Duration, Utc};
use sea_orm::Set;
use tally_db::entities::poll::PollState;
use tally_db::entities::{poll, poll_option};
use tally_db::repositories::{
    PollRepository, PollVoteRepository, VoteInsertion, VoteStatisticsRepository,
};
use tally_db::test_utils::{TestDatabase, TestDbConfig};

async fn seed_poll(repo: &PollRepository, id: &str, options: &[&str]) {
    let now = Utc::now();
    let poll = poll::ActiveModel {
        id: Set(id.to_string()),
        title: Set("Where should we eat?".to_string()),
        min_choices: Set(1),
        max_choices: Set(2),
        start_at: Set((now - Duration::minutes(5)).into()),
        end_at: Set((now + Duration::hours(1)).into()),
        state: Set(PollState::Scheduled),
        created_at: Set(now.into()),
        updated_at: Set(None),
    };
    let options = options
        .iter()
        .enumerate()
        .map(|(i, option_id)| poll_option::ActiveModel {
            id: Set((*option_id).to_string()),
            poll_id: Set(id.to_string()),
            title: Set(format!("Option {option_id}")),
            image_url: Set(None),
            sort_order: Set(i as i32),
        })
        .collect();

    repo.create_with_options(poll, options).await.unwrap();
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_create_and_transition_poll() {
    let db = TestDatabase::new().await.expect("Failed to connect");
    db.cleanup().await.unwrap();
    let conn = Arc::new(db.conn);
    let polls = PollRepository::new(conn);

    seed_poll(&polls, "poll_tr", &["tr_a", "tr_b"]).await;

    let options = polls.find_options("poll_tr").await.unwrap();
    assert_eq!(options.len(), 2);
    assert_eq!(options[0].sort_order, 0);

    let candidates = polls
        .find_by_state_and_window_contains(PollState::Scheduled, Utc::now())
        .await
        .unwrap();
    assert_eq!(candidates.len(), 1);

    let now = Utc::now();
    assert!(polls
        .transition_state("poll_tr", PollState::Scheduled, PollState::Published, now)
        .await
        .unwrap());
    // A second attempt from the same source state finds nothing to move.
    assert!(!polls
        .transition_state("poll_tr", PollState::Scheduled, PollState::Published, now)
        .await
        .unwrap());

    let stored = polls.find_by_id("poll_tr").await.unwrap().unwrap();
    assert_eq!(stored.state, PollState::Published);
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_concurrent_ballots_record_once() {
    let db = TestDatabase::new().await.expect("Failed to connect");
    db.cleanup().await.unwrap();
    let conn = Arc::new(db.conn);
    let polls = PollRepository::new(conn.clone());
    let votes = PollVoteRepository::new(conn);

    seed_poll(&polls, "poll_cc", &["cc_a", "cc_b"]).await;

    let attempts = (0..8).map(|i| {
        let votes = votes.clone();
        async move {
            votes
                .insert_if_absent(
                    &format!("vote_cc_{i}"),
                    "user1",
                    "poll_cc",
                    &["cc_a".to_string()],
                    Utc::now(),
                )
                .await
                .unwrap()
        }
    });
    let outcomes = futures::future::join_all(attempts).await;

    let recorded = outcomes
        .iter()
        .filter(|o| matches!(o, VoteInsertion::Recorded(_)))
        .count();
    assert_eq!(recorded, 1);
    assert!(votes.has_voted("user1", "poll_cc").await.unwrap());

    let counts = votes.count_by_option("poll_cc").await.unwrap();
    assert_eq!(counts.get("cc_a"), Some(&1));
    assert_eq!(counts.get("cc_b"), None);
}

#[tokio::test]
#[ignore = "requires running PostgreSQL instance"]
async fn test_statistics_upsert_replaces_row() {
    let db = TestDatabase::new().await.expect("Failed to connect");
    db.cleanup().await.unwrap();
    let conn = Arc::new(db.conn);
    let polls = PollRepository::new(conn.clone());
    let stats = VoteStatisticsRepository::new(conn);

    seed_poll(&polls, "poll_st", &["st_a", "st_b"]).await;

    stats.upsert("poll_st", "st_a", 1, Utc::now()).await.unwrap();
    stats.upsert("poll_st", "st_a", 5, Utc::now()).await.unwrap();

    let rows = stats.find_by_poll("poll_st").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].count, 5);
}

#[test]
fn test_config_from_env() {
    let config = TestDbConfig::default();
    assert!(!config.host.is_empty());
    assert!(config.port > 0);
    assert!(!config.username.is_empty());
    assert!(!config.database.is_empty());
}
