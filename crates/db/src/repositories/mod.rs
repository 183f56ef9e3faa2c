//! Database repositories.

mod poll;
mod poll_vote;
mod vote_statistics;

pub use poll::PollRepository;
pub use poll_vote::{PollVoteRepository, VoteInsertion};
pub use vote_statistics::VoteStatisticsRepository;
