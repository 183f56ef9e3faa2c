//! Poll services.

#![allow(missing_docs)]

pub mod event_publisher;
pub mod lifecycle;
pub mod poll;
pub mod statistics;
pub mod voting;

pub use event_publisher::{
    NoOpPollEventPublisher, PollEvent, PollEventPublisher, PollEventPublisherService,
};
pub use lifecycle::{LifecycleReport, LifecycleService, PassReport};
pub use poll::{CreatePollInput, CreatePollOptionInput, PollService};
pub use statistics::{OptionTally, PollStatisticsSnapshot, StatisticsAggregator};
pub use voting::{VoteError, VotingService};
