//! Background work for tally.
//!
//! - **Scheduler**: periodic lifecycle and statistics passes with a
//!   single-flight guard per task
//! - **Executor**: binds the scheduler to the core poll services
//! - **Pub/Sub**: Redis delivery of poll lifecycle events

pub mod executor;
pub mod pubsub;
pub mod scheduler;

pub use executor::PollJobExecutor;
pub use pubsub::{PollEventSubscription, RedisPollEventPublisher, poll_events_channel};
pub use scheduler::{
    JobError, JobExecutor, JobResult, RunGuard, ScheduledJob, SchedulerConfig, SchedulerHandle,
    SchedulerState, TaskState, TaskStatus, run_scheduler,
};
