//! Poll lifecycle, voting and statistics for tally.
//!
//! Services depend on storage only through [`store::PollStore`], so the same
//! logic runs against Postgres in production and [`store::MemoryPollStore`]
//! in tests.

pub mod services;
pub mod store;

pub use services::*;
pub use store::*;
