//! Poll event publisher.
//!
//! Provides an abstraction for announcing lifecycle transitions.
//! The Redis implementation lives in the queue crate.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tally_common::AppResult;

/// Lifecycle events announced to the messaging collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PollEvent {
    /// A poll opened for voting.
    #[serde(rename_all = "camelCase")]
    Published { poll_id: String, title: String },
    /// A poll's voting window closed.
    #[serde(rename_all = "camelCase")]
    Retired { poll_id: String },
}

impl PollEvent {
    /// ID of the poll the event is about.
    #[must_use]
    pub fn poll_id(&self) -> &str {
        match self {
            Self::Published { poll_id, .. } | Self::Retired { poll_id } => poll_id,
        }
    }
}

/// Trait for publishing poll lifecycle events.
#[async_trait]
pub trait PollEventPublisher: Send + Sync {
    /// Deliver one event.
    async fn publish(&self, event: &PollEvent) -> AppResult<()>;
}

/// A no-op implementation for tests or when notifications are disabled.
#[derive(Clone, Default)]
pub struct NoOpPollEventPublisher;

#[async_trait]
impl PollEventPublisher for NoOpPollEventPublisher {
    async fn publish(&self, _event: &PollEvent) -> AppResult<()> {
        Ok(())
    }
}

/// Shared handle to a poll event publisher.
pub type PollEventPublisherService = Arc<dyn PollEventPublisher>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_wire_format() {
        let event = PollEvent::Published {
            poll_id: "p1".to_string(),
            title: "Lunch".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap_or_default();

        assert_eq!(json["type"], "published");
        assert_eq!(json["pollId"], "p1");
        assert_eq!(event.poll_id(), "p1");
    }
}
