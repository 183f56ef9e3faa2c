//! Redis Pub/Sub delivery of poll lifecycle events.
//!
//! Events are JSON-encoded [`PollEvent`]s published on
//! `{prefix}:poll-events`. Any number of processes may listen.

use async_trait::async_trait;
use fred::clients::{Client, SubscriberClient};
use fred::error::{Error as RedisError, ErrorKind as RedisErrorKind};
use fred::interfaces::{ClientLike, EventInterface, PubsubInterface};
use fred::types::config::Config as RedisConfig;
use tally_common::{AppError, AppResult};
use tally_core::services::{PollEvent, PollEventPublisher};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Channel suffix for poll lifecycle events.
pub const POLL_EVENTS_CHANNEL: &str = "poll-events";

/// Full channel name for a key prefix.
#[must_use]
pub fn poll_events_channel(prefix: &str) -> String {
    format!("{prefix}:{POLL_EVENTS_CHANNEL}")
}

/// Publishes poll lifecycle events to Redis.
#[derive(Clone)]
pub struct RedisPollEventPublisher {
    publisher: Client,
    config: RedisConfig,
    channel: String,
}

impl RedisPollEventPublisher {
    /// Connect to Redis.
    pub async fn new(redis_url: &str, prefix: &str) -> Result<Self, RedisError> {
        let config = RedisConfig::from_url(redis_url)?;

        let publisher = Client::new(config.clone(), None, None, None);
        publisher.init().await?;

        let channel = poll_events_channel(prefix);
        info!(channel = %channel, "Redis poll event publisher initialized");

        Ok(Self {
            publisher,
            config,
            channel,
        })
    }

    /// Channel this publisher writes to.
    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Publish one event.
    pub async fn publish_event(&self, event: &PollEvent) -> Result<(), RedisError> {
        let payload = serde_json::to_string(event).map_err(|e| {
            RedisError::new(
                RedisErrorKind::InvalidArgument,
                format!("Serialization error: {e}"),
            )
        })?;
        let _: () = self.publisher.publish(self.channel.as_str(), payload).await?;
        debug!(channel = %self.channel, ?event, "Published poll event");
        Ok(())
    }

    /// Subscribe to the event channel on a dedicated connection.
    ///
    /// Messages that fail to decode are logged and dropped.
    pub async fn subscribe(&self) -> Result<PollEventSubscription, RedisError> {
        let subscriber = SubscriberClient::new(self.config.clone(), None, None, None);
        subscriber.init().await?;
        subscriber.subscribe(self.channel.as_str()).await?;

        let (local_tx, local_rx) = broadcast::channel(256);
        let mut message_stream = subscriber.message_rx();

        tokio::spawn(async move {
            while let Ok(message) = message_stream.recv().await {
                if let Some(payload) = message.value.as_string() {
                    match serde_json::from_str::<PollEvent>(&payload) {
                        Ok(event) => {
                            if local_tx.send(event).is_err() {
                                debug!("No local listeners for poll event");
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to parse poll event");
                        }
                    }
                }
            }
            info!("Poll event stream ended");
        });

        Ok(PollEventSubscription {
            subscriber,
            receiver: local_rx,
        })
    }

    /// Close the publisher connection.
    pub async fn shutdown(&self) -> Result<(), RedisError> {
        self.publisher.quit().await?;
        info!("Redis poll event publisher shutdown");
        Ok(())
    }
}

#[async_trait]
impl PollEventPublisher for RedisPollEventPublisher {
    async fn publish(&self, event: &PollEvent) -> AppResult<()> {
        self.publish_event(event)
            .await
            .map_err(|e| AppError::Redis(e.to_string()))
    }
}

/// Live subscription to poll events.
pub struct PollEventSubscription {
    subscriber: SubscriberClient,
    receiver: broadcast::Receiver<PollEvent>,
}

impl PollEventSubscription {
    /// Wait for the next event. `None` once the stream has closed.
    pub async fn next(&mut self) -> Option<PollEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Poll event listener lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Unsubscribe and close the connection.
    pub async fn close(self) -> Result<(), RedisError> {
        self.subscriber.quit().await?;
        Ok(())
    }
}
