use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    domain::UserId,
    event::{Event, EventEnvelope, EventSource},
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One copy of an event as handed over by a channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub envelope: EventEnvelope,
    pub via: EventSource,
    pub received_at: DateTime<Utc>,
}

impl Delivery {
    pub fn new(envelope: EventEnvelope, via: EventSource) -> Self {
        Self {
            envelope,
            via,
            received_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid endpoint '{0}'")]
    InvalidEndpoint(String),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("websocket failed: {0}")]
    Socket(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("cloud store i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not encode event: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("delivery queue is closed")]
    QueueClosed,
}

/// A transport that can carry events from the conversational side to the
/// primary device.
#[async_trait]
pub trait Channel: Send + Sync {
    fn source(&self) -> EventSource;

    /// Hands the event to the transport. Returns once the transport accepted
    /// it; there is no end-to-end acknowledgement.
    async fn deliver(&self, user_id: UserId, event: &Event) -> Result<(), ChannelError>;

    /// Forwards events addressed to `user_id` into `sink`. Returns how many
    /// were forwarded once the transport is exhausted or closed.
    async fn receive(
        &self,
        user_id: UserId,
        sink: &mpsc::Sender<Delivery>,
    ) -> Result<usize, ChannelError>;
}

pub(crate) async fn forward(
    sink: &mpsc::Sender<Delivery>,
    envelope: EventEnvelope,
    via: EventSource,
) -> Result<(), ChannelError> {
    sink.send(Delivery::new(envelope, via))
        .await
        .map_err(|_| ChannelError::QueueClosed)
}

/// Sends every event through all configured channels.
#[derive(Clone, Default)]
pub struct Broadcaster {
    channels: Vec<Arc<dyn Channel>>,
}

impl Broadcaster {
    pub fn new(channels: Vec<Arc<dyn Channel>>) -> Self {
        Self { channels }
    }

    pub fn with_channel(mut self, channel: Arc<dyn Channel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Returns the number of channels that accepted the event. A failing
    /// channel does not stop the others.
    pub async fn broadcast(&self, user_id: UserId, event: &Event) -> usize {
        let mut accepted = 0;
        for channel in &self.channels {
            match channel.deliver(user_id, event).await {
                Ok(()) => {
                    accepted += 1;
                    debug!(
                        event_id = %event.event_id,
                        channel = %channel.source(),
                        "sync: event handed to channel"
                    );
                }
                Err(err) => warn!(
                    event_id = %event.event_id,
                    channel = %channel.source(),
                    %err,
                    "sync: channel delivery failed"
                ),
            }
        }
        accepted
    }
}

#[cfg(test)]
#[path = "tests/channel_tests.rs"]
mod tests;
