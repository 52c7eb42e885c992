use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use shared::{
    domain::UserId,
    event::{Event, EventSource},
    protocol::{push_socket_route, user_events_path, DeliverResponse, PushFrame},
};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use url::Url;

use crate::channel::{forward, Channel, ChannelError, Delivery};

/// Low-latency channel through the relay. Delivery is a single HTTP POST;
/// receiving holds a websocket open until the relay closes it.
#[derive(Clone)]
pub struct PushChannel {
    http: Client,
    relay_url: String,
}

impl PushChannel {
    pub fn new(relay_url: &str) -> Result<Self, ChannelError> {
        Self::with_client(Client::new(), relay_url)
    }

    pub fn with_client(http: Client, relay_url: &str) -> Result<Self, ChannelError> {
        let parsed =
            Url::parse(relay_url).map_err(|_| ChannelError::InvalidEndpoint(relay_url.into()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ChannelError::InvalidEndpoint(relay_url.into()));
        }
        Ok(Self {
            http,
            relay_url: relay_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn relay_url(&self) -> &str {
        &self.relay_url
    }

    pub fn socket_url(&self, user_id: UserId) -> String {
        let ws_base = if let Some(rest) = self.relay_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else {
            self.relay_url.replacen("http://", "ws://", 1)
        };
        format!("{ws_base}{}?user_id={}", push_socket_route(), user_id.0)
    }
}

#[async_trait]
impl Channel for PushChannel {
    fn source(&self) -> EventSource {
        EventSource::Push
    }

    async fn deliver(&self, user_id: UserId, event: &Event) -> Result<(), ChannelError> {
        let response: DeliverResponse = self
            .http
            .post(format!("{}{}", self.relay_url, user_events_path(user_id)))
            .json(&event.to_envelope())
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(
            event_id = %event.event_id,
            user_id = user_id.0,
            subscribers = response.subscribers,
            "push: relay accepted event"
        );
        Ok(())
    }

    async fn receive(
        &self,
        user_id: UserId,
        sink: &mpsc::Sender<Delivery>,
    ) -> Result<usize, ChannelError> {
        let ws_url = self.socket_url(user_id);
        let (ws_stream, _) = connect_async(&ws_url).await?;
        info!(user_id = user_id.0, "push: subscribed to relay");
        let (_, mut ws_reader) = ws_stream.split();

        let mut forwarded = 0;
        while let Some(msg) = ws_reader.next().await {
            match msg? {
                Message::Text(text) => match serde_json::from_str::<PushFrame>(&text) {
                    Ok(PushFrame::Event(envelope)) => {
                        forward(sink, envelope, EventSource::Push).await?;
                        forwarded += 1;
                    }
                    Ok(PushFrame::Lagged { skipped }) => warn!(
                        user_id = user_id.0,
                        skipped,
                        "push: relay dropped events for this subscriber, reconciliation will recover them"
                    ),
                    Ok(PushFrame::Error(err)) => warn!(
                        user_id = user_id.0,
                        code = ?err.code,
                        message = %err.message,
                        "push: relay reported an error"
                    ),
                    Err(err) => warn!(
                        user_id = user_id.0,
                        %err,
                        "push: dropping unparseable frame"
                    ),
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
        info!(user_id = user_id.0, forwarded, "push: relay connection closed");
        Ok(forwarded)
    }
}

#[cfg(test)]
#[path = "tests/push_tests.rs"]
mod tests;
