use serde::{Deserialize, Serialize};

use crate::{domain::UserId, error::ApiError, event::EventEnvelope};

pub fn user_events_route() -> &'static str {
    "/users/:user_id/events"
}

pub fn user_events_path(user_id: UserId) -> String {
    format!("/users/{}/events", user_id.0)
}

pub fn push_socket_route() -> &'static str {
    "/ws"
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverResponse {
    pub subscribers: usize,
}

/// Frames the relay writes to a push subscriber's websocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum PushFrame {
    Event(EventEnvelope),
    Lagged { skipped: u64 },
    Error(ApiError),
}
