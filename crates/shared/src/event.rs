use std::fmt;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::domain::{EventId, Priority, ProgressStatus, ProjectId, ProjectType, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "project.created")]
    ProjectCreated,
    #[serde(rename = "progress.logged")]
    ProgressLogged,
}

impl EventType {
    pub fn as_str(self) -> &'static str {
        match self {
            EventType::ProjectCreated => "project.created",
            EventType::ProgressLogged => "progress.logged",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "project.created" => Some(EventType::ProjectCreated),
            "progress.logged" => Some(EventType::ProgressLogged),
            _ => None,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which producer or channel an event (or a delivery of it) came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    Chat,
    Push,
    Reconciliation,
}

impl EventSource {
    pub fn as_str(self) -> &'static str {
        match self {
            EventSource::Chat => "chat",
            EventSource::Push => "push",
            EventSource::Reconciliation => "reconciliation",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "chat" => Some(EventSource::Chat),
            "push" => Some(EventSource::Push),
            "reconciliation" => Some(EventSource::Reconciliation),
            _ => None,
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProjectCreated {
    pub title: String,
    pub deadline: NaiveDate,
    pub priority: Priority,
    #[serde(rename = "type")]
    pub project_type: ProjectType,
    /// Always present on the wire; `null` when the project has no course.
    #[serde(deserialize_with = "Option::deserialize")]
    pub course_id: Option<String>,
    #[serde(deserialize_with = "Option::deserialize")]
    pub course_name: Option<String>,
    pub description: String,
}

/// Longest single work session a progress log may record.
pub const MAX_DURATION_MINUTES: u32 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ProgressLogged {
    pub project_id: ProjectId,
    pub status: ProgressStatus,
    pub duration_minutes: u32,
    pub progress: u8,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    ProjectCreated(ProjectCreated),
    ProgressLogged(ProgressLogged),
}

impl EventPayload {
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::ProjectCreated(_) => EventType::ProjectCreated,
            EventPayload::ProgressLogged(_) => EventType::ProgressLogged,
        }
    }

    pub fn to_json(&self) -> Value {
        let optional = |value: &Option<String>| value.clone().map_or(Value::Null, Value::String);
        let fields: Map<String, Value> = match self {
            EventPayload::ProjectCreated(project) => [
                ("title", Value::String(project.title.clone())),
                ("deadline", Value::String(project.deadline.format("%Y-%m-%d").to_string())),
                ("priority", Value::from(project.priority.as_str())),
                ("type", Value::from(project.project_type.as_str())),
                ("courseId", optional(&project.course_id)),
                ("courseName", optional(&project.course_name)),
                ("description", Value::String(project.description.clone())),
            ]
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
            EventPayload::ProgressLogged(progress) => [
                ("projectId", Value::String(progress.project_id.to_string())),
                ("status", Value::from(progress.status.as_str())),
                ("durationMinutes", Value::from(progress.duration_minutes)),
                ("progress", Value::from(progress.progress)),
                ("note", Value::String(progress.note.clone())),
            ]
            .into_iter()
            .map(|(key, value)| (key.to_string(), value))
            .collect(),
        };
        Value::Object(fields)
    }

    pub fn from_json(event_type: &str, payload: Value) -> Result<Self, EventDecodeError> {
        let kind = EventType::parse(event_type)
            .ok_or_else(|| EventDecodeError::UnknownType(event_type.to_string()))?;
        let malformed = |source| EventDecodeError::MalformedPayload {
            event_type: kind.as_str(),
            source,
        };
        match kind {
            EventType::ProjectCreated => serde_json::from_value(payload)
                .map(EventPayload::ProjectCreated)
                .map_err(malformed),
            EventType::ProgressLogged => serde_json::from_value(payload)
                .map(EventPayload::ProgressLogged)
                .map_err(malformed),
        }
    }
}

#[derive(Debug, Error)]
pub enum EventDecodeError {
    #[error("unknown event type '{0}'")]
    UnknownType(String),
    #[error("malformed {event_type} payload: {source}")]
    MalformedPayload {
        event_type: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Wire form of an event. The payload stays raw JSON so that unknown or
/// malformed events can still be carried, logged and rejected by id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventEnvelope {
    pub event_id: EventId,
    pub event_type: String,
    pub origin_user_id: UserId,
    pub timestamp: DateTime<Utc>,
    pub payload: Value,
    pub source: EventSource,
}

impl EventEnvelope {
    pub fn payload_hash(&self) -> String {
        payload_hash(&self.payload)
    }
}

/// Base64 SHA-256 of the payload's canonical JSON (object keys sorted).
pub fn payload_hash(payload: &Value) -> String {
    STANDARD.encode(Sha256::digest(payload.to_string().as_bytes()))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "EventEnvelope", into = "EventEnvelope")]
pub struct Event {
    pub event_id: EventId,
    pub origin_user_id: UserId,
    pub timestamp: DateTime<Utc>,
    pub payload: EventPayload,
    pub source: EventSource,
}

impl Event {
    pub fn event_type(&self) -> EventType {
        self.payload.event_type()
    }

    pub fn to_envelope(&self) -> EventEnvelope {
        EventEnvelope {
            event_id: self.event_id,
            event_type: self.event_type().as_str().to_string(),
            origin_user_id: self.origin_user_id,
            timestamp: self.timestamp,
            payload: self.payload.to_json(),
            source: self.source,
        }
    }

    pub fn payload_hash(&self) -> String {
        payload_hash(&self.payload.to_json())
    }
}

impl TryFrom<EventEnvelope> for Event {
    type Error = EventDecodeError;

    fn try_from(envelope: EventEnvelope) -> Result<Self, Self::Error> {
        let payload = EventPayload::from_json(&envelope.event_type, envelope.payload)?;
        Ok(Self {
            event_id: envelope.event_id,
            origin_user_id: envelope.origin_user_id,
            timestamp: envelope.timestamp,
            payload,
            source: envelope.source,
        })
    }
}

impl From<Event> for EventEnvelope {
    fn from(event: Event) -> Self {
        event.to_envelope()
    }
}

#[cfg(test)]
#[path = "tests/event_tests.rs"]
mod tests;
