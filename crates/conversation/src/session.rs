use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use shared::domain::UserId;

pub mod fields {
    pub const DEADLINE: &str = "deadline";
    pub const TITLE: &str = "title";
    pub const TYPE: &str = "type";
    pub const COURSE_ID: &str = "courseId";
    pub const COURSE_NAME: &str = "courseName";
    pub const PRIORITY: &str = "priority";
    pub const DESCRIPTION: &str = "description";
    pub const PROJECT_ID: &str = "projectId";
    pub const PROJECT_TITLE: &str = "projectTitle";
    pub const STATUS: &str = "status";
    pub const DURATION_MINUTES: &str = "durationMinutes";
    pub const PROGRESS: &str = "progress";
    pub const NOTE: &str = "note";
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Date(NaiveDate),
    Integer(i64),
    Null,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollectedFields(BTreeMap<&'static str, FieldValue>);

impl CollectedFields {
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name)
    }

    pub fn insert(&mut self, name: &'static str, value: FieldValue) {
        self.0.insert(name, value);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &FieldValue)> {
        self.0.iter().map(|(name, value)| (*name, value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flow {
    ProjectCreation,
    ProgressLogging,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProjectStep {
    AwaitingDeadline,
    AwaitingTitle,
    AwaitingType,
    AwaitingCourse,
    AwaitingPriority,
    AwaitingNote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProgressStep {
    AwaitingStatus,
    AwaitingDuration,
    AwaitingProgress,
    AwaitingNote,
}

/// The step a session is waiting on. The outer variant names the flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStep {
    Project(ProjectStep),
    Progress(ProgressStep),
}

impl SessionStep {
    pub fn flow(self) -> Flow {
        match self {
            SessionStep::Project(_) => Flow::ProjectCreation,
            SessionStep::Progress(_) => Flow::ProgressLogging,
        }
    }

    pub fn entry(flow: Flow) -> Self {
        match flow {
            Flow::ProjectCreation => SessionStep::Project(ProjectStep::AwaitingDeadline),
            Flow::ProgressLogging => SessionStep::Progress(ProgressStep::AwaitingStatus),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub user_id: UserId,
    pub current_step: SessionStep,
    pub collected_fields: CollectedFields,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn start(user_id: UserId, flow: Flow, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            current_step: SessionStep::entry(flow),
            collected_fields: CollectedFields::default(),
            started_at: now,
            updated_at: now,
        }
    }

    pub fn flow(&self) -> Flow {
        self.current_step.flow()
    }
}

/// In-flight conversations, at most one per user.
///
/// Without a TTL a session lives until its flow completes, is cancelled or is
/// replaced by a new flow. With a TTL, a session whose last update is older
/// than the TTL is treated as absent and dropped on access.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: HashMap<UserId, SessionState>,
    ttl: Option<Duration>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            sessions: HashMap::new(),
            ttl: Some(ttl),
        }
    }

    pub fn ttl(&self) -> Option<Duration> {
        self.ttl
    }

    pub fn get(&mut self, user_id: UserId, now: DateTime<Utc>) -> Option<&SessionState> {
        let expired = self
            .sessions
            .get(&user_id)
            .is_some_and(|session| self.is_expired(session, now));
        if expired {
            self.sessions.remove(&user_id);
            return None;
        }
        self.sessions.get(&user_id)
    }

    /// Stores `state` as the user's session, replacing any previous one whole.
    pub fn put(&mut self, state: SessionState) -> Option<SessionState> {
        self.sessions.insert(state.user_id, state)
    }

    pub fn remove(&mut self, user_id: UserId) -> Option<SessionState> {
        self.sessions.remove(&user_id)
    }

    pub fn evict_expired(&mut self, now: DateTime<Utc>) -> usize {
        let Some(ttl) = self.ttl else {
            return 0;
        };
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| now.signed_duration_since(session.updated_at) <= ttl);
        before - self.sessions.len()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    fn is_expired(&self, session: &SessionState, now: DateTime<Utc>) -> bool {
        self.ttl
            .is_some_and(|ttl| now.signed_duration_since(session.updated_at) > ttl)
    }
}

#[cfg(test)]
#[path = "tests/session_tests.rs"]
mod tests;
