use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use shared::{
    domain::{EventId, ProjectId, UserId},
    event::{Event, EventPayload, EventSource, EventType, ProgressLogged, ProjectCreated},
};

/// Proof that an event was applied. One per event id, ever.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupRecord {
    pub event_id: EventId,
    pub event_type: EventType,
    pub applied_at: DateTime<Utc>,
    /// The channel that delivered the copy that won.
    pub source: EventSource,
    pub payload_hash: String,
}

impl DedupRecord {
    pub fn for_event(event: &Event, via: EventSource, applied_at: DateTime<Utc>) -> Self {
        Self {
            event_id: event.event_id,
            event_type: event.event_type(),
            applied_at,
            source: via,
            payload_hash: event.payload_hash(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProject {
    pub project_id: ProjectId,
    pub owner_user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub details: ProjectCreated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProgressSession {
    pub session_id: EventId,
    pub user_id: UserId,
    pub logged_at: DateTime<Utc>,
    pub details: ProgressLogged,
}

/// The local-store change an event stands for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainMutation {
    /// Create the project, or replace it whole if a row with its id exists.
    UpsertProject(NewProject),
    /// Insert the session and overwrite the project's status and progress.
    /// Fails when the project is not in the store yet.
    RecordProgress(NewProgressSession),
}

impl DomainMutation {
    pub fn from_event(event: &Event) -> Self {
        match &event.payload {
            EventPayload::ProjectCreated(details) => DomainMutation::UpsertProject(NewProject {
                project_id: ProjectId::from(event.event_id),
                owner_user_id: event.origin_user_id,
                created_at: event.timestamp,
                details: details.clone(),
            }),
            EventPayload::ProgressLogged(details) => {
                DomainMutation::RecordProgress(NewProgressSession {
                    session_id: event.event_id,
                    user_id: event.origin_user_id,
                    logged_at: event.timestamp,
                    details: details.clone(),
                })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed,
    /// Another delivery claimed the ledger row first; nothing was written.
    AlreadyApplied,
}

#[async_trait]
pub trait DedupLedger: Send + Sync {
    async fn applied_record(&self, event_id: EventId) -> Result<Option<DedupRecord>>;

    async fn has_applied(&self, event_id: EventId) -> Result<bool> {
        Ok(self.applied_record(event_id).await?.is_some())
    }
}

#[async_trait]
pub trait LocalStore: DedupLedger {
    /// Claims `record` in the ledger and applies `mutation` in one
    /// transaction. Either both are durable afterwards or neither is.
    async fn commit_once(
        &self,
        record: &DedupRecord,
        mutation: &DomainMutation,
    ) -> Result<CommitOutcome>;
}

#[async_trait]
pub trait SyncStateStore: Send + Sync {
    async fn last_successful_sync(&self, channel: EventSource) -> Result<Option<DateTime<Utc>>>;
    async fn record_successful_sync(&self, channel: EventSource, at: DateTime<Utc>) -> Result<()>;
}
