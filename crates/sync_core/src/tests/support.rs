use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use shared::{
    domain::{EventId, Priority, ProgressStatus, ProjectId, ProjectType, UserId},
    event::{Event, EventEnvelope, EventPayload, EventSource, ProgressLogged, ProjectCreated},
};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    channel::{Channel, ChannelError, Delivery},
    ledger::{
        CommitOutcome, DedupLedger, DedupRecord, DomainMutation, LocalStore, NewProgressSession,
        NewProject, SyncStateStore,
    },
};

pub(crate) const OWNER: UserId = UserId(42);

pub(crate) fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, day, 9, 0, 0).unwrap()
}

pub(crate) fn project_event(id: u128, title: &str) -> Event {
    Event {
        event_id: EventId(Uuid::from_u128(id)),
        origin_user_id: OWNER,
        timestamp: at(1),
        payload: EventPayload::ProjectCreated(ProjectCreated {
            title: title.to_string(),
            deadline: NaiveDate::from_ymd_opt(2026, 12, 31).unwrap(),
            priority: Priority::High,
            project_type: ProjectType::Personal,
            course_id: None,
            course_name: None,
            description: String::new(),
        }),
        source: EventSource::Chat,
    }
}

pub(crate) fn progress_event(id: u128, project: u128, progress: u8) -> Event {
    Event {
        event_id: EventId(Uuid::from_u128(id)),
        origin_user_id: OWNER,
        timestamp: at(2),
        payload: EventPayload::ProgressLogged(ProgressLogged {
            project_id: ProjectId(Uuid::from_u128(project)),
            status: ProgressStatus::InProgress,
            duration_minutes: 90,
            progress,
            note: "chapter 2".into(),
        }),
        source: EventSource::Chat,
    }
}

#[derive(Default)]
struct MemoryState {
    ledger: HashMap<EventId, DedupRecord>,
    projects: HashMap<ProjectId, (NewProject, Option<(ProgressStatus, u8)>)>,
    sessions: Vec<NewProgressSession>,
    sync: HashMap<EventSource, DateTime<Utc>>,
}

/// In-memory stand-in for the SQLite store with the same all-or-nothing
/// commit semantics.
#[derive(Default)]
pub(crate) struct MemoryStore {
    state: Mutex<MemoryState>,
    pub(crate) fail_commits: AtomicBool,
    pub(crate) fail_sync_reads: AtomicBool,
}

impl MemoryStore {
    pub(crate) fn ledger_len(&self) -> usize {
        self.state.lock().unwrap().ledger.len()
    }

    pub(crate) fn project_count(&self) -> usize {
        self.state.lock().unwrap().projects.len()
    }

    pub(crate) fn project_title(&self, id: u128) -> Option<String> {
        let state = self.state.lock().unwrap();
        state
            .projects
            .get(&ProjectId(Uuid::from_u128(id)))
            .map(|(project, _)| project.details.title.clone())
    }

    pub(crate) fn project_progress(&self, id: u128) -> Option<(ProgressStatus, u8)> {
        let state = self.state.lock().unwrap();
        state
            .projects
            .get(&ProjectId(Uuid::from_u128(id)))
            .and_then(|(_, progress)| *progress)
    }

    pub(crate) fn session_count(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    pub(crate) fn set_last_sync(&self, channel: EventSource, at: DateTime<Utc>) {
        self.state.lock().unwrap().sync.insert(channel, at);
    }

    pub(crate) fn last_sync(&self, channel: EventSource) -> Option<DateTime<Utc>> {
        self.state.lock().unwrap().sync.get(&channel).copied()
    }
}

#[async_trait]
impl DedupLedger for MemoryStore {
    async fn applied_record(&self, event_id: EventId) -> Result<Option<DedupRecord>> {
        Ok(self.state.lock().unwrap().ledger.get(&event_id).cloned())
    }
}

#[async_trait]
impl LocalStore for MemoryStore {
    async fn commit_once(
        &self,
        record: &DedupRecord,
        mutation: &DomainMutation,
    ) -> Result<CommitOutcome> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(anyhow!("disk I/O error"));
        }
        let mut state = self.state.lock().unwrap();
        if state.ledger.contains_key(&record.event_id) {
            return Ok(CommitOutcome::AlreadyApplied);
        }
        match mutation {
            DomainMutation::UpsertProject(project) => {
                state
                    .projects
                    .insert(project.project_id, (project.clone(), None));
            }
            DomainMutation::RecordProgress(session) => {
                let Some((_, progress)) = state.projects.get_mut(&session.details.project_id)
                else {
                    return Err(anyhow!("project {} not found", session.details.project_id));
                };
                *progress = Some((session.details.status, session.details.progress));
                state.sessions.push(session.clone());
            }
        }
        state.ledger.insert(record.event_id, record.clone());
        Ok(CommitOutcome::Committed)
    }
}

#[async_trait]
impl SyncStateStore for MemoryStore {
    async fn last_successful_sync(&self, channel: EventSource) -> Result<Option<DateTime<Utc>>> {
        if self.fail_sync_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("database is locked"));
        }
        Ok(self.last_sync(channel))
    }

    async fn record_successful_sync(&self, channel: EventSource, at: DateTime<Utc>) -> Result<()> {
        self.set_last_sync(channel, at);
        Ok(())
    }
}

/// Channel that replays a fixed set of envelopes, or fails every pass.
pub(crate) struct FixedChannel {
    source: EventSource,
    envelopes: Vec<EventEnvelope>,
    pub(crate) fail: AtomicBool,
    pub(crate) passes: AtomicUsize,
    pub(crate) delivered: Mutex<Vec<Event>>,
}

impl FixedChannel {
    pub(crate) fn new(source: EventSource, envelopes: Vec<EventEnvelope>) -> Self {
        Self {
            source,
            envelopes,
            fail: AtomicBool::new(false),
            passes: AtomicUsize::new(0),
            delivered: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Channel for FixedChannel {
    fn source(&self) -> EventSource {
        self.source
    }

    async fn deliver(&self, _user_id: UserId, event: &Event) -> Result<(), ChannelError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChannelError::InvalidEndpoint("offline".into()));
        }
        self.delivered.lock().unwrap().push(event.clone());
        Ok(())
    }

    async fn receive(
        &self,
        _user_id: UserId,
        sink: &mpsc::Sender<Delivery>,
    ) -> Result<usize, ChannelError> {
        self.passes.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(ChannelError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "cloud folder unreadable",
            )));
        }
        for envelope in &self.envelopes {
            crate::channel::forward(sink, envelope.clone(), self.source).await?;
        }
        Ok(self.envelopes.len())
    }
}
