use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use async_trait::async_trait;
use shared::{
    domain::UserId,
    event::{Event, EventEnvelope, EventSource},
};
use tokio::{fs, sync::mpsc};
use tracing::{debug, warn};

use crate::channel::{forward, Channel, ChannelError, Delivery};

/// Durable per-user event storage the reconciliation channel reads back in
/// full on every pass.
#[async_trait]
pub trait CloudStore: Send + Sync {
    async fn put(&self, user_id: UserId, envelope: &EventEnvelope) -> Result<(), ChannelError>;

    /// Every stored event for the user, oldest first.
    async fn list(&self, user_id: UserId) -> Result<Vec<EventEnvelope>, ChannelError>;
}

/// Stores one JSON file per event at `<root>/<user_id>/<event_id>.json`.
#[derive(Debug, Clone)]
pub struct DirCloudStore {
    root: PathBuf,
}

impl DirCloudStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_dir(&self, user_id: UserId) -> PathBuf {
        self.root.join(user_id.0.to_string())
    }
}

#[async_trait]
impl CloudStore for DirCloudStore {
    async fn put(&self, user_id: UserId, envelope: &EventEnvelope) -> Result<(), ChannelError> {
        let dir = self.user_dir(user_id);
        fs::create_dir_all(&dir).await?;
        let body = serde_json::to_vec_pretty(envelope)?;
        let final_path = dir.join(format!("{}.json", envelope.event_id));
        let tmp_path = dir.join(format!("{}.json.tmp", envelope.event_id));
        fs::write(&tmp_path, body).await?;
        fs::rename(&tmp_path, &final_path).await?;
        Ok(())
    }

    async fn list(&self, user_id: UserId) -> Result<Vec<EventEnvelope>, ChannelError> {
        let dir = self.user_dir(user_id);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                fs::metadata(&self.root).await?;
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        let mut envelopes = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            let raw = match fs::read(&path).await {
                Ok(raw) => raw,
                Err(err) => {
                    warn!(path = %path.display(), %err, "reconciliation: skipping unreadable file");
                    continue;
                }
            };
            match serde_json::from_slice::<EventEnvelope>(&raw) {
                Ok(envelope) => envelopes.push(envelope),
                Err(err) => {
                    warn!(path = %path.display(), %err, "reconciliation: skipping malformed file");
                }
            }
        }
        envelopes.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });
        Ok(envelopes)
    }
}

/// High-latency channel that replays everything the cloud store holds.
#[derive(Clone)]
pub struct ReconciliationChannel {
    store: Arc<dyn CloudStore>,
}

impl ReconciliationChannel {
    pub fn new(store: Arc<dyn CloudStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Channel for ReconciliationChannel {
    fn source(&self) -> EventSource {
        EventSource::Reconciliation
    }

    async fn deliver(&self, user_id: UserId, event: &Event) -> Result<(), ChannelError> {
        self.store.put(user_id, &event.to_envelope()).await
    }

    /// One full pass over the user's stored events.
    async fn receive(
        &self,
        user_id: UserId,
        sink: &mpsc::Sender<Delivery>,
    ) -> Result<usize, ChannelError> {
        let envelopes = self.store.list(user_id).await?;
        let total = envelopes.len();
        for envelope in envelopes {
            forward(sink, envelope, EventSource::Reconciliation).await?;
        }
        debug!(user_id = user_id.0, forwarded = total, "reconciliation: pass forwarded events");
        Ok(total)
    }
}

#[cfg(test)]
#[path = "tests/reconciliation_tests.rs"]
mod tests;
