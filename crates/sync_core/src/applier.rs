use std::sync::Arc;

use chrono::{DateTime, Utc};
use shared::event::{
    Event, EventDecodeError, EventEnvelope, EventPayload, EventSource, MAX_DURATION_MINUTES,
};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::{
    channel::Delivery,
    ledger::{CommitOutcome, DedupRecord, DomainMutation, LocalStore},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Duplicate,
}

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("undecodable event: {0}")]
    Decode(#[from] EventDecodeError),
    #[error("invalid event: {0}")]
    Invalid(String),
    #[error("local store failure: {0:#}")]
    Store(anyhow::Error),
}

#[derive(Debug)]
pub enum ApplyOutcome {
    Applied,
    Skipped(SkipReason),
    /// Nothing was written; a later delivery of the same event may succeed.
    Failed(ApplyError),
}

impl ApplyOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, ApplyOutcome::Applied)
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, ApplyOutcome::Skipped(SkipReason::Duplicate))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplierStats {
    pub applied: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl ApplierStats {
    fn record(&mut self, outcome: &ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied => self.applied += 1,
            ApplyOutcome::Skipped(_) => self.skipped += 1,
            ApplyOutcome::Failed(_) => self.failed += 1,
        }
    }
}

/// Applies each event to the local store at most once, whichever channel it
/// arrives through and however often.
pub struct EventApplier<S: ?Sized> {
    store: Arc<S>,
}

impl<S: ?Sized> Clone for EventApplier<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S> EventApplier<S>
where
    S: LocalStore + ?Sized,
{
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Decodes a wire envelope and applies it. Unknown types and malformed
    /// payloads fail without touching the store.
    pub async fn apply_envelope(&self, envelope: EventEnvelope, via: EventSource) -> ApplyOutcome {
        let event_id = envelope.event_id;
        let event_type = envelope.event_type.clone();
        match Event::try_from(envelope) {
            Ok(event) => self.apply(&event, via).await,
            Err(err) => {
                warn!(
                    %event_id,
                    %event_type,
                    %via,
                    %err,
                    "applier: rejecting undecodable event"
                );
                ApplyOutcome::Failed(ApplyError::Decode(err))
            }
        }
    }

    pub async fn apply(&self, event: &Event, via: EventSource) -> ApplyOutcome {
        self.apply_at(event, via, Utc::now()).await
    }

    pub async fn apply_at(
        &self,
        event: &Event,
        via: EventSource,
        now: DateTime<Utc>,
    ) -> ApplyOutcome {
        if let Err(reason) = check_semantics(event) {
            warn!(
                event_id = %event.event_id,
                event_type = %event.event_type(),
                %via,
                %reason,
                "applier: rejecting invalid event"
            );
            return ApplyOutcome::Failed(ApplyError::Invalid(reason));
        }

        let record = DedupRecord::for_event(event, via, now);
        let mutation = DomainMutation::from_event(event);

        match self.store.commit_once(&record, &mutation).await {
            Ok(CommitOutcome::Committed) => {
                info!(
                    event_id = %event.event_id,
                    event_type = %event.event_type(),
                    user_id = event.origin_user_id.0,
                    %via,
                    "applier: applied event"
                );
                ApplyOutcome::Applied
            }
            Ok(CommitOutcome::AlreadyApplied) => {
                self.note_duplicate(&record).await;
                ApplyOutcome::Skipped(SkipReason::Duplicate)
            }
            Err(err) => self.recover_from_store_error(&record, err).await,
        }
    }

    /// A failed transaction may have lost a race to a concurrent apply of the
    /// same event. Only the ledger can tell.
    async fn recover_from_store_error(
        &self,
        record: &DedupRecord,
        err: anyhow::Error,
    ) -> ApplyOutcome {
        match self.store.applied_record(record.event_id).await {
            Ok(Some(_)) => {
                debug!(
                    event_id = %record.event_id,
                    via = %record.source,
                    error = %format!("{err:#}"),
                    "applier: commit failed but event was applied concurrently"
                );
                self.note_duplicate(record).await;
                ApplyOutcome::Skipped(SkipReason::Duplicate)
            }
            Ok(None) => {
                warn!(
                    event_id = %record.event_id,
                    via = %record.source,
                    error = %format!("{err:#}"),
                    "applier: commit failed, event left unapplied"
                );
                ApplyOutcome::Failed(ApplyError::Store(err))
            }
            Err(lookup_err) => {
                error!(
                    event_id = %record.event_id,
                    error = %format!("{err:#}"),
                    lookup_error = %format!("{lookup_err:#}"),
                    "applier: commit failed and ledger is unreadable"
                );
                ApplyOutcome::Failed(ApplyError::Store(err))
            }
        }
    }

    async fn note_duplicate(&self, received: &DedupRecord) {
        match self.store.applied_record(received.event_id).await {
            Ok(Some(recorded)) if recorded.payload_hash != received.payload_hash => warn!(
                event_id = %received.event_id,
                recorded_hash = %recorded.payload_hash,
                received_hash = %received.payload_hash,
                recorded_via = %recorded.source,
                via = %received.source,
                "applier: duplicate event id carries a different payload, keeping the first"
            ),
            Ok(_) => debug!(
                event_id = %received.event_id,
                via = %received.source,
                "applier: skipping duplicate"
            ),
            Err(err) => warn!(
                event_id = %received.event_id,
                error = %format!("{err:#}"),
                "applier: could not read ledger record of duplicate"
            ),
        }
    }

    /// Drains the delivery queue until every producer has hung up.
    pub async fn run(&self, mut deliveries: mpsc::Receiver<Delivery>) -> ApplierStats {
        let mut stats = ApplierStats::default();
        while let Some(delivery) = deliveries.recv().await {
            let outcome = self.apply_envelope(delivery.envelope, delivery.via).await;
            stats.record(&outcome);
        }
        info!(
            applied = stats.applied,
            skipped = stats.skipped,
            failed = stats.failed,
            "applier: delivery queue closed"
        );
        stats
    }
}

fn check_semantics(event: &Event) -> Result<(), String> {
    match &event.payload {
        EventPayload::ProjectCreated(project) => {
            if project.title.trim().is_empty() {
                return Err("project title is empty".into());
            }
        }
        EventPayload::ProgressLogged(progress) => {
            if progress.progress > 100 {
                return Err(format!("progress {} is above 100", progress.progress));
            }
            if progress.duration_minutes == 0 || progress.duration_minutes > MAX_DURATION_MINUTES {
                return Err(format!(
                    "duration of {} minutes is out of range",
                    progress.duration_minutes
                ));
            }
            if progress.note.trim().is_empty() {
                return Err("progress note is empty".into());
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/applier_tests.rs"]
mod tests;
