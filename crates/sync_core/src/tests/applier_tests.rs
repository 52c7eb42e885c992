use std::sync::atomic::Ordering;

use serde_json::json;
use shared::{domain::ProgressStatus, event::EventEnvelope};

use super::*;
use crate::{
    ledger::DedupLedger,
    test_support::{at, progress_event, project_event, MemoryStore},
};

fn applier() -> (Arc<MemoryStore>, EventApplier<MemoryStore>) {
    let store = Arc::new(MemoryStore::default());
    (Arc::clone(&store), EventApplier::new(store))
}

#[tokio::test]
async fn applies_each_event_once() {
    let (store, applier) = applier();
    let event = project_event(1, "Algo HW");

    assert!(applier.apply(&event, EventSource::Push).await.is_applied());
    assert!(applier
        .apply(&event, EventSource::Reconciliation)
        .await
        .is_duplicate());
    assert!(applier.apply(&event, EventSource::Push).await.is_duplicate());

    assert_eq!(store.project_count(), 1);
    assert_eq!(store.ledger_len(), 1);
    let record = store.applied_record(event.event_id).await.unwrap().unwrap();
    assert_eq!(record.source, EventSource::Push);
    assert_eq!(record.payload_hash, event.payload_hash());
}

#[tokio::test]
async fn duplicate_with_different_payload_keeps_first() {
    let (store, applier) = applier();
    let first = project_event(1, "Algo HW");
    let mut altered = first.clone();
    if let EventPayload::ProjectCreated(project) = &mut altered.payload {
        project.title = "Renamed".into();
    }

    assert!(applier.apply(&first, EventSource::Push).await.is_applied());
    assert!(applier
        .apply(&altered, EventSource::Reconciliation)
        .await
        .is_duplicate());
    assert_eq!(store.project_title(1).as_deref(), Some("Algo HW"));
}

#[tokio::test]
async fn undecodable_envelope_fails_without_side_effects() {
    let (store, applier) = applier();
    let mut envelope = project_event(1, "Algo HW").to_envelope();
    envelope.event_type = "project.archived".into();
    let outcome = applier.apply_envelope(envelope, EventSource::Push).await;
    assert!(matches!(
        outcome,
        ApplyOutcome::Failed(ApplyError::Decode(EventDecodeError::UnknownType(_)))
    ));

    let mut envelope = project_event(2, "Algo HW").to_envelope();
    envelope.payload = json!({ "title": "Algo HW" });
    let outcome = applier.apply_envelope(envelope, EventSource::Push).await;
    assert!(matches!(
        outcome,
        ApplyOutcome::Failed(ApplyError::Decode(EventDecodeError::MalformedPayload { .. }))
    ));

    assert_eq!(store.ledger_len(), 0);
    assert_eq!(store.project_count(), 0);
}

#[tokio::test]
async fn semantically_invalid_event_is_rejected() {
    let (store, applier) = applier();
    let blank = project_event(1, "   ");
    assert!(matches!(
        applier.apply(&blank, EventSource::Push).await,
        ApplyOutcome::Failed(ApplyError::Invalid(_))
    ));

    applier
        .apply(&project_event(2, "Algo HW"), EventSource::Push)
        .await;
    let too_far = progress_event(3, 2, 101);
    assert!(matches!(
        applier.apply(&too_far, EventSource::Push).await,
        ApplyOutcome::Failed(ApplyError::Invalid(_))
    ));
    assert_eq!(store.ledger_len(), 1);
}

#[tokio::test]
async fn progress_before_project_fails_then_succeeds_on_redelivery() {
    let (store, applier) = applier();
    let progress = progress_event(10, 1, 40);

    assert!(matches!(
        applier.apply(&progress, EventSource::Push).await,
        ApplyOutcome::Failed(ApplyError::Store(_))
    ));
    assert!(!store.has_applied(progress.event_id).await.unwrap());

    applier
        .apply(&project_event(1, "Algo HW"), EventSource::Push)
        .await;
    assert!(applier
        .apply(&progress, EventSource::Reconciliation)
        .await
        .is_applied());
    assert_eq!(
        store.project_progress(1),
        Some((ProgressStatus::InProgress, 40))
    );
    assert_eq!(store.session_count(), 1);
}

#[tokio::test]
async fn later_progress_overwrites_project_state() {
    let (store, applier) = applier();
    applier
        .apply(&project_event(1, "Algo HW"), EventSource::Push)
        .await;
    applier.apply(&progress_event(10, 1, 40), EventSource::Push).await;
    applier.apply(&progress_event(11, 1, 70), EventSource::Push).await;
    assert_eq!(
        store.project_progress(1),
        Some((ProgressStatus::InProgress, 70))
    );
    assert_eq!(store.session_count(), 2);
}

#[tokio::test]
async fn store_failure_leaves_event_unapplied() {
    let (store, applier) = applier();
    let event = project_event(1, "Algo HW");
    store.fail_commits.store(true, Ordering::SeqCst);
    assert!(matches!(
        applier.apply(&event, EventSource::Push).await,
        ApplyOutcome::Failed(ApplyError::Store(_))
    ));
    store.fail_commits.store(false, Ordering::SeqCst);
    assert!(applier.apply(&event, EventSource::Push).await.is_applied());
}

#[tokio::test]
async fn ledger_records_apply_time_and_type() {
    let (store, applier) = applier();
    let event = project_event(1, "Algo HW");
    applier.apply_at(&event, EventSource::Push, at(5)).await;
    let record = store.applied_record(event.event_id).await.unwrap().unwrap();
    assert_eq!(record.applied_at, at(5));
    assert_eq!(record.event_type, event.event_type());
}

#[tokio::test]
async fn run_drains_both_producers_into_one_consumer() {
    let (store, applier) = applier();
    let (tx, rx) = mpsc::channel(16);
    let envelope: EventEnvelope = project_event(1, "Algo HW").to_envelope();

    let push_tx = tx.clone();
    let push_copy = envelope.clone();
    let push = tokio::spawn(async move {
        push_tx
            .send(Delivery::new(push_copy, EventSource::Push))
            .await
            .unwrap();
    });
    let reconcile = tokio::spawn(async move {
        tx.send(Delivery::new(envelope, EventSource::Reconciliation))
            .await
            .unwrap();
    });
    push.await.unwrap();
    reconcile.await.unwrap();

    let stats = applier.run(rx).await;
    assert_eq!(
        stats,
        ApplierStats {
            applied: 1,
            skipped: 1,
            failed: 0
        }
    );
    assert_eq!(store.project_count(), 1);
    assert_eq!(store.ledger_len(), 1);
}
