use std::sync::atomic::Ordering;

use super::*;
use crate::test_support::{project_event, FixedChannel, OWNER};

#[tokio::test]
async fn broadcast_counts_accepting_channels() {
    let push = Arc::new(FixedChannel::new(EventSource::Push, Vec::new()));
    let cloud = Arc::new(FixedChannel::new(EventSource::Reconciliation, Vec::new()));
    let broadcaster = Broadcaster::default()
        .with_channel(push.clone())
        .with_channel(cloud.clone());
    assert_eq!(broadcaster.len(), 2);

    let event = project_event(1, "Algo HW");
    assert_eq!(broadcaster.broadcast(OWNER, &event).await, 2);
    assert_eq!(push.delivered.lock().unwrap().len(), 1);
    assert_eq!(cloud.delivered.lock().unwrap()[0].event_id, event.event_id);
}

#[tokio::test]
async fn failing_channel_does_not_block_others() {
    let push = Arc::new(FixedChannel::new(EventSource::Push, Vec::new()));
    push.fail.store(true, Ordering::SeqCst);
    let cloud = Arc::new(FixedChannel::new(EventSource::Reconciliation, Vec::new()));
    let broadcaster = Broadcaster::new(vec![push.clone() as Arc<dyn Channel>, cloud.clone()]);

    assert_eq!(
        broadcaster
            .broadcast(OWNER, &project_event(1, "Algo HW"))
            .await,
        1
    );
    assert!(push.delivered.lock().unwrap().is_empty());
    assert_eq!(cloud.delivered.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn forward_reports_closed_queue() {
    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    let envelope = project_event(1, "Algo HW").to_envelope();
    assert!(matches!(
        forward(&tx, envelope, EventSource::Push).await,
        Err(ChannelError::QueueClosed)
    ));
}
