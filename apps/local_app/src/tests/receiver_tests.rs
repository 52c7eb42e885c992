use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use shared::{
    domain::{EventId, ProgressStatus, ProjectId},
    event::{Event, EventPayload, EventSource, ProgressLogged},
};
use uuid::Uuid;

use super::*;

const USER: UserId = UserId(7);

fn sample_event() -> Event {
    Event {
        event_id: EventId(Uuid::from_u128(1)),
        origin_user_id: USER,
        timestamp: Utc::now(),
        payload: EventPayload::ProgressLogged(ProgressLogged {
            project_id: ProjectId(Uuid::from_u128(2)),
            status: ProgressStatus::InProgress,
            duration_minutes: 30,
            progress: 10,
            note: "outline".into(),
        }),
        source: EventSource::Chat,
    }
}

/// Fails the first subscription, forwards one event on the second and then
/// stays subscribed forever.
#[derive(Default)]
struct FlakyChannel {
    attempts: AtomicUsize,
}

#[async_trait]
impl Channel for FlakyChannel {
    fn source(&self) -> EventSource {
        EventSource::Push
    }

    async fn deliver(&self, _user_id: UserId, _event: &Event) -> Result<(), ChannelError> {
        Ok(())
    }

    async fn receive(
        &self,
        _user_id: UserId,
        sink: &mpsc::Sender<Delivery>,
    ) -> Result<usize, ChannelError> {
        match self.attempts.fetch_add(1, Ordering::SeqCst) {
            0 => Err(ChannelError::InvalidEndpoint("relay offline".into())),
            1 => {
                sink.send(Delivery::new(sample_event().to_envelope(), EventSource::Push))
                    .await
                    .map_err(|_| ChannelError::QueueClosed)?;
                Ok(1)
            }
            _ => std::future::pending().await,
        }
    }
}

#[tokio::test]
async fn reconnects_after_failure_and_stops_on_shutdown() {
    let channel = Arc::new(FlakyChannel::default());
    let (tx, mut rx) = mpsc::channel(8);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let task = tokio::spawn(run_push_receiver(
        channel.clone(),
        USER,
        tx,
        Duration::from_millis(10),
        shutdown_rx,
    ));

    let delivery = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("delivery in time")
        .expect("delivery");
    assert_eq!(delivery.via, EventSource::Push);
    assert_eq!(delivery.envelope.event_id, EventId(Uuid::from_u128(1)));

    shutdown_tx.send(true).expect("signal shutdown");
    let forwarded = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("receiver stops")
        .expect("join receiver");
    assert_eq!(forwarded, 1);
    assert!(channel.attempts.load(Ordering::SeqCst) >= 2);
}

#[tokio::test]
async fn stops_when_delivery_queue_is_closed() {
    let channel = Arc::new(FlakyChannel::default());
    channel.attempts.store(1, Ordering::SeqCst);
    let (tx, rx) = mpsc::channel(8);
    drop(rx);
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);

    let forwarded = tokio::time::timeout(
        Duration::from_secs(5),
        run_push_receiver(channel, USER, tx, Duration::from_millis(10), shutdown_rx),
    )
    .await
    .expect("receiver stops");
    assert_eq!(forwarded, 0);
}

#[tokio::test]
async fn returns_immediately_when_already_shut_down() {
    let channel = Arc::new(FlakyChannel::default());
    let (tx, _rx) = mpsc::channel(8);
    let (_shutdown_tx, shutdown_rx) = watch::channel(true);

    let forwarded =
        run_push_receiver(channel.clone(), USER, tx, Duration::from_secs(60), shutdown_rx).await;
    assert_eq!(forwarded, 0);
    assert_eq!(channel.attempts.load(Ordering::SeqCst), 0);
}
