use std::{sync::Arc, time::Duration};

use shared::domain::UserId;
use sync_core::{Channel, ChannelError, Delivery};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

/// Keeps a long-lived subscription open on `channel`, reconnecting after
/// `retry` whenever it drops. Returns the number of events forwarded once
/// shutdown is requested or the delivery queue closes.
pub async fn run_push_receiver(
    channel: Arc<dyn Channel>,
    user_id: UserId,
    sink: mpsc::Sender<Delivery>,
    retry: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> usize {
    let source = channel.source();
    let mut forwarded = 0;
    loop {
        if *shutdown.borrow() {
            break;
        }

        let result = tokio::select! {
            result = channel.receive(user_id, &sink) => result,
            _ = wait_for_shutdown(&mut shutdown) => break,
        };
        match result {
            Ok(count) => {
                forwarded += count;
                info!(%source, count, "push: subscription ended, reconnecting");
            }
            Err(ChannelError::QueueClosed) => {
                info!(%source, "push: delivery queue closed, receiver stopping");
                break;
            }
            Err(err) => warn!(%source, %err, "push: subscription failed"),
        }

        tokio::select! {
            _ = tokio::time::sleep(retry) => {}
            _ = wait_for_shutdown(&mut shutdown) => break,
        }
    }
    forwarded
}

async fn wait_for_shutdown(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

#[cfg(test)]
#[path = "tests/receiver_tests.rs"]
mod tests;
