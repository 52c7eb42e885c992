use std::{sync::Arc, time::Duration as StdDuration};

use chrono::{DateTime, Duration, Utc};
use shared::domain::UserId;
use tokio::{
    sync::{mpsc, watch},
    time::MissedTickBehavior,
};
use tracing::{debug, info, warn};

use crate::{
    channel::{Channel, Delivery},
    ledger::SyncStateStore,
};

/// A pass is due when none ever succeeded or the last success is older than
/// `threshold`.
pub fn is_due(last_success: Option<DateTime<Utc>>, now: DateTime<Utc>, threshold: Duration) -> bool {
    match last_success {
        None => true,
        Some(last) => now.signed_duration_since(last) > threshold,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    NotDue { last_success: DateTime<Utc> },
    Synced { delivered: usize },
    /// The pass (or reading sync state) failed; the last-success timestamp is
    /// unchanged so the next tick retries.
    Failed { reason: String },
}

pub struct ReconciliationScheduler {
    user_id: UserId,
    channel: Arc<dyn Channel>,
    state: Arc<dyn SyncStateStore>,
    sink: mpsc::Sender<Delivery>,
    threshold: Duration,
}

impl ReconciliationScheduler {
    pub fn new(
        user_id: UserId,
        channel: Arc<dyn Channel>,
        state: Arc<dyn SyncStateStore>,
        sink: mpsc::Sender<Delivery>,
        threshold: Duration,
    ) -> Self {
        Self {
            user_id,
            channel,
            state,
            sink,
            threshold,
        }
    }

    pub fn threshold(&self) -> Duration {
        self.threshold
    }

    pub async fn tick(&self) -> TickOutcome {
        self.tick_at(Utc::now()).await
    }

    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickOutcome {
        let channel = self.channel.source();
        let last_success = match self.state.last_successful_sync(channel).await {
            Ok(last) => last,
            Err(err) => {
                warn!(%channel, error = %format!("{err:#}"), "sync: could not read last sync time");
                return TickOutcome::Failed {
                    reason: format!("{err:#}"),
                };
            }
        };

        if let Some(last_success) = last_success {
            if !is_due(Some(last_success), now, self.threshold) {
                debug!(%channel, %last_success, "sync: reconciliation not due");
                return TickOutcome::NotDue { last_success };
            }
        }

        info!(%channel, user_id = self.user_id.0, ?last_success, "sync: reconciliation pass starting");
        let delivered = match self.channel.receive(self.user_id, &self.sink).await {
            Ok(delivered) => delivered,
            Err(err) => {
                warn!(%channel, %err, "sync: reconciliation pass failed");
                return TickOutcome::Failed {
                    reason: err.to_string(),
                };
            }
        };

        if let Err(err) = self.state.record_successful_sync(channel, now).await {
            warn!(%channel, error = %format!("{err:#}"), "sync: could not persist sync time");
            return TickOutcome::Failed {
                reason: format!("{err:#}"),
            };
        }
        info!(%channel, delivered, "sync: reconciliation pass finished");
        TickOutcome::Synced { delivered }
    }

    /// Ticks immediately, then every `every`, until `shutdown` turns true or
    /// its sender is dropped.
    pub async fn run(&self, every: StdDuration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("sync: scheduler stopped");
    }
}

#[cfg(test)]
#[path = "tests/scheduler_tests.rs"]
mod tests;
