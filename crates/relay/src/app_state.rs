use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use shared::{domain::UserId, event::EventEnvelope};
use tokio::sync::broadcast;

/// Per-user fan-out. A user's channel exists while at least one websocket is
/// subscribed to it; events for users with no subscriber are dropped.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) hub: Hub,
}

impl AppState {
    pub(crate) fn new(channel_capacity: usize) -> Self {
        Self {
            hub: Hub::new(channel_capacity),
        }
    }
}

#[derive(Clone)]
pub(crate) struct Hub {
    capacity: usize,
    users: Arc<Mutex<HashMap<UserId, broadcast::Sender<EventEnvelope>>>>,
}

impl Hub {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            users: Arc::default(),
        }
    }

    fn users(&self) -> MutexGuard<'_, HashMap<UserId, broadcast::Sender<EventEnvelope>>> {
        self.users
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn subscribe(&self, user_id: UserId) -> broadcast::Receiver<EventEnvelope> {
        let mut users = self.users();
        users
            .entry(user_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Drops the user's channel once its last subscriber is gone.
    pub(crate) fn release(&self, user_id: UserId) {
        let mut users = self.users();
        if users
            .get(&user_id)
            .is_some_and(|sender| sender.receiver_count() == 0)
        {
            users.remove(&user_id);
        }
    }

    /// Returns how many subscribers the event was handed to.
    pub(crate) fn publish(&self, user_id: UserId, envelope: EventEnvelope) -> usize {
        let users = self.users();
        users
            .get(&user_id)
            .and_then(|sender| sender.send(envelope).ok())
            .unwrap_or(0)
    }

    pub(crate) fn subscriber_count(&self, user_id: UserId) -> usize {
        self.users()
            .get(&user_id)
            .map_or(0, |sender| sender.receiver_count())
    }
}
