use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Change published after every successful write touching a session.
///
/// Notifications only say *what* changed; subscribers re-read the authoritative rows instead
/// of trusting arrival order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionNotification {
    /// Status or timestamps of the session row changed.
    SessionUpdated,
    /// A participant joined the roster.
    ParticipantJoined {
        /// New participant.
        participant_id: Uuid,
    },
    /// A participant left the roster.
    ParticipantLeft {
        /// Removed participant.
        participant_id: Uuid,
    },
    /// A response was inserted or replaced.
    ResponseRecorded {
        /// Answering participant.
        participant_id: Uuid,
        /// Question answered.
        question_id: Uuid,
    },
}

/// Broadcast hub for one session.
pub struct SessionHub {
    sender: broadcast::Sender<SessionNotification>,
}

impl SessionHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionNotification> {
        self.sender.subscribe()
    }

    /// Send a notification to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, notification: SessionNotification) {
        let _ = self.sender.send(notification);
    }

    fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

/// Registry of per-session hubs, created on first subscription.
pub struct SessionHubs {
    hubs: DashMap<Uuid, Arc<SessionHub>>,
    capacity: usize,
}

impl SessionHubs {
    /// Create an empty registry whose hubs buffer `capacity` notifications per subscriber.
    pub fn new(capacity: usize) -> Self {
        Self {
            hubs: DashMap::new(),
            capacity,
        }
    }

    /// Subscribe to the hub of `session_id`, creating it when needed.
    pub fn subscribe(&self, session_id: Uuid) -> broadcast::Receiver<SessionNotification> {
        self.hubs
            .entry(session_id)
            .or_insert_with(|| Arc::new(SessionHub::new(self.capacity)))
            .subscribe()
    }

    /// Publish to the hub of `session_id`. Sessions nobody watches have no hub and the
    /// notification is dropped.
    pub fn publish(&self, session_id: Uuid, notification: SessionNotification) {
        let hub = self.hubs.get(&session_id).map(|entry| entry.value().clone());
        if let Some(hub) = hub {
            hub.broadcast(notification);
        }
    }

    /// Drop the hub of `session_id` once its last subscriber is gone.
    pub fn release(&self, session_id: Uuid) {
        self.hubs
            .remove_if(&session_id, |_, hub| hub.subscriber_count() == 0);
    }

    /// Number of sessions currently watched.
    pub fn len(&self) -> usize {
        self.hubs.len()
    }

    /// Whether no session is watched.
    pub fn is_empty(&self) -> bool {
        self.hubs.is_empty()
    }
}
