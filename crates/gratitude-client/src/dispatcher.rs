use std::sync::Arc;

use tokio::sync::{broadcast, watch};

use gratitude_types::ChangeEvent;

use crate::channel::{SubscribeStatus, SubscriptionState};
use crate::error::MalformedPayload;

const FEED_CAPACITY: usize = 1024;

/// What consumers of a message feed receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    /// The subscription left `Pending`. Published once per subscription.
    Status(SubscribeStatus),

    /// A row of `gratitude_messages` changed.
    Change(ChangeEvent),

    /// A notification arrived whose payload is not a message row.
    Malformed(MalformedPayload),

    /// The realtime connection ended. Nothing follows this event.
    Closed,
}

/// Fans one subscription's events out to every consumer in the process and
/// owns its lifecycle state.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Broadcast channel for feed events; every receiver sees every event
    broadcast_tx: broadcast::Sender<FeedEvent>,

    state_tx: watch::Sender<SubscriptionState>,
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(FEED_CAPACITY);
        let (state_tx, _) = watch::channel(SubscriptionState::Pending);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                state_tx,
            }),
        }
    }

    /// Subscribe to feed events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    pub fn broadcast(&self, event: FeedEvent) {
        // No receivers is fine; the event is simply not observed.
        let _ = self.inner.broadcast_tx.send(event);
    }

    pub fn state(&self) -> SubscriptionState {
        *self.inner.state_tx.borrow()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == SubscriptionState::Pending
    }

    pub fn watch_state(&self) -> watch::Receiver<SubscriptionState> {
        self.inner.state_tx.subscribe()
    }

    /// Apply a confirmation status to the lifecycle. Publishes
    /// [`FeedEvent::Status`] and returns `true` only when the state changed.
    pub fn resolve(&self, status: SubscribeStatus) -> bool {
        let changed = self
            .inner
            .state_tx
            .send_if_modified(|state| state.on_status(status));
        if changed {
            self.broadcast(FeedEvent::Status(status));
        }
        changed
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}
