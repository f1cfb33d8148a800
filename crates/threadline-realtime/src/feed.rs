use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::broadcast;
use tracing::warn;

use threadline_types::events::{ChangeEvent, Subscription};

/// Fan-out hub for committed row changes.
///
/// Writers publish after their transaction commits; every subscriber sees
/// events in publish order and filters them by table and channel.
#[derive(Clone)]
pub struct ChangeFeed {
    inner: Arc<FeedInner>,
}

struct FeedInner {
    /// Broadcast channel for change events. Subscribers filter on receipt.
    broadcast_tx: broadcast::Sender<ChangeEvent>,

    /// Number of live websocket connections
    connections: AtomicUsize,
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl ChangeFeed {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(1024);
        Self {
            inner: Arc::new(FeedInner {
                broadcast_tx,
                connections: AtomicUsize::new(0),
            }),
        }
    }

    /// Publish a change to every subscriber. Having no subscribers is fine.
    pub fn publish(&self, event: ChangeEvent) {
        let _ = self.inner.broadcast_tx.send(event);
    }

    /// Unfiltered receiver, for callers that manage their own filters.
    pub fn receiver(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.broadcast_tx.subscribe()
    }

    /// Subscribe with a fixed filter set.
    pub fn subscribe(&self, filters: Vec<Subscription>) -> FeedSubscription {
        FeedSubscription {
            rx: self.receiver(),
            filters,
        }
    }

    pub fn active_connections(&self) -> usize {
        self.inner.connections.load(Ordering::Relaxed)
    }

    pub(crate) fn connection_opened(&self) {
        self.inner.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn connection_closed(&self) {
        self.inner.connections.fetch_sub(1, Ordering::Relaxed);
    }
}

/// True when any filter in the set accepts the event.
pub fn matches_any(filters: &[Subscription], event: &ChangeEvent) -> bool {
    filters.iter().any(|f| f.matches(event))
}

/// An in-process subscription that only yields matching events.
pub struct FeedSubscription {
    rx: broadcast::Receiver<ChangeEvent>,
    filters: Vec<Subscription>,
}

impl FeedSubscription {
    /// Next matching event, or `None` once the feed is gone. Lagged events are
    /// skipped with a warning.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if matches_any(&self.filters, &event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Change feed subscriber lagged by {} events", n);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Next matching event that is already queued, without waiting.
    pub fn try_recv(&mut self) -> Option<ChangeEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) if matches_any(&self.filters, &event) => return Some(event),
                Ok(_) => continue,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Change feed subscriber lagged by {} events", n);
                }
                Err(_) => return None,
            }
        }
    }
}
