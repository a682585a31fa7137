use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;

use crate::dto::dashboard::ServerEvent;

type Subscribers = DashMap<u64, mpsc::UnboundedSender<ServerEvent>>;

/// Fan-out hub delivering dashboard events to every connected session.
///
/// Each subscriber owns an independent unbounded queue, so a slow or dead consumer never
/// delays `publish` for the others. Events reach a subscriber in publish order.
pub struct DashboardHub {
    subscribers: Arc<Subscribers>,
    next_id: AtomicU64,
}

impl Default for DashboardHub {
    fn default() -> Self {
        Self::new()
    }
}

impl DashboardHub {
    pub fn new() -> Self {
        Self {
            subscribers: Arc::new(DashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a new subscriber whose queue starts with `initial`.
    ///
    /// The initial event is queued before the subscriber becomes visible to `publish`, so it
    /// always precedes every event published afterwards.
    pub fn subscribe(&self, initial: ServerEvent) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        // The receiver is alive, this cannot fail.
        let _ = tx.send(initial);
        self.subscribers.insert(id, tx);
        debug!(subscriber = id, total = self.subscribers.len(), "dashboard subscriber added");

        Subscription {
            id,
            receiver: rx,
            subscribers: Arc::clone(&self.subscribers),
        }
    }

    /// Remove a subscriber; later publishes no longer reach it.
    pub fn unsubscribe(&self, id: u64) {
        if self.subscribers.remove(&id).is_some() {
            debug!(subscriber = id, "dashboard subscriber removed");
        }
    }

    /// Send an event to all current subscribers, pruning those whose receiver is gone.
    pub fn publish(&self, event: ServerEvent) {
        let mut dead = Vec::new();
        for entry in self.subscribers.iter() {
            if entry.value().send(event.clone()).is_err() {
                dead.push(*entry.key());
            }
        }
        for id in dead {
            self.unsubscribe(id);
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// Receiving side of a hub subscription. Dropping it unsubscribes immediately.
pub struct Subscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<ServerEvent>,
    subscribers: Arc<Subscribers>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the next event; `None` once the subscription was removed and drained.
    pub async fn recv(&mut self) -> Option<ServerEvent> {
        self.receiver.recv().await
    }

    /// Take an already-queued event without waiting.
    pub fn try_recv(&mut self) -> Option<ServerEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.subscribers.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(name: &str, data: &str) -> ServerEvent {
        ServerEvent::new(Some(name.to_string()), data.to_string())
    }

    #[tokio::test]
    async fn initial_event_precedes_later_publishes() {
        let hub = DashboardHub::new();
        hub.publish(event("presenceChanged", "before"));

        let mut subscription = hub.subscribe(event("snapshot", "state"));
        hub.publish(event("presenceChanged", "after-1"));
        hub.publish(event("presenceChanged", "after-2"));

        let received: Vec<String> = [
            subscription.recv().await.unwrap(),
            subscription.recv().await.unwrap(),
            subscription.recv().await.unwrap(),
        ]
        .into_iter()
        .map(|event| event.data)
        .collect();
        assert_eq!(received, vec!["state", "after-1", "after-2"]);
        assert!(subscription.try_recv().is_none());
    }

    #[tokio::test]
    async fn dead_subscribers_do_not_affect_others() {
        let hub = DashboardHub::new();
        let mut alive = hub.subscribe(event("snapshot", "a"));
        let stalled = hub.subscribe(event("snapshot", "b"));
        assert_eq!(hub.subscriber_count(), 2);

        // A subscriber that never reads keeps queueing without blocking publish.
        for n in 0..1_000 {
            hub.publish(event("presenceChanged", &n.to_string()));
        }
        drop(stalled);
        assert_eq!(hub.subscriber_count(), 1);

        hub.publish(event("presenceChanged", "last"));
        assert_eq!(alive.recv().await.unwrap().data, "a");
        let mut last = None;
        while let Some(event) = alive.try_recv() {
            last = Some(event.data);
        }
        assert_eq!(last.as_deref(), Some("last"));
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let hub = DashboardHub::new();
        let mut subscription = hub.subscribe(event("snapshot", "s"));
        hub.unsubscribe(subscription.id());
        hub.publish(event("presenceChanged", "ignored"));

        assert_eq!(subscription.recv().await.unwrap().data, "s");
        assert!(subscription.recv().await.is_none());
    }
}
