pub mod credential;
pub mod hub;
pub mod identity;
pub mod ledger;
pub mod presence;

use std::{
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use tokio::sync::{RwLock, mpsc};
use tracing::debug;

use crate::{
    config::AppConfig,
    dto::dashboard::DashboardMessage,
    services::{dashboard_events, notifier::Notification, persistence::Persistence},
};

use self::{
    hub::{DashboardHub, Subscription},
    ledger::Ledger,
    presence::PresenceBook,
};

pub type SharedState = Arc<AppState>;

/// Every piece of mutable domain state, owned behind a single lock.
///
/// Mutations hold the write guard for their whole apply → publish → schedule sequence, so
/// no two mutations interleave and subscribers see events in the order they happened.
pub struct Registry {
    pub presence: PresenceBook,
    pub ledger: Ledger,
    /// Whether the game feed connection is currently up.
    pub feed_connected: bool,
}

impl Registry {
    pub fn new(presence: PresenceBook, ledger: Ledger) -> Self {
        Self {
            presence,
            ledger,
            feed_connected: false,
        }
    }
}

/// Central application state shared by producers, services and transports.
pub struct AppState {
    config: Arc<AppConfig>,
    registry: RwLock<Registry>,
    hub: DashboardHub,
    persistence: Persistence,
    notifications: mpsc::UnboundedSender<Notification>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    pub fn new(
        config: AppConfig,
        registry: Registry,
        persistence: Persistence,
        notifications: mpsc::UnboundedSender<Notification>,
    ) -> SharedState {
        Arc::new(Self {
            config: Arc::new(config),
            registry: RwLock::new(registry),
            hub: DashboardHub::new(),
            persistence,
            notifications,
        })
    }

    pub fn config(&self) -> Arc<AppConfig> {
        self.config.clone()
    }

    /// The lock guarding all domain state.
    pub fn registry(&self) -> &RwLock<Registry> {
        &self.registry
    }

    /// Fan-out hub for dashboard subscribers.
    pub fn hub(&self) -> &DashboardHub {
        &self.hub
    }

    /// Register a dashboard subscriber whose first message is the current snapshot.
    ///
    /// The snapshot is built and queued under the read lock, so no mutation can publish
    /// between the snapshot and the registration.
    pub async fn subscribe_dashboard(&self) -> Subscription {
        let registry = self.registry.read().await;
        let snapshot = dashboard_events::build_snapshot(&registry, now_ms());
        let initial = dashboard_events::encode(&DashboardMessage::Snapshot(snapshot));
        self.hub.subscribe(initial)
    }

    /// Schedule a write of the watch-list collection from the given registry view.
    pub fn persist_watched(&self, registry: &Registry) {
        self.persistence
            .schedule_watched(registry.presence.to_entities());
    }

    /// Schedule a write of the ledger collection from the given registry view.
    pub fn persist_ledger(&self, registry: &Registry) {
        self.persistence.schedule_ledger(registry.ledger.to_entity());
    }

    /// Write scheduler for the record collections.
    pub fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    /// Queue an outbound notification; delivery happens on the dispatcher task.
    pub fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            debug!("notification dispatcher stopped; dropping notification");
        }
    }
}

/// Current wall-clock time in milliseconds since the UNIX epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
