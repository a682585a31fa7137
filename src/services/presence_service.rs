use tracing::info;

use crate::{
    dto::{
        actions::WatchAddRequest,
        dashboard::{DashboardSnapshot, RosterSummary, WatchedSummary},
    },
    error::ServiceError,
    services::{dashboard_events, notifier::Notification},
    state::{
        Registry, SharedState,
        identity::{Identity, Namespace},
        now_ms,
        presence::{Observation, PresenceChange},
    },
};

const DEFAULT_NOTIFICATION_CHANNEL: &str = "presence";

/// Apply a membership snapshot or delta pushed by the game feed.
pub async fn apply_feed_snapshot(
    state: &SharedState,
    observations: Vec<Observation>,
) -> Vec<PresenceChange> {
    let now = now_ms();
    let mut registry = state.registry().write().await;
    let changes = registry
        .presence
        .apply_observations(Namespace::Primary, observations, now);
    publish_changes(state, &registry, &changes);
    changes
}

/// Replace the polled roster with a freshly fetched listing.
///
/// Only called after a successful fetch; a failed poll never reaches the registry.
pub async fn apply_poll_listing(
    state: &SharedState,
    listed: Vec<Observation>,
) -> Vec<PresenceChange> {
    let now = now_ms();
    let mut registry = state.registry().write().await;
    let changes = registry.presence.apply_listing(listed, now);
    publish_changes(state, &registry, &changes);
    changes
}

/// Add an identity to the watch list.
pub async fn watch_add(
    state: &SharedState,
    request: WatchAddRequest,
) -> Result<WatchedSummary, ServiceError> {
    let identity: Identity = request.id.parse()?;
    let now = now_ms();

    let mut registry = state.registry().write().await;
    let (record, change) = registry.presence.watch(identity, request.name, now)?;
    info!(identity = %record.identity, online = record.is_online(), "identity watched");

    dashboard_events::broadcast_watch_added(state, &record, now);
    if let Some(change) = change {
        publish_changes(state, &registry, std::slice::from_ref(&change));
    } else {
        state.persist_watched(&registry);
    }
    Ok(WatchedSummary::from_record(&record, now))
}

/// Remove an identity from the watch list.
pub async fn watch_remove(state: &SharedState, key: &str) -> Result<(), ServiceError> {
    let identity: Identity = key.parse()?;

    let mut registry = state.registry().write().await;
    let record = registry.presence.unwatch(&identity)?;
    info!(
        identity = %record.identity,
        cumulative_online_ms = record.cumulative_online_ms(),
        "identity unwatched"
    );

    dashboard_events::broadcast_watch_removed(state, &identity);
    state.persist_watched(&registry);
    Ok(())
}

/// Record the game feed's connectivity, broadcasting only actual changes.
pub async fn set_feed_connected(state: &SharedState, connected: bool) {
    let mut registry = state.registry().write().await;
    if registry.feed_connected == connected {
        return;
    }
    registry.feed_connected = connected;
    dashboard_events::broadcast_feed_status(state, connected);
}

/// Current feed connectivity.
pub async fn feed_connected(state: &SharedState) -> bool {
    state.registry().read().await.feed_connected
}

/// Everything currently visible on the server, both namespaces.
pub async fn online_roster(state: &SharedState) -> Vec<RosterSummary> {
    let registry = state.registry().read().await;
    registry.presence.roster().map(RosterSummary::from).collect()
}

/// Point-in-time dashboard view.
pub async fn snapshot(state: &SharedState) -> DashboardSnapshot {
    let registry = state.registry().read().await;
    dashboard_events::build_snapshot(&registry, now_ms())
}

/// Broadcast, notify and persist the outcome of one reconciliation pass.
///
/// Must be called with the write guard still held so events keep their order.
fn publish_changes(state: &SharedState, registry: &Registry, changes: &[PresenceChange]) {
    if changes.is_empty() {
        return;
    }

    let config = state.config();
    let channel = config
        .notifications
        .as_ref()
        .map_or(DEFAULT_NOTIFICATION_CHANNEL, |n| n.channel.as_str());
    for change in changes {
        info!(
            identity = %change.identity,
            transition = ?change.transition,
            "presence changed"
        );
        dashboard_events::broadcast_presence_changed(state, change);
        state.notify(Notification::presence(channel, change));
    }
    state.persist_watched(registry);
}
