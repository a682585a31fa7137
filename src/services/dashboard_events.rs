use tracing::warn;

use crate::{
    dto::{
        dashboard::{
            DashboardMessage, DashboardSnapshot, FeedStatusEvent, PresenceChangedEvent,
            RequestCreatedEvent, RequestDecidedEvent, RequestSummary, RosterSummary, ServerEvent,
            WatchAddedEvent, WatchRemovedEvent, WatchedSummary,
        },
        format_epoch_ms,
    },
    state::{
        Registry, SharedState,
        identity::Identity,
        ledger::{JoinRequest, LedgerChange, RequestStatus},
        presence::{PresenceChange, WatchedIdentity},
    },
};

/// Build the full point-in-time view sent to new subscribers.
pub fn build_snapshot(registry: &Registry, now: u64) -> DashboardSnapshot {
    DashboardSnapshot {
        watched: registry
            .presence
            .watched()
            .map(|record| WatchedSummary::from_record(record, now))
            .collect(),
        roster: registry.presence.roster().map(RosterSummary::from).collect(),
        pending_requests: registry
            .ledger
            .requests_with(RequestStatus::Pending)
            .map(RequestSummary::from)
            .collect(),
        approved_requests: registry
            .ledger
            .requests_with(RequestStatus::Approved)
            .map(RequestSummary::from)
            .collect(),
        feed_connected: registry.feed_connected,
        generated_at: format_epoch_ms(now),
    }
}

/// Serialise a dashboard message, falling back to an empty payload on encoder failure.
pub fn encode(message: &DashboardMessage) -> ServerEvent {
    message.to_server_event().unwrap_or_else(|err| {
        warn!(kind = message.kind(), error = %err, "failed to serialise dashboard message");
        ServerEvent::new(Some(message.kind().to_string()), "{}".to_string())
    })
}

/// Broadcast one presence transition of a watched identity.
pub fn broadcast_presence_changed(state: &SharedState, change: &PresenceChange) {
    publish(
        state,
        DashboardMessage::PresenceChanged(PresenceChangedEvent::from(change)),
    );
}

/// Broadcast that an identity joined the watch list.
pub fn broadcast_watch_added(state: &SharedState, record: &WatchedIdentity, now: u64) {
    publish(
        state,
        DashboardMessage::WatchAdded(WatchAddedEvent {
            watched: WatchedSummary::from_record(record, now),
        }),
    );
}

/// Broadcast that an identity left the watch list.
pub fn broadcast_watch_removed(state: &SharedState, identity: &Identity) {
    publish(
        state,
        DashboardMessage::WatchRemoved(WatchRemovedEvent {
            identity: identity.key(),
        }),
    );
}

pub fn broadcast_request_created(state: &SharedState, request: &JoinRequest) {
    publish(
        state,
        DashboardMessage::RequestCreated(RequestCreatedEvent {
            request: request.into(),
        }),
    );
}

pub fn broadcast_request_decided(state: &SharedState, change: &LedgerChange) {
    publish(
        state,
        DashboardMessage::RequestDecided(RequestDecidedEvent {
            request: change.request().into(),
            decision: change.decision(),
        }),
    );
}

/// Broadcast a game feed connectivity change.
pub fn broadcast_feed_status(state: &SharedState, connected: bool) {
    publish(
        state,
        DashboardMessage::FeedStatus(FeedStatusEvent { connected }),
    );
}

fn publish(state: &SharedState, message: DashboardMessage) {
    state.hub().publish(encode(&message));
}
