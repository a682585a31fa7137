use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::{actions::ActionResult, format_epoch_ms},
    state::{
        identity::Namespace,
        ledger::{Decision, JoinRequest, RequestStatus},
        presence::{PresenceChange, PresenceTransition, RosterEntry, Session, WatchedIdentity},
    },
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across dashboard channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    pub fn new(event: Option<String>, data: String) -> Self {
        Self { event, data }
    }

    /// Convenience wrapper that serialises `payload` into the data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

/// Every message a dashboard session can receive, tagged by `type`.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum DashboardMessage {
    Snapshot(DashboardSnapshot),
    PresenceChanged(PresenceChangedEvent),
    WatchAdded(WatchAddedEvent),
    WatchRemoved(WatchRemovedEvent),
    RequestCreated(RequestCreatedEvent),
    RequestDecided(RequestDecidedEvent),
    FeedStatus(FeedStatusEvent),
    ActionResult(ActionResult),
}

impl DashboardMessage {
    /// Name used as the SSE event field.
    pub fn kind(&self) -> &'static str {
        match self {
            DashboardMessage::Snapshot(_) => "snapshot",
            DashboardMessage::PresenceChanged(_) => "presenceChanged",
            DashboardMessage::WatchAdded(_) => "watchAdded",
            DashboardMessage::WatchRemoved(_) => "watchRemoved",
            DashboardMessage::RequestCreated(_) => "requestCreated",
            DashboardMessage::RequestDecided(_) => "requestDecided",
            DashboardMessage::FeedStatus(_) => "feedStatus",
            DashboardMessage::ActionResult(_) => "actionResult",
        }
    }

    pub fn to_server_event(&self) -> serde_json::Result<ServerEvent> {
        ServerEvent::json(Some(self.kind().to_string()), self)
    }
}

/// Full current state sent once to every new subscriber. Never carries credentials.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DashboardSnapshot {
    pub watched: Vec<WatchedSummary>,
    pub roster: Vec<RosterSummary>,
    pub pending_requests: Vec<RequestSummary>,
    pub approved_requests: Vec<RequestSummary>,
    /// Whether the game feed connection is currently up.
    pub feed_connected: bool,
    pub generated_at: String,
}

/// Projection of a watched identity at a point in time.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WatchedSummary {
    pub id: String,
    pub namespace: Namespace,
    pub display_name: String,
    pub online: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_started_at: Option<String>,
    pub cumulative_online_ms: u64,
    /// Length of the open session, zero when offline.
    pub live_session_ms: u64,
    pub session_count: usize,
    pub added_at: String,
}

impl WatchedSummary {
    pub fn from_record(record: &WatchedIdentity, now: u64) -> Self {
        Self {
            id: record.identity.key(),
            namespace: record.identity.namespace(),
            display_name: record.display_name.clone(),
            online: record.is_online(),
            session_started_at: record.session_started_at().map(format_epoch_ms),
            cumulative_online_ms: record.cumulative_online_ms(),
            live_session_ms: record.live_session_ms(now),
            session_count: record.sessions().len(),
            added_at: format_epoch_ms(record.added_at),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RosterSummary {
    pub id: String,
    pub namespace: Namespace,
    pub display_name: String,
    pub last_seen_at: String,
}

impl From<&RosterEntry> for RosterSummary {
    fn from(entry: &RosterEntry) -> Self {
        Self {
            id: entry.identity.key(),
            namespace: entry.identity.namespace(),
            display_name: entry.display_name.clone(),
            last_seen_at: format_epoch_ms(entry.last_seen_at),
        }
    }
}

/// Join request as shown to dashboards, without its credential hash.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RequestSummary {
    pub id: Uuid,
    pub display_name: String,
    pub login_handle: String,
    pub status: RequestStatus,
    pub received_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decided_at: Option<String>,
}

impl From<&JoinRequest> for RequestSummary {
    fn from(request: &JoinRequest) -> Self {
        Self {
            id: request.id,
            display_name: request.display_name.clone(),
            login_handle: request.login_handle.clone(),
            status: request.status,
            received_at: format_epoch_ms(request.received_at),
            decided_at: request.decided_at.map(format_epoch_ms),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum PresenceEventKind {
    Online,
    Offline,
}

impl From<PresenceTransition> for PresenceEventKind {
    fn from(value: PresenceTransition) -> Self {
        match value {
            PresenceTransition::Online => PresenceEventKind::Online,
            PresenceTransition::Offline => PresenceEventKind::Offline,
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionSummary {
    pub start: String,
    pub end: String,
    pub duration_ms: u64,
}

impl From<Session> for SessionSummary {
    fn from(session: Session) -> Self {
        Self {
            start: format_epoch_ms(session.start_ms),
            end: format_epoch_ms(session.end_ms),
            duration_ms: session.duration_ms,
        }
    }
}

/// Broadcast whenever a watched identity goes online or offline.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PresenceChangedEvent {
    pub identity: String,
    pub display_name: String,
    pub event: PresenceEventKind,
    pub at: String,
    /// The session closed by an offline event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionSummary>,
}

impl From<&PresenceChange> for PresenceChangedEvent {
    fn from(change: &PresenceChange) -> Self {
        Self {
            identity: change.identity.key(),
            display_name: change.display_name.clone(),
            event: change.transition.into(),
            at: format_epoch_ms(change.at_ms),
            session: change.closed_session.map(Into::into),
        }
    }
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WatchAddedEvent {
    pub watched: WatchedSummary,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WatchRemovedEvent {
    pub identity: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RequestCreatedEvent {
    pub request: RequestSummary,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RequestDecidedEvent {
    pub request: RequestSummary,
    pub decision: Decision,
}

/// Broadcast when the game feed connects or drops.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FeedStatusEvent {
    pub connected: bool,
}
