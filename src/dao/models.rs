use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::{
    identity::Namespace,
    ledger::{MemberRole, RequestStatus},
};

/// Persisted watched player, one entry of the presence collection.
///
/// The online flag is not stored: a record is online exactly when
/// `session_started_at_ms` is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WatchedIdentityEntity {
    /// Source namespace of the identity.
    pub namespace: Namespace,
    /// Id as reported by the source, without prefix.
    pub raw_id: String,
    /// Last known display name.
    pub display_name: String,
    /// Start of the open session, epoch milliseconds.
    #[serde(default)]
    pub session_started_at_ms: Option<u64>,
    /// Sum of every closed session duration.
    #[serde(default)]
    pub cumulative_online_ms: u64,
    /// Closed sessions, oldest first.
    #[serde(default)]
    pub sessions: Vec<SessionEntity>,
    /// Time the identity was added to the watch list.
    pub added_at_ms: u64,
}

/// Closed online interval.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Session start, epoch milliseconds.
    pub start_ms: u64,
    /// Session end, epoch milliseconds.
    pub end_ms: u64,
    /// `end_ms - start_ms`, stored as accounted.
    pub duration_ms: u64,
}

/// Persisted join request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JoinRequestEntity {
    /// Request identifier, reused as the member id on approval.
    pub id: Uuid,
    /// Name shown on the dashboard.
    pub display_name: String,
    /// Login handle as submitted; uniqueness is case-insensitive.
    pub login_handle: String,
    /// Salted credential hash, never the raw credential.
    pub credential_hash: String,
    /// Current lifecycle status.
    pub status: RequestStatus,
    /// Submission time, epoch milliseconds.
    pub received_at_ms: u64,
    /// Time of the approve or deny decision.
    #[serde(default)]
    pub decided_at_ms: Option<u64>,
}

/// Persisted member derived from an approved request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberEntity {
    /// Id of the request the member was derived from.
    pub id: Uuid,
    /// Login handle copied from the approved request.
    pub login_handle: String,
    /// Salted credential hash copied from the approved request.
    pub credential_hash: String,
    /// Role granted at approval.
    pub role: MemberRole,
    /// Approval time, epoch milliseconds.
    pub approved_at_ms: u64,
    /// Most recent successful login.
    #[serde(default)]
    pub last_login_at_ms: Option<u64>,
}

/// Whole ledger collection: requests and the members derived from them.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LedgerEntity {
    /// Requests in submission order.
    #[serde(default)]
    pub requests: Vec<JoinRequestEntity>,
    /// Members in approval order.
    #[serde(default)]
    pub members: Vec<MemberEntity>,
}
