//! Inbound client actions and their responses, shared by the WebSocket and REST surfaces.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::validation::validate_login_handle,
    state::ledger::{Decision, Member, MemberRole, NewJoinRequest},
};

/// Action frame received on the dashboard WebSocket.
#[derive(Debug, Deserialize)]
pub struct ClientEnvelope {
    /// Opaque correlation id echoed back in the matching `actionResult`.
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(flatten)]
    pub action: ClientAction,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientAction {
    WatchAdd(WatchAddRequest),
    WatchRemove { id: String },
    SubmitJoinRequest(JoinRequestInput),
    DecideRequest { id: Uuid, decision: Decision },
    Login(LoginRequest),
}

impl ClientAction {
    pub fn name(&self) -> &'static str {
        match self {
            ClientAction::WatchAdd(_) => "watchAdd",
            ClientAction::WatchRemove { .. } => "watchRemove",
            ClientAction::SubmitJoinRequest(_) => "submitJoinRequest",
            ClientAction::DecideRequest { .. } => "decideRequest",
            ClientAction::Login(_) => "login",
        }
    }
}

/// Add an identity to the watch list. Keys prefixed with `bm_` address the polled roster.
#[derive(Debug, Deserialize, ToSchema)]
pub struct WatchAddRequest {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinRequestInput {
    #[validate(length(max = 64))]
    #[serde(default)]
    pub display_name: String,
    #[validate(custom(function = "validate_login_handle"))]
    #[serde(default)]
    pub login_handle: String,
    #[validate(length(max = 256))]
    #[serde(default)]
    pub credential: String,
}

impl From<JoinRequestInput> for NewJoinRequest {
    fn from(value: JoinRequestInput) -> Self {
        Self {
            display_name: value.display_name,
            login_handle: value.login_handle,
            credential: value.credential,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub login_handle: String,
    pub credential: String,
}

/// Minimal identity returned by a successful login.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LoginResponse {
    pub member_id: Uuid,
    pub login_handle: String,
    pub role: MemberRole,
}

impl From<&Member> for LoginResponse {
    fn from(member: &Member) -> Self {
        Self {
            member_id: member.id,
            login_handle: member.login_handle.clone(),
            role: member.role,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DecisionRequest {
    pub decision: Decision,
}

/// Outcome of one client action.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ActionResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub action: String,
    pub ok: bool,
    /// Human-readable outcome or failure reason.
    pub reason: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Object)]
    pub payload: Option<serde_json::Value>,
}
