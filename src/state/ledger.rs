//! Join-request workflow: pending requests, their decisions, and the member
//! records derived from approvals.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{JoinRequestEntity, LedgerEntity, MemberEntity},
    state::credential::{hash_credential, verify_credential},
};

/// Lifecycle status of a join request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Denied,
}

/// Role granted to a member on approval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum MemberRole {
    Admin,
    Member,
}

/// Decision applied to an existing request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Deny,
    Delete,
}

/// Validated submission accepted by [`Ledger::submit`].
#[derive(Debug, Clone)]
pub struct NewJoinRequest {
    pub display_name: String,
    pub login_handle: String,
    pub credential: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRequest {
    pub id: Uuid,
    pub display_name: String,
    pub login_handle: String,
    pub credential_hash: String,
    pub status: RequestStatus,
    pub received_at: u64,
    pub decided_at: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    /// Same id as the request the member was derived from.
    pub id: Uuid,
    pub login_handle: String,
    pub credential_hash: String,
    pub role: MemberRole,
    pub approved_at: u64,
    pub last_login_at: Option<u64>,
}

/// Result of a successful decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerChange {
    Approved {
        request: JoinRequest,
        /// `None` when a member with the same handle already existed.
        member: Option<Member>,
    },
    Denied {
        request: JoinRequest,
    },
    Deleted {
        request: JoinRequest,
        revoked_member: Option<Member>,
    },
}

impl LedgerChange {
    pub fn request(&self) -> &JoinRequest {
        match self {
            LedgerChange::Approved { request, .. }
            | LedgerChange::Denied { request }
            | LedgerChange::Deleted { request, .. } => request,
        }
    }

    pub fn decision(&self) -> Decision {
        match self {
            LedgerChange::Approved { .. } => Decision::Approve,
            LedgerChange::Denied { .. } => Decision::Deny,
            LedgerChange::Deleted { .. } => Decision::Delete,
        }
    }
}

/// Validation failures reported back to the originating client action.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("missing {0}")]
    MissingField(&'static str),
    #[error("login handle `{0}` is already taken or awaiting approval")]
    DuplicateHandle(String),
    #[error("unknown request `{0}`")]
    UnknownRequest(Uuid),
    #[error("request `{id}` is already {status:?}; {decision:?} is not allowed")]
    AlreadyDecided {
        id: Uuid,
        status: RequestStatus,
        decision: Decision,
    },
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("request is awaiting approval")]
    AwaitingApproval,
}

#[derive(Debug, Default)]
pub struct Ledger {
    requests: Vec<JoinRequest>,
    members: Vec<Member>,
    admin_handles: HashSet<String>,
}

impl Ledger {
    /// Empty ledger granting the admin role to the given handles on approval.
    pub fn new(admin_handles: &[String]) -> Self {
        Self {
            requests: Vec::new(),
            members: Vec::new(),
            admin_handles: admin_handles.iter().map(|h| normalize(h)).collect(),
        }
    }

    /// Restore a ledger from its persisted collection.
    pub fn from_entity(entity: LedgerEntity, admin_handles: &[String]) -> Self {
        Self {
            requests: entity.requests.into_iter().map(Into::into).collect(),
            members: entity.members.into_iter().map(Into::into).collect(),
            ..Self::new(admin_handles)
        }
    }

    /// Snapshot the ledger in its persisted shape.
    pub fn to_entity(&self) -> LedgerEntity {
        LedgerEntity {
            requests: self.requests.iter().cloned().map(Into::into).collect(),
            members: self.members.iter().cloned().map(Into::into).collect(),
        }
    }

    pub fn requests_with(&self, status: RequestStatus) -> impl Iterator<Item = &JoinRequest> {
        self.requests
            .iter()
            .filter(move |request| request.status == status)
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    /// Record a new pending request.
    ///
    /// The handle must not match, case-insensitively, any pending request or any member. The
    /// check and the insertion happen under the same exclusive borrow.
    pub fn submit(&mut self, input: NewJoinRequest, now: u64) -> Result<JoinRequest, LedgerError> {
        let login_handle = input.login_handle.trim().to_string();
        let display_name = input.display_name.trim().to_string();
        if login_handle.is_empty() {
            return Err(LedgerError::MissingField("login handle"));
        }
        if input.credential.is_empty() {
            return Err(LedgerError::MissingField("credential"));
        }

        let key = normalize(&login_handle);
        let taken = self
            .requests_with(RequestStatus::Pending)
            .any(|request| normalize(&request.login_handle) == key)
            || self
                .members
                .iter()
                .any(|member| normalize(&member.login_handle) == key);
        if taken {
            return Err(LedgerError::DuplicateHandle(login_handle));
        }

        let request = JoinRequest {
            id: Uuid::new_v4(),
            display_name: if display_name.is_empty() {
                login_handle.clone()
            } else {
                display_name
            },
            login_handle,
            credential_hash: hash_credential(&input.credential),
            status: RequestStatus::Pending,
            received_at: now,
            decided_at: None,
        };
        self.requests.push(request.clone());
        info!(request_id = %request.id, handle = %request.login_handle, "join request received");
        Ok(request)
    }

    /// Apply a decision to an existing request.
    pub fn decide(
        &mut self,
        id: Uuid,
        decision: Decision,
        now: u64,
    ) -> Result<LedgerChange, LedgerError> {
        let index = self
            .requests
            .iter()
            .position(|request| request.id == id)
            .ok_or(LedgerError::UnknownRequest(id))?;
        let status = self.requests[index].status;

        let change = match (status, decision) {
            (RequestStatus::Pending, Decision::Approve) => {
                let request = &mut self.requests[index];
                request.status = RequestStatus::Approved;
                request.decided_at = Some(now);
                let request = request.clone();
                let member = self.admit(&request, now);
                LedgerChange::Approved { request, member }
            }
            (RequestStatus::Pending, Decision::Deny) => {
                let request = &mut self.requests[index];
                request.status = RequestStatus::Denied;
                request.decided_at = Some(now);
                LedgerChange::Denied {
                    request: request.clone(),
                }
            }
            (_, Decision::Delete) => {
                let request = self.requests.remove(index);
                let revoked_member = self
                    .members
                    .iter()
                    .position(|member| member.id == request.id)
                    .map(|position| self.members.remove(position));
                LedgerChange::Deleted {
                    request,
                    revoked_member,
                }
            }
            (status, decision) => {
                return Err(LedgerError::AlreadyDecided {
                    id,
                    status,
                    decision,
                });
            }
        };

        info!(request_id = %id, ?decision, "join request decided");
        Ok(change)
    }

    /// Verify a member's credential and record the login time.
    pub fn login(&mut self, handle: &str, credential: &str, now: u64) -> Result<Member, LedgerError> {
        let key = normalize(handle);
        if let Some(member) = self
            .members
            .iter_mut()
            .find(|member| normalize(&member.login_handle) == key)
        {
            if !verify_credential(credential, &member.credential_hash) {
                return Err(LedgerError::InvalidCredentials);
            }
            member.last_login_at = Some(now);
            return Ok(member.clone());
        }

        let awaiting = self
            .requests_with(RequestStatus::Pending)
            .find(|request| normalize(&request.login_handle) == key)
            .is_some_and(|request| verify_credential(credential, &request.credential_hash));
        if awaiting {
            Err(LedgerError::AwaitingApproval)
        } else {
            Err(LedgerError::InvalidCredentials)
        }
    }

    /// Derive the member for an approved request unless the handle already has one.
    fn admit(&mut self, request: &JoinRequest, now: u64) -> Option<Member> {
        let key = normalize(&request.login_handle);
        if self
            .members
            .iter()
            .any(|member| normalize(&member.login_handle) == key)
        {
            return None;
        }

        let role = if self.admin_handles.contains(&key) {
            MemberRole::Admin
        } else {
            MemberRole::Member
        };
        let member = Member {
            id: request.id,
            login_handle: request.login_handle.clone(),
            credential_hash: request.credential_hash.clone(),
            role,
            approved_at: now,
            last_login_at: None,
        };
        self.members.push(member.clone());
        Some(member)
    }
}

fn normalize(handle: &str) -> String {
    handle.trim().to_lowercase()
}

impl From<JoinRequestEntity> for JoinRequest {
    fn from(value: JoinRequestEntity) -> Self {
        Self {
            id: value.id,
            display_name: value.display_name,
            login_handle: value.login_handle,
            credential_hash: value.credential_hash,
            status: value.status,
            received_at: value.received_at_ms,
            decided_at: value.decided_at_ms,
        }
    }
}

impl From<JoinRequest> for JoinRequestEntity {
    fn from(value: JoinRequest) -> Self {
        Self {
            id: value.id,
            display_name: value.display_name,
            login_handle: value.login_handle,
            credential_hash: value.credential_hash,
            status: value.status,
            received_at_ms: value.received_at,
            decided_at_ms: value.decided_at,
        }
    }
}

impl From<MemberEntity> for Member {
    fn from(value: MemberEntity) -> Self {
        Self {
            id: value.id,
            login_handle: value.login_handle,
            credential_hash: value.credential_hash,
            role: value.role,
            approved_at: value.approved_at_ms,
            last_login_at: value.last_login_at_ms,
        }
    }
}

impl From<Member> for MemberEntity {
    fn from(value: Member) -> Self {
        Self {
            id: value.id,
            login_handle: value.login_handle,
            credential_hash: value.credential_hash,
            role: value.role,
            approved_at_ms: value.approved_at,
            last_login_at_ms: value.last_login_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission(handle: &str) -> NewJoinRequest {
        NewJoinRequest {
            display_name: "Rusty".into(),
            login_handle: handle.into(),
            credential: "hunter2".into(),
        }
    }

    #[test]
    fn handles_are_unique_across_pending_requests_ignoring_case() {
        let mut ledger = Ledger::default();
        ledger.submit(submission("Rusty"), 1).unwrap();
        assert_eq!(
            ledger.submit(submission("rUSTY"), 2).unwrap_err(),
            LedgerError::DuplicateHandle("rUSTY".into())
        );
        assert_eq!(ledger.requests_with(RequestStatus::Pending).count(), 1);
    }

    #[test]
    fn handles_are_unique_against_members() {
        let mut ledger = Ledger::default();
        let request = ledger.submit(submission("rusty"), 1).unwrap();
        ledger.decide(request.id, Decision::Approve, 2).unwrap();

        assert!(matches!(
            ledger.submit(submission("RUSTY"), 3),
            Err(LedgerError::DuplicateHandle(_))
        ));
    }

    #[test]
    fn denied_handles_can_apply_again() {
        let mut ledger = Ledger::default();
        let request = ledger.submit(submission("rusty"), 1).unwrap();
        ledger.decide(request.id, Decision::Deny, 2).unwrap();
        assert!(ledger.submit(submission("rusty"), 3).is_ok());
    }

    #[test]
    fn missing_fields_are_rejected() {
        let mut ledger = Ledger::default();
        let mut input = submission("rusty");
        input.credential.clear();
        assert_eq!(
            ledger.submit(input, 1).unwrap_err(),
            LedgerError::MissingField("credential")
        );
        assert_eq!(
            ledger.submit(submission("   "), 1).unwrap_err(),
            LedgerError::MissingField("login handle")
        );
    }

    #[test]
    fn approval_creates_exactly_one_member() {
        let mut ledger = Ledger::new(&["Rusty".to_string()]);
        let request = ledger.submit(submission("rusty"), 1).unwrap();
        let change = ledger.decide(request.id, Decision::Approve, 5).unwrap();

        let LedgerChange::Approved { request, member } = change else {
            panic!("expected approval");
        };
        assert_eq!(request.status, RequestStatus::Approved);
        assert_eq!(request.decided_at, Some(5));
        let member = member.unwrap();
        assert_eq!(member.id, request.id);
        assert_eq!(member.role, MemberRole::Admin);
        assert_eq!(ledger.members().len(), 1);
    }

    #[test]
    fn approving_a_handle_that_already_has_a_member_only_marks_the_request() {
        let existing = Member {
            id: Uuid::new_v4(),
            login_handle: "Rusty".into(),
            credential_hash: hash_credential("x"),
            role: MemberRole::Member,
            approved_at: 0,
            last_login_at: None,
        };
        let request = JoinRequest {
            id: Uuid::new_v4(),
            display_name: "Rusty".into(),
            login_handle: "rusty".into(),
            credential_hash: hash_credential("y"),
            status: RequestStatus::Pending,
            received_at: 0,
            decided_at: None,
        };
        let mut ledger = Ledger::from_entity(
            LedgerEntity {
                requests: vec![request.clone().into()],
                members: vec![existing.into()],
            },
            &[],
        );

        let change = ledger.decide(request.id, Decision::Approve, 9).unwrap();
        assert!(matches!(change, LedgerChange::Approved { member: None, .. }));
        assert_eq!(ledger.members().len(), 1);
        assert_eq!(ledger.requests_with(RequestStatus::Approved).count(), 1);
    }

    #[test]
    fn decided_requests_never_return_to_pending() {
        let mut ledger = Ledger::default();
        let request = ledger.submit(submission("rusty"), 1).unwrap();
        ledger.decide(request.id, Decision::Deny, 2).unwrap();

        for decision in [Decision::Approve, Decision::Deny] {
            assert!(matches!(
                ledger.decide(request.id, decision, 3),
                Err(LedgerError::AlreadyDecided { .. })
            ));
        }
    }

    #[test]
    fn deleting_an_approved_request_revokes_the_member() {
        let mut ledger = Ledger::default();
        let request = ledger.submit(submission("rusty"), 1).unwrap();
        ledger.decide(request.id, Decision::Approve, 2).unwrap();

        let change = ledger.decide(request.id, Decision::Delete, 3).unwrap();
        let LedgerChange::Deleted { revoked_member, .. } = change else {
            panic!("expected deletion");
        };
        assert_eq!(revoked_member.unwrap().id, request.id);
        assert!(ledger.members().is_empty());
        assert_eq!(
            ledger.decide(request.id, Decision::Delete, 4).unwrap_err(),
            LedgerError::UnknownRequest(request.id)
        );
    }

    #[test]
    fn login_checks_credentials_and_records_the_time() {
        let mut ledger = Ledger::default();
        let request = ledger.submit(submission("Rusty"), 1).unwrap();

        assert_eq!(
            ledger.login("rusty", "hunter2", 2).unwrap_err(),
            LedgerError::AwaitingApproval
        );
        assert_eq!(
            ledger.login("rusty", "wrong", 2).unwrap_err(),
            LedgerError::InvalidCredentials
        );

        ledger.decide(request.id, Decision::Approve, 3).unwrap();
        let member = ledger.login("RUSTY", "hunter2", 4).unwrap();
        assert_eq!(member.last_login_at, Some(4));
        assert_eq!(
            ledger.login("rusty", "wrong", 5).unwrap_err(),
            LedgerError::InvalidCredentials
        );
        assert_eq!(
            ledger.login("nobody", "hunter2", 5).unwrap_err(),
            LedgerError::InvalidCredentials
        );
    }
}
