use tracing::{info, warn};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        actions::{JoinRequestInput, LoginResponse},
        dashboard::RequestSummary,
    },
    error::ServiceError,
    services::dashboard_events,
    state::{
        SharedState,
        ledger::{Decision, LedgerChange, Member, MemberRole},
        now_ms,
    },
};

/// Record a new pending join request.
pub async fn submit(
    state: &SharedState,
    input: JoinRequestInput,
) -> Result<RequestSummary, ServiceError> {
    input.validate()?;
    let now = now_ms();

    let mut registry = state.registry().write().await;
    let request = registry.ledger.submit(input.into(), now)?;
    dashboard_events::broadcast_request_created(state, &request);
    state.persist_ledger(&registry);
    Ok(RequestSummary::from(&request))
}

/// Approve, deny or delete a join request.
pub async fn decide(
    state: &SharedState,
    id: Uuid,
    decision: Decision,
) -> Result<RequestSummary, ServiceError> {
    let now = now_ms();

    let mut registry = state.registry().write().await;
    let change = registry.ledger.decide(id, decision, now)?;
    match &change {
        LedgerChange::Approved {
            member: Some(member),
            ..
        } => info!(member_id = %member.id, role = ?member.role, "member admitted"),
        LedgerChange::Approved { member: None, .. } => {
            info!(request_id = %id, "handle already a member; request approved without a new member")
        }
        LedgerChange::Deleted {
            revoked_member: Some(member),
            ..
        } => warn!(member_id = %member.id, "membership revoked"),
        _ => {}
    }

    dashboard_events::broadcast_request_decided(state, &change);
    state.persist_ledger(&registry);
    Ok(RequestSummary::from(change.request()))
}

/// Verify a member's credential.
pub async fn login(
    state: &SharedState,
    login_handle: &str,
    credential: &str,
) -> Result<LoginResponse, ServiceError> {
    let now = now_ms();

    let mut registry = state.registry().write().await;
    let member = registry.ledger.login(login_handle, credential, now)?;
    info!(member_id = %member.id, "member logged in");
    state.persist_ledger(&registry);
    Ok(LoginResponse::from(&member))
}

/// Check that `member_id` still names an admin; memberships can be revoked mid-session.
pub async fn require_admin(
    state: &SharedState,
    member_id: Option<Uuid>,
) -> Result<Member, ServiceError> {
    let member_id = member_id
        .ok_or_else(|| ServiceError::Unauthorized("log in as an admin first".into()))?;
    let registry = state.registry().read().await;
    registry
        .ledger
        .members()
        .iter()
        .find(|member| member.id == member_id && member.role == MemberRole::Admin)
        .cloned()
        .ok_or_else(|| ServiceError::Unauthorized("admin role required".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::AppConfig,
        state::{ledger::RequestStatus, test_support},
    };

    fn input(handle: &str) -> JoinRequestInput {
        JoinRequestInput {
            display_name: "Player".into(),
            login_handle: handle.into(),
            credential: "hunter2".into(),
        }
    }

    fn admin_config() -> AppConfig {
        AppConfig {
            admin_handles: vec!["root".into()],
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn concurrent_case_variants_yield_one_pending_request() {
        let state = test_support::state();
        let (a, b) = tokio::join!(
            {
                let state = state.clone();
                tokio::spawn(async move { submit(&state, input("Ada")).await })
            },
            {
                let state = state.clone();
                tokio::spawn(async move { submit(&state, input("ada")).await })
            },
        );
        let outcomes = [a.unwrap(), b.unwrap()];

        assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
        assert!(
            outcomes
                .iter()
                .any(|o| matches!(o, Err(ServiceError::Conflict(_))))
        );
        let registry = state.registry().read().await;
        assert_eq!(registry.ledger.requests_with(RequestStatus::Pending).count(), 1);
    }

    #[tokio::test]
    async fn approval_admits_and_login_reports_role() {
        let (state, _notifications) = test_support::state_with(admin_config());
        let request = submit(&state, input("Root")).await.unwrap();

        let err = login(&state, "root", "hunter2").await.unwrap_err();
        assert_eq!(err.reason(), "request is awaiting approval");

        let decided = decide(&state, request.id, Decision::Approve).await.unwrap();
        assert_eq!(decided.status, RequestStatus::Approved);

        let response = login(&state, "ROOT", "hunter2").await.unwrap();
        assert_eq!(response.member_id, request.id);
        assert_eq!(response.role, MemberRole::Admin);
        assert!(require_admin(&state, Some(response.member_id)).await.is_ok());

        let err = login(&state, "root", "wrong").await.unwrap_err();
        assert_eq!(err.reason(), "invalid credentials");
    }

    #[tokio::test]
    async fn deleting_an_approved_request_revokes_admin_rights() {
        let (state, _notifications) = test_support::state_with(admin_config());
        let request = submit(&state, input("root")).await.unwrap();
        decide(&state, request.id, Decision::Approve).await.unwrap();
        assert!(require_admin(&state, Some(request.id)).await.is_ok());

        decide(&state, request.id, Decision::Delete).await.unwrap();
        assert!(matches!(
            require_admin(&state, Some(request.id)).await,
            Err(ServiceError::Unauthorized(_))
        ));
        assert!(matches!(
            decide(&state, request.id, Decision::Approve).await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn decisions_are_broadcast_without_credentials() {
        let state = test_support::state();
        let mut subscription = state.subscribe_dashboard().await;
        let request = submit(&state, input("bob")).await.unwrap();
        decide(&state, request.id, Decision::Deny).await.unwrap();

        let mut kinds = Vec::new();
        while let Some(event) = subscription.try_recv() {
            assert!(!event.data.contains("sha256$"));
            kinds.push(event.event.unwrap_or_default());
        }
        assert_eq!(kinds, vec!["snapshot", "requestCreated", "requestDecided"]);

        assert!(matches!(
            decide(&state, request.id, Decision::Approve).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn invalid_input_is_rejected_before_the_ledger() {
        let state = test_support::state();
        assert!(matches!(
            submit(&state, input("no spaces allowed")).await,
            Err(ServiceError::InvalidInput(_))
        ));
        let mut missing = input("carol");
        missing.credential.clear();
        assert!(matches!(
            submit(&state, missing).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }
}
