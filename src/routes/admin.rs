use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::Response,
    routing::{delete, post},
};
use uuid::Uuid;

use crate::{
    dto::{
        actions::{DecisionRequest, WatchAddRequest},
        dashboard::{RequestSummary, WatchedSummary},
    },
    error::AppError,
    services::{ledger_service, presence_service},
    state::{SharedState, credential::constant_time_eq},
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Admin-only endpoints for the watch list and join request decisions.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/admin/watch", post(add_watch))
        .route("/admin/watch/{id}", delete(remove_watch))
        .route("/admin/requests/{id}/decision", post(decide_request))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

/// Add an identity to the watch list.
#[utoipa::path(
    post,
    path = "/admin/watch",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Configured admin token")),
    request_body = WatchAddRequest,
    responses(
        (status = 201, description = "Identity watched", body = WatchedSummary),
        (status = 409, description = "Identity already watched")
    )
)]
pub async fn add_watch(
    State(state): State<SharedState>,
    Json(payload): Json<WatchAddRequest>,
) -> Result<(StatusCode, Json<WatchedSummary>), AppError> {
    let watched = presence_service::watch_add(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(watched)))
}

/// Remove an identity from the watch list.
#[utoipa::path(
    delete,
    path = "/admin/watch/{id}",
    tag = "admin",
    params(
        ("X-Admin-Token" = String, Header, description = "Configured admin token"),
        ("id" = String, Path, description = "Identity key; `bm_` prefix for polled players")
    ),
    responses(
        (status = 204, description = "Identity removed"),
        (status = 404, description = "Identity not watched")
    )
)]
pub async fn remove_watch(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    presence_service::watch_remove(&state, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Approve, deny or delete a join request.
#[utoipa::path(
    post,
    path = "/admin/requests/{id}/decision",
    tag = "admin",
    params(
        ("X-Admin-Token" = String, Header, description = "Configured admin token"),
        ("id" = Uuid, Path, description = "Join request identifier")
    ),
    request_body = DecisionRequest,
    responses(
        (status = 200, description = "Decision applied", body = RequestSummary),
        (status = 404, description = "Unknown request"),
        (status = 409, description = "Decision not allowed from the current status")
    )
)]
pub async fn decide_request(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DecisionRequest>,
) -> Result<Json<RequestSummary>, AppError> {
    let summary = ledger_service::decide(&state, id, payload.decision).await?;
    Ok(Json(summary))
}

async fn require_admin_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok());
    check_admin_token(state.config().admin_token.as_deref(), provided)?;
    Ok(next.run(req).await)
}

/// Without a configured token the admin surface stays closed.
fn check_admin_token(expected: Option<&str>, provided: Option<&str>) -> Result<(), AppError> {
    let provided = provided.ok_or_else(|| {
        AppError::Unauthorized("missing admin token header `X-Admin-Token`".into())
    })?;
    match expected {
        Some(token) if constant_time_eq(token, provided) => Ok(()),
        Some(_) => Err(AppError::Unauthorized("invalid admin token".into())),
        None => Err(AppError::Unauthorized("admin token not configured".into())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_token_must_be_configured_and_match() {
        assert!(check_admin_token(Some("s3cret"), Some("s3cret")).is_ok());
        assert!(matches!(
            check_admin_token(Some("s3cret"), Some("s3creT")),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            check_admin_token(Some("s3cret"), Some("guess")),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            check_admin_token(Some("s3cret"), None),
            Err(AppError::Unauthorized(_))
        ));
        assert!(matches!(
            check_admin_token(None, Some("anything")),
            Err(AppError::Unauthorized(_))
        ));
    }
}
