use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use axum_valid::Valid;

use crate::{
    dto::{
        actions::{JoinRequestInput, LoginRequest, LoginResponse},
        dashboard::RequestSummary,
    },
    error::AppError,
    services::ledger_service,
    state::SharedState,
};

/// Open ledger endpoints: join requests and member login.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/requests", post(submit_request))
        .route("/login", post(login))
}

/// Submit a join request for admin review.
#[utoipa::path(
    post,
    path = "/requests",
    tag = "ledger",
    request_body = JoinRequestInput,
    responses(
        (status = 201, description = "Request recorded as pending", body = RequestSummary),
        (status = 400, description = "Missing or malformed field"),
        (status = 409, description = "Login handle already taken or awaiting approval")
    )
)]
pub async fn submit_request(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<JoinRequestInput>>,
) -> Result<(StatusCode, Json<RequestSummary>), AppError> {
    let summary = ledger_service::submit(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Verify a member's credential.
#[utoipa::path(
    post,
    path = "/login",
    tag = "ledger",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = LoginResponse),
        (status = 401, description = "Invalid credentials or awaiting approval")
    )
)]
pub async fn login(
    State(state): State<SharedState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let response =
        ledger_service::login(&state, &payload.login_handle, &payload.credential).await?;
    Ok(Json(response))
}
