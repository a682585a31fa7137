use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::dashboard::{DashboardSnapshot, RosterSummary},
    services::presence_service,
    state::SharedState,
};

/// Read-only dashboard queries.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/dashboard/snapshot", get(dashboard_snapshot))
        .route("/roster/online", get(online_roster))
}

/// Current watch list, roster and request lists, as sent to new dashboard subscribers.
#[utoipa::path(
    get,
    path = "/dashboard/snapshot",
    tag = "dashboard",
    responses((status = 200, description = "Point-in-time dashboard view", body = DashboardSnapshot))
)]
pub async fn dashboard_snapshot(State(state): State<SharedState>) -> Json<DashboardSnapshot> {
    Json(presence_service::snapshot(&state).await)
}

/// Every player currently visible on the server, watched or not.
#[utoipa::path(
    get,
    path = "/roster/online",
    tag = "dashboard",
    responses((status = 200, description = "Visible players from both sources", body = [RosterSummary]))
)]
pub async fn online_roster(State(state): State<SharedState>) -> Json<Vec<RosterSummary>> {
    Json(presence_service::online_roster(&state).await)
}
