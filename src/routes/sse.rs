use std::convert::Infallible;

use axum::{Router, extract::State, response::sse::Sse, routing::get};
use futures::Stream;
use tracing::info;

use crate::{services::sse_service, state::SharedState};

#[utoipa::path(
    get,
    path = "/sse/dashboard",
    tag = "dashboard",
    responses((status = 200, description = "Snapshot followed by dashboard events", content_type = "text/event-stream", body = String))
)]
/// Stream the dashboard snapshot and every later event, read-only.
pub async fn dashboard_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<axum::response::sse::Event, Infallible>>> {
    let subscription = state.subscribe_dashboard().await;
    info!(subscriber = subscription.id(), "New dashboard SSE connection");
    sse_service::to_sse_stream(subscription)
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/sse/dashboard", get(dashboard_stream))
}
