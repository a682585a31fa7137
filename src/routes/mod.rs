use axum::Router;

use crate::state::SharedState;

pub mod admin;
pub mod dashboard;
pub mod docs;
pub mod health;
pub mod requests;
pub mod sse;
pub mod websocket;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(dashboard::router())
        .merge(requests::router())
        .merge(sse::router())
        .merge(websocket::router())
        .merge(admin::router(state.clone()));

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}
