use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI document for the presence relay.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::dashboard::dashboard_snapshot,
        crate::routes::dashboard::online_roster,
        crate::routes::requests::submit_request,
        crate::routes::requests::login,
        crate::routes::admin::add_watch,
        crate::routes::admin::remove_watch,
        crate::routes::admin::decide_request,
        crate::routes::sse::dashboard_stream,
        crate::routes::websocket::ws_handler,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::dashboard::DashboardSnapshot,
            crate::dto::dashboard::PresenceChangedEvent,
            crate::dto::dashboard::WatchAddedEvent,
            crate::dto::dashboard::WatchRemovedEvent,
            crate::dto::dashboard::RequestCreatedEvent,
            crate::dto::dashboard::RequestDecidedEvent,
            crate::dto::dashboard::FeedStatusEvent,
            crate::dto::actions::ActionResult,
            crate::dto::actions::LoginRequest,
            crate::dto::actions::LoginResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "dashboard", description = "Snapshot, roster and live event streams"),
        (name = "ledger", description = "Join requests and member login"),
        (name = "admin", description = "Watch list and request decisions"),
    )
)]
pub struct ApiDoc;
