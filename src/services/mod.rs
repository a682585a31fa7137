/// Dashboard message construction and broadcasting.
pub mod dashboard_events;
/// OpenAPI documentation generation.
pub mod documentation;
/// Game feed WebSocket client.
pub mod feed_producer;
/// Health check service.
pub mod health_service;
/// Join requests, approvals and member logins.
pub mod ledger_service;
/// Outbound notification sinks and their dispatcher.
pub mod notifier;
/// Background collection writers and flushes.
pub mod persistence;
/// Roster poll client.
pub mod poll_producer;
/// Watch list maintenance and presence reconciliation entry points.
pub mod presence_service;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// Dashboard WebSocket session handling.
pub mod websocket_service;
