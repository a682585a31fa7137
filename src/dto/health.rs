use serde::Serialize;
use utoipa::ToSchema;

/// Response of the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// "ok", or "degraded" while a configured game feed is down.
    pub status: String,
    /// `None` when no game feed is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feed_connected: Option<bool>,
}

impl HealthResponse {
    /// Derive the status from the game feed state.
    pub fn from_feed(feed_connected: Option<bool>) -> Self {
        let status = match feed_connected {
            Some(false) => "degraded",
            Some(true) | None => "ok",
        };
        Self {
            status: status.to_string(),
            feed_connected,
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.feed_connected == Some(false)
    }
}
