use tracing::warn;

use crate::{dto::health::HealthResponse, services::presence_service, state::SharedState};

/// Report `degraded` while a configured game feed is disconnected.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let feed_configured = state.config().feed.is_some();
    let feed_connected = if feed_configured {
        Some(presence_service::feed_connected(state).await)
    } else {
        None
    };
    let response = HealthResponse::from_feed(feed_connected);
    if response.is_degraded() {
        warn!("game feed disconnected (degraded mode)");
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{AppConfig, FeedConfig},
        state::test_support,
    };

    #[tokio::test]
    async fn degraded_only_while_configured_feed_is_down() {
        let state = test_support::state();
        let status = health_status(&state).await;
        assert_eq!(status.status, "ok");
        assert!(status.feed_connected.is_none());

        let (state, _notifications) = test_support::state_with(AppConfig {
            feed: Some(FeedConfig {
                url: "ws://127.0.0.1:1".into(),
                initial_backoff: std::time::Duration::from_secs(1),
                max_backoff: std::time::Duration::from_secs(30),
            }),
            ..AppConfig::default()
        });
        assert_eq!(health_status(&state).await.status, "degraded");

        presence_service::set_feed_connected(&state, true).await;
        assert_eq!(health_status(&state).await.status, "ok");
    }
}
