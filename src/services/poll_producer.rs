//! Pull-style roster source: a public server listing fetched on a fixed interval.

use std::future::Future;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, warn};

use crate::{
    config::PollConfig,
    services::presence_service,
    state::{
        SharedState,
        identity::Identity,
        presence::{Observation, PresenceChange},
    },
};

const PLAYER_RESOURCE: &str = "player";

#[derive(Debug, Error)]
pub enum PollError {
    #[error("roster request failed")]
    Request {
        #[source]
        source: reqwest::Error,
    },
    #[error("roster endpoint answered {status}")]
    Status { status: StatusCode },
    #[error("failed to decode roster listing")]
    Decode {
        #[source]
        source: reqwest::Error,
    },
}

/// Server document listing the players currently connected.
#[derive(Debug, Default, Deserialize)]
pub struct PlayerListing {
    #[serde(default)]
    included: Vec<IncludedResource>,
}

#[derive(Debug, Deserialize)]
struct IncludedResource {
    #[serde(rename = "type")]
    kind: String,
    id: String,
    #[serde(default)]
    attributes: Option<PlayerAttributes>,
}

#[derive(Debug, Deserialize)]
struct PlayerAttributes {
    #[serde(default)]
    name: Option<String>,
}

impl PlayerListing {
    /// Every listed player as an online observation in the secondary namespace.
    pub fn into_observations(self) -> Vec<Observation> {
        self.included
            .into_iter()
            .filter(|resource| resource.kind == PLAYER_RESOURCE && !resource.id.is_empty())
            .map(|resource| Observation {
                identity: Identity::secondary(resource.id),
                online: true,
                display_name: resource.attributes.and_then(|attributes| attributes.name),
            })
            .collect()
    }
}

/// Build the HTTP client used for polling; every request is bounded by the configured timeout.
pub fn build_client(config: &PollConfig) -> reqwest::Result<Client> {
    Client::builder().timeout(config.timeout).build()
}

/// Fetch and decode the current listing.
pub async fn fetch_listing(client: &Client, url: &str) -> Result<Vec<Observation>, PollError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|source| PollError::Request { source })?;
    let status = response.status();
    if !status.is_success() {
        return Err(PollError::Status { status });
    }
    let listing: PlayerListing = response
        .json()
        .await
        .map_err(|source| PollError::Decode { source })?;
    Ok(listing.into_observations())
}

/// Run one poll cycle. The registry is only touched once the fetch fully succeeded, so a
/// failed poll is a no-op.
pub async fn poll_once<F, Fut>(state: &SharedState, fetch: F) -> Option<Vec<PresenceChange>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<Observation>, PollError>>,
{
    match fetch().await {
        Ok(listed) => {
            let count = listed.len();
            let changes = presence_service::apply_poll_listing(state, listed).await;
            debug!(players = count, transitions = changes.len(), "applied roster poll");
            Some(changes)
        }
        Err(err) => {
            warn!(error = %err, "roster poll failed; keeping previous roster");
            None
        }
    }
}

/// Poll the roster endpoint forever.
pub async fn run(state: SharedState, client: Client, config: PollConfig) {
    let mut ticker = interval(config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        poll_once(&state, || fetch_listing(&client, &config.url)).await;
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    use super::*;
    use crate::{
        dto::actions::WatchAddRequest,
        state::{identity::Namespace, test_support},
    };

    fn poll_config(url: String) -> PollConfig {
        PollConfig {
            url,
            interval: Duration::from_secs(30),
            timeout: Duration::from_millis(300),
        }
    }

    /// Answer every connection with the same raw HTTP response.
    async fn serve(response: String) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let mut request = [0u8; 1024];
                let _ = socket.read(&mut request).await;
                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            }
        });
        format!("http://{addr}/players")
    }

    /// Accept connections and never answer them.
    async fn serve_nothing() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });
        format!("http://{addr}/players")
    }

    fn http_response(status: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    fn listing(json: &str) -> Vec<Observation> {
        serde_json::from_str::<PlayerListing>(json)
            .unwrap()
            .into_observations()
    }

    #[test]
    fn keeps_only_player_resources() {
        let observations = listing(
            r#"{"data":{"id":"1"},"included":[
                {"type":"player","id":"42","attributes":{"name":"Bob"}},
                {"type":"server","id":"9","attributes":{"name":"Main"}},
                {"type":"player","id":"43"}
            ]}"#,
        );

        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].identity.key(), "bm_42");
        assert_eq!(observations[0].identity.namespace(), Namespace::Secondary);
        assert_eq!(observations[0].display_name.as_deref(), Some("Bob"));
        assert!(observations[1].display_name.is_none());
        assert!(observations.iter().all(|o| o.online));
    }

    #[test]
    fn empty_document_lists_nobody() {
        assert!(listing("{}").is_empty());
    }

    #[tokio::test]
    async fn failed_poll_is_a_no_op() {
        let state = test_support::state();
        presence_service::watch_add(
            &state,
            WatchAddRequest {
                id: "bm_42".into(),
                name: None,
            },
        )
        .await
        .unwrap();
        let applied = poll_once(&state, || async {
            Ok(vec![Observation::online(Identity::secondary("42"), "Bob")])
        })
        .await;
        assert_eq!(applied.map(|changes| changes.len()), Some(1));
        let before = presence_service::snapshot(&state).await;

        let failed = poll_once(&state, || async {
            Err(PollError::Status {
                status: StatusCode::BAD_GATEWAY,
            })
        })
        .await;
        assert!(failed.is_none());

        let after = presence_service::snapshot(&state).await;
        assert!(after.watched[0].online);
        assert_eq!(after.watched[0].session_started_at, before.watched[0].session_started_at);
        assert_eq!(
            after.watched[0].cumulative_online_ms,
            before.watched[0].cumulative_online_ms
        );
        assert_eq!(after.roster.len(), 1);
    }

    #[tokio::test]
    async fn fetches_and_decodes_a_served_listing() {
        let url = serve(http_response(
            "200 OK",
            "application/json",
            r#"{"included":[{"type":"player","id":"42","attributes":{"name":"Bob"}}]}"#,
        ))
        .await;
        let config = poll_config(url);
        let client = build_client(&config).unwrap();

        let observations = fetch_listing(&client, &config.url).await.unwrap();
        assert_eq!(observations, vec![Observation::online(Identity::secondary("42"), "Bob")]);
    }

    #[tokio::test]
    async fn stalled_endpoint_times_out_and_keeps_the_roster() {
        let state = test_support::state();
        apply_listing_of(&state, "7").await;

        let config = poll_config(serve_nothing().await);
        let client = build_client(&config).unwrap();
        let started = std::time::Instant::now();
        let applied = tokio::time::timeout(
            Duration::from_secs(5),
            poll_once(&state, || fetch_listing(&client, &config.url)),
        )
        .await
        .expect("poll must give up after the client timeout");

        assert!(applied.is_none());
        assert!(started.elapsed() >= config.timeout);
        let roster = presence_service::online_roster(&state).await;
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].id, "bm_7");
    }

    #[tokio::test]
    async fn bad_gateway_is_a_failed_poll() {
        let config = poll_config(serve(http_response("502 Bad Gateway", "text/plain", "")).await);
        let client = build_client(&config).unwrap();

        let err = fetch_listing(&client, &config.url).await.unwrap_err();
        assert!(matches!(
            err,
            PollError::Status { status } if status == StatusCode::BAD_GATEWAY
        ));
    }

    #[tokio::test]
    async fn non_json_body_is_a_failed_poll() {
        let state = test_support::state();
        apply_listing_of(&state, "7").await;
        let config = poll_config(
            serve(http_response("200 OK", "text/html", "<html>maintenance</html>")).await,
        );
        let client = build_client(&config).unwrap();

        let err = fetch_listing(&client, &config.url).await.unwrap_err();
        assert!(matches!(err, PollError::Decode { .. }));

        assert!(poll_once(&state, || fetch_listing(&client, &config.url)).await.is_none());
        assert_eq!(presence_service::online_roster(&state).await.len(), 1);
    }

    async fn apply_listing_of(state: &SharedState, raw_id: &str) {
        presence_service::apply_poll_listing(
            state,
            vec![Observation::online(Identity::secondary(raw_id), "listed")],
        )
        .await;
    }
}
