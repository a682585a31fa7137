//! Push-style game feed: a WebSocket delivering team membership snapshots and deltas.

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use thiserror::Error;
use tokio::{net::TcpStream, time::sleep};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{self, Message},
};
use tracing::{debug, info, warn};

use crate::{
    config::FeedConfig,
    services::presence_service,
    state::{SharedState, identity::Identity, presence::Observation},
};

/// Frame asking the feed for a full membership snapshot.
const REQUEST_TEAM_INFO: &str = r#"{"type":"getTeamInfo"}"#;

type FeedSocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to connect to game feed")]
    Connect {
        #[source]
        source: tungstenite::Error,
    },
    #[error("failed to send to game feed")]
    Send {
        #[source]
        source: tungstenite::Error,
    },
    #[error("game feed read error")]
    Read {
        #[source]
        source: tungstenite::Error,
    },
    #[error("malformed game feed frame")]
    Decode {
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum FeedFrame {
    TeamInfo { members: Vec<FeedMember> },
    TeamChanged { members: Vec<FeedMember> },
    #[serde(other)]
    Other,
}

#[serde_as]
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FeedMember {
    /// Sent as a number by some feed versions and as a string by others.
    #[serde_as(as = "PickFirst<(_, DisplayFromStr)>")]
    steam_id: u64,
    #[serde(default)]
    name: Option<String>,
    is_online: bool,
}

impl From<FeedMember> for Observation {
    fn from(member: FeedMember) -> Self {
        Observation {
            identity: Identity::primary(member.steam_id.to_string()),
            online: member.is_online,
            display_name: member.name,
        }
    }
}

/// Decode one text frame. `Ok(None)` means the frame is valid but carries no membership.
pub fn parse_frame(text: &str) -> Result<Option<Vec<Observation>>, FeedError> {
    let frame: FeedFrame =
        serde_json::from_str(text).map_err(|source| FeedError::Decode { source })?;
    Ok(match frame {
        FeedFrame::TeamInfo { members } | FeedFrame::TeamChanged { members } => {
            Some(members.into_iter().map(Observation::from).collect())
        }
        FeedFrame::Other => None,
    })
}

/// Keep a connection to the game feed open, reconnecting with exponential backoff.
///
/// Connectivity is reported through the registry's feed flag only; a disconnect never
/// changes anyone's presence.
pub async fn run(state: SharedState, config: FeedConfig) {
    let mut delay = config.initial_backoff;

    loop {
        match connect(&config.url).await {
            Ok(socket) => {
                info!(url = %config.url, "connected to game feed");
                delay = config.initial_backoff;
                presence_service::set_feed_connected(&state, true).await;

                match pump(&state, socket).await {
                    Ok(()) => info!("game feed closed the connection"),
                    Err(err) => warn!(error = %err, "game feed connection lost"),
                }
                presence_service::set_feed_connected(&state, false).await;
            }
            Err(err) => {
                warn!(url = %config.url, error = %err, retry_in = ?delay, "game feed connection attempt failed");
            }
        }

        sleep(delay).await;
        delay = (delay * 2).min(config.max_backoff);
    }
}

async fn connect(url: &str) -> Result<FeedSocket, FeedError> {
    let (socket, _response) = connect_async(url)
        .await
        .map_err(|source| FeedError::Connect { source })?;
    Ok(socket)
}

/// Drive one connection until it closes or fails.
async fn pump(state: &SharedState, mut socket: FeedSocket) -> Result<(), FeedError> {
    socket
        .send(Message::Text(REQUEST_TEAM_INFO.into()))
        .await
        .map_err(|source| FeedError::Send { source })?;

    while let Some(next) = socket.next().await {
        let text = match next {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => return Ok(()),
            Ok(_) => continue,
            Err(source) => return Err(FeedError::Read { source }),
        };

        match parse_frame(text.as_str()) {
            Ok(Some(observations)) => {
                let count = observations.len();
                let changes = presence_service::apply_feed_snapshot(state, observations).await;
                debug!(members = count, transitions = changes.len(), "applied game feed frame");
            }
            Ok(None) => debug!("ignoring game feed frame"),
            Err(err) => warn!(error = %err, payload = %text.as_str(), "dropping game feed frame"),
        }
    }
    Ok(())
}
