use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        actions::{ActionResult, ClientAction, ClientEnvelope},
        dashboard::DashboardMessage,
    },
    error::ServiceError,
    services::{dashboard_events, ledger_service, presence_service},
    state::{SharedState, hub::Subscription, ledger::Decision},
};

/// Per-connection state of a dashboard session.
#[derive(Debug, Default)]
struct DashboardSession {
    /// Member the session logged in as.
    member_id: Option<Uuid>,
}

/// Outcome of a successful action: reason plus optional payload.
type ActionOutcome = (String, Option<serde_json::Value>);

/// Handle the full lifecycle of a dashboard WebSocket connection.
///
/// The snapshot is the first frame the client receives; every later event follows in
/// publish order. Client actions are answered with an `actionResult` frame.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let subscription = state.subscribe_dashboard().await;
    let subscriber = subscription.id();
    let forwarder_task = tokio::spawn(forward_events(subscription, outbound_tx.clone()));
    info!(subscriber, "dashboard connected");

    let mut session = DashboardSession::default();
    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let result = handle_action(&state, &mut session, text.as_str()).await;
                if send_message_to_websocket(&outbound_tx, &DashboardMessage::ActionResult(result))
                    .is_err()
                {
                    break;
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(subscriber, error = %err, "websocket error");
                break;
            }
        }
    }

    // Dropping the subscription inside the aborted task unsubscribes immediately.
    forwarder_task.abort();
    let _ = forwarder_task.await;
    info!(subscriber, "dashboard disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Relay hub events to the socket writer until either side goes away.
async fn forward_events(mut subscription: Subscription, tx: mpsc::UnboundedSender<Message>) {
    loop {
        tokio::select! {
            _ = tx.closed() => break,
            event = subscription.recv() => {
                let Some(event) = event else { break };
                if tx.send(Message::Text(event.data.into())).is_err() {
                    break;
                }
            }
        }
    }
}

/// Parse and execute one client frame, always producing a result for the client.
async fn handle_action(
    state: &SharedState,
    session: &mut DashboardSession,
    text: &str,
) -> ActionResult {
    let envelope = match serde_json::from_str::<ClientEnvelope>(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            warn!(error = %err, "failed to parse dashboard action");
            return ActionResult {
                request_id: None,
                action: "unknown".into(),
                ok: false,
                reason: format!("malformed action: {err}"),
                payload: None,
            };
        }
    };

    let action = envelope.action.name();
    match dispatch(state, session, envelope.action).await {
        Ok((reason, payload)) => ActionResult {
            request_id: envelope.request_id,
            action: action.into(),
            ok: true,
            reason,
            payload,
        },
        Err(err) => {
            debug!(action, error = %err, "dashboard action rejected");
            ActionResult {
                request_id: envelope.request_id,
                action: action.into(),
                ok: false,
                reason: err.reason().to_string(),
                payload: None,
            }
        }
    }
}

async fn dispatch(
    state: &SharedState,
    session: &mut DashboardSession,
    action: ClientAction,
) -> Result<ActionOutcome, ServiceError> {
    match action {
        ClientAction::WatchAdd(request) => {
            ledger_service::require_admin(state, session.member_id).await?;
            let watched = presence_service::watch_add(state, request).await?;
            Ok((format!("watching {}", watched.id), to_payload(&watched)))
        }
        ClientAction::WatchRemove { id } => {
            ledger_service::require_admin(state, session.member_id).await?;
            presence_service::watch_remove(state, &id).await?;
            Ok((format!("stopped watching {id}"), None))
        }
        ClientAction::SubmitJoinRequest(input) => {
            let request = ledger_service::submit(state, input).await?;
            Ok(("request received".into(), to_payload(&request)))
        }
        ClientAction::DecideRequest { id, decision } => {
            ledger_service::require_admin(state, session.member_id).await?;
            let request = ledger_service::decide(state, id, decision).await?;
            let outcome = match decision {
                Decision::Approve => "request approved",
                Decision::Deny => "request denied",
                Decision::Delete => "request deleted",
            };
            Ok((outcome.into(), to_payload(&request)))
        }
        ClientAction::Login(credentials) => {
            // A failed attempt leaves the session logged out.
            session.member_id = None;
            let response =
                ledger_service::login(state, &credentials.login_handle, &credentials.credential)
                    .await?;
            session.member_id = Some(response.member_id);
            Ok(("logged in".into(), to_payload(&response)))
        }
    }
}

fn to_payload<T: Serialize>(value: &T) -> Option<serde_json::Value> {
    serde_json::to_value(value)
        .inspect_err(|err| warn!(error = %err, "failed to serialise action payload"))
        .ok()
}

/// Serialize a dashboard message and push it onto the socket writer.
///
/// Fails only when the writer channel is closed.
fn send_message_to_websocket(
    tx: &mpsc::UnboundedSender<Message>,
    message: &DashboardMessage,
) -> Result<(), ServiceError> {
    let event = dashboard_events::encode(message);
    tx.send(Message::Text(event.data.into()))
        .map_err(|_| ServiceError::InvalidState("connection closed".into()))
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use serde_json::Value;

    use super::*;
    use crate::{config::AppConfig, state::test_support};

    fn admin_state() -> SharedState {
        test_support::state_with(AppConfig {
            admin_handles: vec!["root".into()],
            ..AppConfig::default()
        })
        .0
    }

    async fn act(
        state: &SharedState,
        session: &mut DashboardSession,
        frame: Value,
    ) -> ActionResult {
        handle_action(state, session, &frame.to_string()).await
    }

    #[tokio::test]
    async fn admin_actions_require_an_admin_login() {
        let state = admin_state();
        let mut session = DashboardSession::default();

        let denied = act(
            &state,
            &mut session,
            serde_json::json!({"type": "watchAdd", "request_id": "1", "id": "bm_42"}),
        )
        .await;
        assert!(!denied.ok);
        assert_eq!(denied.request_id.as_deref(), Some("1"));
        assert_eq!(denied.reason, "log in as an admin first");

        let submitted = act(
            &state,
            &mut session,
            serde_json::json!({"type": "submitJoinRequest", "login_handle": "root", "credential": "pw"}),
        )
        .await;
        assert!(submitted.ok);
        let request_id = submitted.payload.unwrap()["id"].as_str().unwrap().to_string();

        // The first admin is approved over REST.
        ledger_service::decide(&state, request_id.parse().unwrap(), Decision::Approve)
            .await
            .unwrap();

        let login = act(
            &state,
            &mut session,
            serde_json::json!({"type": "login", "login_handle": "root", "credential": "pw"}),
        )
        .await;
        assert!(login.ok);
        assert_eq!(login.payload.as_ref().unwrap()["role"], "admin");
        assert!(!login.payload.unwrap().to_string().contains("sha256$"));

        let allowed = act(
            &state,
            &mut session,
            serde_json::json!({"type": "watchAdd", "id": "bm_42", "name": "Bob"}),
        )
        .await;
        assert!(allowed.ok, "{}", allowed.reason);
        assert_eq!(allowed.reason, "watching bm_42");
    }

    #[tokio::test]
    async fn failed_login_drops_the_previous_identity() {
        let state = admin_state();
        let request = ledger_service::submit(
            &state,
            crate::dto::actions::JoinRequestInput {
                display_name: "Root".into(),
                login_handle: "root".into(),
                credential: "pw".into(),
            },
        )
        .await
        .unwrap();
        ledger_service::decide(&state, request.id, Decision::Approve)
            .await
            .unwrap();

        let mut session = DashboardSession::default();
        let login = act(
            &state,
            &mut session,
            serde_json::json!({"type": "login", "login_handle": "root", "credential": "pw"}),
        )
        .await;
        assert!(login.ok);
        assert_eq!(session.member_id, Some(request.id));

        let relogin = act(
            &state,
            &mut session,
            serde_json::json!({"type": "login", "login_handle": "root", "credential": "nope"}),
        )
        .await;
        assert!(!relogin.ok);
        assert_eq!(relogin.reason, "invalid credentials");
        assert!(session.member_id.is_none());

        let denied = act(
            &state,
            &mut session,
            serde_json::json!({"type": "watchRemove", "id": "bm_1"}),
        )
        .await;
        assert!(!denied.ok);
        assert_eq!(denied.reason, "log in as an admin first");
    }

    #[tokio::test]
    async fn malformed_frames_get_a_failed_result() {
        let state = test_support::state();
        let mut session = DashboardSession::default();
        let result = handle_action(&state, &mut session, "{\"type\":\"nope\"}").await;
        assert!(!result.ok);
        assert_eq!(result.action, "unknown");
        assert!(result.reason.starts_with("malformed action"));
    }

    #[tokio::test]
    async fn forwarder_stops_when_the_writer_is_gone() {
        let state = test_support::state();
        let subscription = state.subscribe_dashboard().await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(forward_events(subscription, tx));

        let first = rx.recv().await.unwrap();
        let Message::Text(text) = first else {
            panic!("expected a text frame");
        };
        assert!(text.as_str().contains("\"type\":\"snapshot\""));

        drop(rx);
        task.await.unwrap();
        assert_eq!(state.hub().subscriber_count(), 0);
    }
}
