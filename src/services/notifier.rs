//! Outbound notifications for presence transitions.

use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};

use crate::{
    config::NotificationConfig,
    state::presence::{PresenceChange, PresenceTransition},
};

/// One message for the chat collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub channel: String,
    pub content: String,
}

impl Notification {
    /// Message announcing a watched identity's transition.
    pub fn presence(channel: &str, change: &PresenceChange) -> Self {
        let content = match (change.transition, change.closed_session) {
            (PresenceTransition::Online, _) => {
                format!("{} ({}) is now online", change.display_name, change.identity)
            }
            (PresenceTransition::Offline, Some(session)) => format!(
                "{} ({}) went offline after {}",
                change.display_name,
                change.identity,
                format_duration(session.duration_ms)
            ),
            (PresenceTransition::Offline, None) => {
                format!("{} ({}) went offline", change.display_name, change.identity)
            }
        };
        Self {
            channel: channel.to_string(),
            content,
        }
    }
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to send notification")]
    Send {
        #[source]
        source: reqwest::Error,
    },
    #[error("notification endpoint answered {status}")]
    Status { status: StatusCode },
}

/// Sink for outbound notifications.
pub trait Notifier: Send + Sync {
    fn deliver(&self, notification: Notification) -> BoxFuture<'static, Result<(), NotifyError>>;
}

/// Posts every notification as JSON to a webhook.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: Arc<str>,
}

impl WebhookNotifier {
    pub fn new(client: Client, url: &str) -> Self {
        Self {
            client,
            url: Arc::from(url),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn deliver(&self, notification: Notification) -> BoxFuture<'static, Result<(), NotifyError>> {
        let client = self.client.clone();
        let url = self.url.clone();
        Box::pin(async move {
            let response = client
                .post(url.as_ref())
                .json(&notification)
                .send()
                .await
                .map_err(|source| NotifyError::Send { source })?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(NotifyError::Status {
                    status: response.status(),
                })
            }
        })
    }
}

/// Notifier used when no webhook is configured: logs and succeeds.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn deliver(&self, notification: Notification) -> BoxFuture<'static, Result<(), NotifyError>> {
        info!(channel = %notification.channel, content = %notification.content, "notification");
        Box::pin(async { Ok(()) })
    }
}

/// Pick the notifier matching the configuration.
///
/// Webhook deliveries are bounded by the configured timeout, since the dispatcher delivers one
/// notification at a time.
pub fn from_config(config: Option<&NotificationConfig>) -> reqwest::Result<Arc<dyn Notifier>> {
    Ok(match config {
        Some(config) => {
            let client = Client::builder().timeout(config.timeout).build()?;
            Arc::new(WebhookNotifier::new(client, &config.webhook_url))
        }
        None => Arc::new(LogNotifier),
    })
}

/// Deliver queued notifications one at a time, in queue order. Failures are logged and the
/// notification is dropped.
pub fn spawn_dispatcher(
    notifier: Arc<dyn Notifier>,
) -> (mpsc::UnboundedSender<Notification>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
    let task = tokio::spawn(async move {
        while let Some(notification) = rx.recv().await {
            if let Err(err) = notifier.deliver(notification).await {
                warn!(error = %err, "failed to deliver notification");
            }
        }
    });
    (tx, task)
}

fn format_duration(ms: u64) -> String {
    let total_secs = ms / 1_000;
    let (hours, minutes, seconds) = (total_secs / 3_600, (total_secs / 60) % 60, total_secs % 60);
    if hours > 0 {
        format!("{hours}h {minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds:02}s")
    } else {
        format!("{seconds}s")
    }
}
