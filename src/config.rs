//! Application-level configuration loading: data directory, upstream producers, admin access
//! and outbound notifications.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PRESENCE_RELAY_CONFIG_PATH";
const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_PERSIST_INTERVAL_SECS: u64 = 60;
const DEFAULT_FEED_INITIAL_BACKOFF_MS: u64 = 1_000;
const DEFAULT_FEED_MAX_BACKOFF_MS: u64 = 30_000;
const DEFAULT_POLL_INTERVAL_SECS: u64 = 30;
const DEFAULT_POLL_TIMEOUT_SECS: u64 = 10;
const DEFAULT_NOTIFICATION_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    pub data_dir: PathBuf,
    pub persist_interval: Duration,
    /// Game feed connection; `None` disables the feed producer.
    pub feed: Option<FeedConfig>,
    /// Roster poll endpoint; `None` disables the poll producer.
    pub poll: Option<PollConfig>,
    /// Token expected in the `x-admin-token` header of admin REST routes.
    pub admin_token: Option<String>,
    /// Login handles granted the admin role on approval.
    pub admin_handles: Vec<String>,
    pub notifications: Option<NotificationConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedConfig {
    pub url: String,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    pub url: String,
    pub interval: Duration,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotificationConfig {
    pub webhook_url: String,
    /// Channel label attached to every notification.
    pub channel: String,
    /// Upper bound for one webhook delivery.
    pub timeout: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to built-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => Self::from_json(&contents).unwrap_or_else(|err| {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to parse config; falling back to defaults"
                );
                Self::default()
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }

    /// Parse a configuration document.
    pub fn from_json(contents: &str) -> serde_json::Result<Self> {
        let raw = serde_json::from_str::<RawConfig>(contents)?;
        let config: Self = raw.into();
        info!(
            data_dir = %config.data_dir.display(),
            feed = config.feed.is_some(),
            poll = config.poll.is_some(),
            notifications = config.notifications.is_some(),
            "loaded configuration"
        );
        Ok(config)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        RawConfig::default().into()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    data_dir: Option<String>,
    persist_interval_secs: Option<u64>,
    feed: Option<RawFeed>,
    poll: Option<RawPoll>,
    admin_token: Option<String>,
    admin_handles: Vec<String>,
    notifications: Option<RawNotifications>,
}

#[derive(Debug, Deserialize)]
struct RawFeed {
    url: String,
    initial_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawPoll {
    url: String,
    interval_secs: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawNotifications {
    webhook_url: String,
    #[serde(default)]
    channel: Option<String>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        Self {
            data_dir: PathBuf::from(value.data_dir.unwrap_or_else(|| DEFAULT_DATA_DIR.into())),
            persist_interval: Duration::from_secs(
                value
                    .persist_interval_secs
                    .unwrap_or(DEFAULT_PERSIST_INTERVAL_SECS)
                    .max(1),
            ),
            feed: value.feed.map(Into::into),
            poll: value.poll.map(Into::into),
            admin_token: value.admin_token.filter(|token| !token.is_empty()),
            admin_handles: value.admin_handles,
            notifications: value.notifications.map(Into::into),
        }
    }
}

impl From<RawFeed> for FeedConfig {
    fn from(value: RawFeed) -> Self {
        let initial_backoff = Duration::from_millis(
            value
                .initial_backoff_ms
                .unwrap_or(DEFAULT_FEED_INITIAL_BACKOFF_MS)
                .max(1),
        );
        let max_backoff = Duration::from_millis(
            value
                .max_backoff_ms
                .unwrap_or(DEFAULT_FEED_MAX_BACKOFF_MS),
        )
        .max(initial_backoff);
        Self {
            url: value.url,
            initial_backoff,
            max_backoff,
        }
    }
}

impl From<RawPoll> for PollConfig {
    fn from(value: RawPoll) -> Self {
        Self {
            url: value.url,
            interval: Duration::from_secs(
                value
                    .interval_secs
                    .unwrap_or(DEFAULT_POLL_INTERVAL_SECS)
                    .max(1),
            ),
            timeout: Duration::from_secs(
                value
                    .timeout_secs
                    .unwrap_or(DEFAULT_POLL_TIMEOUT_SECS)
                    .max(1),
            ),
        }
    }
}

impl From<RawNotifications> for NotificationConfig {
    fn from(value: RawNotifications) -> Self {
        Self {
            webhook_url: value.webhook_url,
            channel: value.channel.unwrap_or_else(|| "presence".into()),
            timeout: Duration::from_secs(
                value
                    .timeout_secs
                    .unwrap_or(DEFAULT_NOTIFICATION_TIMEOUT_SECS)
                    .max(1),
            ),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}
