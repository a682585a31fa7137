use std::time::{Duration, SystemTime, UNIX_EPOCH};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

pub mod actions;
pub mod dashboard;
pub mod health;
pub mod validation;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}

/// Render a millisecond UNIX timestamp as RFC 3339.
pub fn format_epoch_ms(ms: u64) -> String {
    format_system_time(UNIX_EPOCH + Duration::from_millis(ms))
}
