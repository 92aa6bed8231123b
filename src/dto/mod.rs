use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health check payloads.
pub mod health;
/// HTTP payloads for the match endpoints.
pub mod matches;
/// WebSocket message surface.
pub mod ws;

/// Format a timestamp for client payloads.
pub(crate) fn format_timestamp(time: OffsetDateTime) -> String {
    time.format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
