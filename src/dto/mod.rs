use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Health check payloads.
pub mod health;
/// Host snapshot and command payloads.
pub mod host;
/// Join request and response.
pub mod join;
/// Player write payloads.
pub mod player;
/// Room authoring payloads and public views.
pub mod room;
/// Server-Sent Events payloads.
pub mod sse;
/// Validation helpers for request payloads.
pub mod validation;
/// WebSocket messages exchanged with players.
pub mod ws;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
