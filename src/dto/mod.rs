use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Board and session payloads.
pub mod game;
/// Health check payload.
pub mod health;
/// Recorded match payloads.
pub mod replay;
/// Room summaries and results.
pub mod room;
/// Server-sent event payloads.
pub mod sse;
/// Field validators for inbound payloads.
pub mod validation;
/// WebSocket protocol.
pub mod ws;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
