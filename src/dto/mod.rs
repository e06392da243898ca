use std::time::SystemTime;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};

/// Answer submission payloads.
pub mod answer;
/// Health check payload.
pub mod health;
/// Join, participant and leaderboard payloads.
pub mod participant;
/// Player view of the question in play.
pub mod question;
/// Quiz import payloads.
pub mod quiz;
/// Answer tallies and the post-game report.
pub mod report;
/// Final ranking rows.
pub mod results;
/// Session payloads.
pub mod session;
/// Server-sent event payloads.
pub mod sse;
/// Validation helpers.
pub mod validation;

fn format_system_time(time: SystemTime) -> String {
    OffsetDateTime::from(time)
        .format(&Rfc3339)
        .unwrap_or_else(|_| "invalid-timestamp".into())
}
