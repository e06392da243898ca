use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::{
        models::ScoreEntity,
        session_store::{ChangeRow, RowChange},
    },
    dto::{participant::ParticipantSummary, results::ResultRow, session::SessionSummary},
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    /// SSE event name.
    pub event: Option<String>,
    /// JSON payload.
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }

    /// Map a store change to the event pushed to session subscribers.
    ///
    /// Answer rows are never forwarded so option choices stay private.
    pub fn from_change(change: &RowChange) -> Option<serde_json::Result<Self>> {
        match &change.row {
            ChangeRow::Session(session) => Some(Self::json(
                Some("session".to_string()),
                &SessionSummary::from(session),
            )),
            ChangeRow::Participant(participant) => Some(Self::json(
                Some("participant".to_string()),
                &ParticipantSummary::from(participant),
            )),
            ChangeRow::Score(score) => Some(Self::json(
                Some("score".to_string()),
                &ScoreChangedEvent::from(score),
            )),
            ChangeRow::Result(result) => Some(Self::json(
                Some("result".to_string()),
                &ResultRow::new(result.clone(), String::new()),
            )),
            ChangeRow::Answer(_) => None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Session subscribed to.
    pub session_id: Uuid,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast whenever a participant's running score changes.
pub struct ScoreChangedEvent {
    /// Participant whose score changed.
    pub participant_id: Uuid,
    /// New score.
    pub value: i64,
}

impl From<&ScoreEntity> for ScoreChangedEvent {
    fn from(score: &ScoreEntity) -> Self {
        Self {
            participant_id: score.participant_id,
            value: score.value,
        }
    }
}
