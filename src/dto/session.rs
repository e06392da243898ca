use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{SessionEntity, SessionStatus},
    dto::format_system_time,
};

/// Request to open a new session from a quiz.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSessionRequest {
    /// Quiz owned by the caller.
    pub quiz_id: Uuid,
}

/// Session state shared with controllers and participants.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionSummary {
    /// Session identifier.
    pub id: Uuid,
    /// Quiz being played.
    pub quiz_id: Uuid,
    /// Join code shared with players.
    pub code: String,
    /// Lifecycle status.
    pub status: SessionStatus,
    /// Question in play while Running or Paused.
    pub current_question_id: Option<Uuid>,
    /// Countdown of the question in play.
    pub time_limit_sec: u32,
    /// Controller identity.
    pub owner_id: Uuid,
    /// RFC 3339 creation time.
    pub created_at: String,
    /// RFC 3339 start time.
    pub started_at: Option<String>,
    /// RFC 3339 end time.
    pub ended_at: Option<String>,
    /// Monotonic revision; newer snapshots carry larger values.
    pub version: u64,
}

impl From<&SessionEntity> for SessionSummary {
    fn from(session: &SessionEntity) -> Self {
        Self {
            id: session.id,
            quiz_id: session.quiz_id,
            code: session.code.clone(),
            status: session.status,
            current_question_id: session.current_question_id,
            time_limit_sec: session.time_limit_sec,
            owner_id: session.owner_id,
            created_at: format_system_time(session.created_at),
            started_at: session.started_at.map(format_system_time),
            ended_at: session.ended_at.map(format_system_time),
            version: session.version,
        }
    }
}
