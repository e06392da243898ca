use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::ParticipantEntity,
    dto::{
        format_system_time,
        session::SessionSummary,
        validation::{validate_alias, validate_join_code},
    },
};

/// Join a lobby by code under a display alias.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinSessionRequest {
    /// Six character join code, any case.
    #[validate(custom(function = "validate_join_code"))]
    pub code: String,
    /// Display alias, trimmed before storing.
    #[validate(custom(function = "validate_alias"))]
    pub alias: String,
}

/// Participant identity as shown to other clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipantSummary {
    /// Participant identifier.
    pub id: Uuid,
    /// Session joined.
    pub session_id: Uuid,
    /// Display alias.
    pub alias: String,
    /// Joined without an identity.
    pub is_guest: bool,
    /// RFC 3339 join time.
    pub joined_at: String,
}

impl From<&ParticipantEntity> for ParticipantSummary {
    fn from(participant: &ParticipantEntity) -> Self {
        Self {
            id: participant.id,
            session_id: participant.session_id,
            alias: participant.alias.clone(),
            is_guest: participant.is_guest,
            joined_at: format_system_time(participant.joined_at),
        }
    }
}

/// Outcome of a successful join.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinSessionResponse {
    /// The new participant.
    pub participant: ParticipantSummary,
    /// The lobby joined.
    pub session: SessionSummary,
}

/// One line of the live leaderboard.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    /// Participant identifier.
    pub participant_id: Uuid,
    /// Display alias.
    pub alias: String,
    /// Joined without an identity.
    pub is_guest: bool,
    /// Current score.
    pub score: i64,
}
