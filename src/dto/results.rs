use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dao::models::SessionResultEntity;

/// Final ranking line of a participant.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct ResultRow {
    /// Ranked participant.
    pub participant_id: Uuid,
    /// Alias at the time of reading.
    pub alias: String,
    /// 1-based position without gaps.
    pub final_position: u32,
    /// Final score.
    pub final_score: i64,
    /// Questions answered.
    pub total_answers: u32,
    /// Questions answered correctly.
    pub correct_answers: u32,
    /// Sum of reported answer times, the tie-breaker.
    pub total_time_ms: u64,
}

impl ResultRow {
    /// Join a stored result with the participant's alias.
    pub fn new(result: SessionResultEntity, alias: String) -> Self {
        Self {
            participant_id: result.participant_id,
            alias,
            final_position: result.final_position,
            final_score: result.final_score,
            total_answers: result.total_answers,
            correct_answers: result.correct_answers,
            total_time_ms: result.total_time_ms,
        }
    }
}
