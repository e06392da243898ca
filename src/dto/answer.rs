use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::services::answer_service::SubmitOutcome;

/// Answer submitted by a participant for the question in play.
#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct SubmitAnswerRequest {
    /// Participant answering; must belong to the session.
    pub participant_id: Uuid,
    /// Question the answer is for; must be the one in play.
    pub question_id: Uuid,
    /// Picked option of that question.
    pub option_id: Uuid,
    /// Client measured time since the question started, at most the longest countdown.
    #[validate(range(max = 600_000))]
    pub elapsed_ms: u64,
}

/// Outcome reported to the answering client.
#[derive(Debug, Clone, Copy, Serialize, ToSchema, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// This submission was stored.
    Recorded,
    /// A previous submission for this question stands.
    AlreadyAnswered,
}

/// Response to an answer submission.
#[derive(Debug, Serialize, ToSchema)]
pub struct SubmitAnswerResponse {
    /// Whether this submission was stored.
    pub status: AnswerStatus,
    /// Whether the stored option is correct. Omitted for repeated submissions.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct: Option<bool>,
    /// Score after the award, when one was applied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<i64>,
}

impl From<SubmitOutcome> for SubmitAnswerResponse {
    fn from(outcome: SubmitOutcome) -> Self {
        match outcome {
            SubmitOutcome::Recorded { correct, score } => Self {
                status: AnswerStatus::Recorded,
                correct: Some(correct),
                score,
            },
            SubmitOutcome::AlreadyAnswered => Self {
                status: AnswerStatus::AlreadyAnswered,
                correct: None,
                score: None,
            },
        }
    }
}
