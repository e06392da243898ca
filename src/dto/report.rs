use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::session::SessionSummary;

/// Post-game report for the session owner.
#[derive(Debug, Serialize, ToSchema)]
pub struct SessionReport {
    /// Session the report covers.
    pub session: SessionSummary,
    /// One row per participant, in join order.
    pub participants: Vec<ParticipantReport>,
    /// One row per question, in play order.
    pub questions: Vec<QuestionReport>,
}

/// Per-participant line of the post-game report.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct ParticipantReport {
    /// Participant identifier.
    pub participant_id: Uuid,
    /// Display alias.
    pub alias: String,
    /// Final score.
    pub score: i64,
    /// Questions answered.
    pub total_answers: u32,
    /// Questions answered correctly.
    pub correct_answers: u32,
    /// Sum of reported answer times.
    pub total_time_ms: u64,
    /// Mean answer time over correct answers only.
    pub average_time_per_correct_ms: Option<u64>,
}

/// Per-question line of the post-game report.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq)]
pub struct QuestionReport {
    /// Question identifier.
    pub question_id: Uuid,
    /// Prompt text.
    pub text: String,
    /// Play position.
    pub order_index: i32,
    /// Answers received.
    pub total_answers: u32,
    /// Correct answers received.
    pub correct_answers: u32,
    /// Share of correct answers, 0 to 100.
    pub correct_percentage: f64,
    /// Mean reported answer time.
    pub average_time_ms: Option<u64>,
}

/// Live answer distribution of one question, for the controller.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct QuestionStats {
    /// Question the counts belong to.
    pub question_id: Uuid,
    /// Answers received so far.
    pub total_answers: u32,
    /// Count per option, in option order.
    pub options: Vec<OptionTally>,
}

/// Answer count of one option.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct OptionTally {
    /// Option identifier.
    pub option_id: Uuid,
    /// Option label.
    pub text: String,
    /// Whether the option scores.
    pub is_correct: bool,
    /// Answers that picked it.
    pub count: u32,
}
