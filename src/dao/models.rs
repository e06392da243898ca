use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Quiz header owned by the authoring collaborator.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizEntity {
    /// Stable identifier for the quiz.
    pub id: Uuid,
    /// Human readable quiz title.
    pub title: String,
    /// Identity that authored the quiz and may run sessions from it.
    pub owner_id: Uuid,
    /// Creation time, used for listing only.
    pub created_at: SystemTime,
}

/// One question of a quiz, immutable while a session is running.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Stable identifier for the question.
    pub id: Uuid,
    /// Quiz the question belongs to.
    pub quiz_id: Uuid,
    /// Prompt shown to players.
    pub text: String,
    /// Play sequence position, unique per quiz.
    pub order_index: i32,
    /// Countdown length in seconds. Zero disables the countdown.
    pub time_limit_sec: u32,
}

/// Answer option attached to a question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OptionEntity {
    /// Stable identifier for the option.
    pub id: Uuid,
    /// Question the option answers.
    pub question_id: Uuid,
    /// Label shown to players.
    pub text: String,
    /// Whether picking this option scores. At least one option per question is correct.
    pub is_correct: bool,
}

/// Lifecycle status of a live session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Accepting joins, no question in play yet.
    Lobby,
    /// A question is in play and answers are accepted.
    Running,
    /// The current question is frozen by the controller.
    Paused,
    /// Terminal state; rankings are computed on entry.
    Ended,
}

impl SessionStatus {
    /// Whether no further transition can leave this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Ended)
    }
}

/// Live run of a quiz, driven by its owner.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Stable identifier for the session.
    pub id: Uuid,
    /// Quiz being played.
    pub quiz_id: Uuid,
    /// Six character join code, stored upper-case.
    pub code: String,
    /// Current lifecycle status.
    pub status: SessionStatus,
    /// Question in play while Running or Paused, `None` otherwise.
    pub current_question_id: Option<Uuid>,
    /// Effective countdown of the question in play.
    pub time_limit_sec: u32,
    /// Identity allowed to drive the session.
    pub owner_id: Uuid,
    /// When the lobby was opened.
    pub created_at: SystemTime,
    /// Set when the first question goes into play.
    pub started_at: Option<SystemTime>,
    /// Set on the transition to Ended.
    pub ended_at: Option<SystemTime>,
    /// Incremented on every persisted transition; used for compare-and-swap updates.
    pub version: u64,
}

impl SessionEntity {
    /// Fresh session waiting in the lobby.
    pub fn lobby(quiz_id: Uuid, owner_id: Uuid, code: String, now: SystemTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            quiz_id,
            code,
            status: SessionStatus::Lobby,
            current_question_id: None,
            time_limit_sec: 0,
            owner_id,
            created_at: now,
            started_at: None,
            ended_at: None,
            version: 0,
        }
    }
}

/// Joined player, keyed by `id` and never by alias.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// Stable identifier for the participant.
    pub id: Uuid,
    /// Session the participant joined.
    pub session_id: Uuid,
    /// Authenticated identity; `None` for guests.
    pub identity_id: Option<Uuid>,
    /// Display name; not unique within a session.
    pub alias: String,
    /// True when joined without an identity.
    pub is_guest: bool,
    /// Join time; orders the participant list.
    pub joined_at: SystemTime,
}

/// First answer of a participant to a question. Later attempts never overwrite it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerEntity {
    /// Session the answer was given in.
    pub session_id: Uuid,
    /// Question being answered.
    pub question_id: Uuid,
    /// Participant who answered.
    pub participant_id: Uuid,
    /// Chosen option.
    pub option_id: Uuid,
    /// Client reported time since the question started.
    pub elapsed_ms: u64,
    /// Server time of the insert.
    pub created_at: SystemTime,
}

/// Running score of a participant within a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ScoreEntity {
    /// Session the score belongs to.
    pub session_id: Uuid,
    /// Participant the score belongs to.
    pub participant_id: Uuid,
    /// Points earned so far.
    pub value: i64,
    /// Time of the last award.
    pub last_update: SystemTime,
    /// Questions whose award has already been applied to `value`.
    #[serde(default)]
    pub awarded_questions: Vec<Uuid>,
}

impl ScoreEntity {
    /// Zeroed score row created at join time.
    pub fn zero(session_id: Uuid, participant_id: Uuid, now: SystemTime) -> Self {
        Self {
            session_id,
            participant_id,
            value: 0,
            last_update: now,
            awarded_questions: Vec::new(),
        }
    }
}

/// Final ranking row of a participant, upserted on `(session_id, participant_id)`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionResultEntity {
    /// Ranked session.
    pub session_id: Uuid,
    /// Ranked participant.
    pub participant_id: Uuid,
    /// 1-based position without gaps.
    pub final_position: u32,
    /// Score at the end of the session.
    pub final_score: i64,
    /// Questions answered.
    pub total_answers: u32,
    /// Questions answered correctly.
    pub correct_answers: u32,
    /// Sum of reported answer times, used to break ties.
    pub total_time_ms: u64,
}
