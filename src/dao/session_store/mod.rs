/// In-process store used by tests and as the fallback backend.
pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use crate::dao::models::{
    AnswerEntity, OptionEntity, ParticipantEntity, QuestionEntity, QuizEntity, ScoreEntity,
    SessionEntity, SessionResultEntity,
};
use crate::dao::storage::StorageResult;
use futures::{future::BoxFuture, stream::BoxStream};
use uuid::Uuid;

pub use memory::MemorySessionStore;

/// Row families exposed on the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    /// Session rows.
    Session,
    /// Participant rows.
    Participant,
    /// Score rows.
    Score,
    /// Answer rows. Never pushed to HTTP subscribers.
    Answer,
    /// Final ranking rows.
    Result,
}

impl Table {
    /// Every table, in feed order.
    pub const ALL: [Table; 5] = [
        Table::Session,
        Table::Participant,
        Table::Score,
        Table::Answer,
        Table::Result,
    ];
}

/// Kind of mutation reported by the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A new row.
    Insert,
    /// A changed row.
    Update,
}

/// Full row carried by a change notification.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeRow {
    /// Session row.
    Session(SessionEntity),
    /// Participant row.
    Participant(ParticipantEntity),
    /// Score row.
    Score(ScoreEntity),
    /// Answer row.
    Answer(AnswerEntity),
    /// Final ranking row.
    Result(SessionResultEntity),
}

impl ChangeRow {
    /// Table the row belongs to.
    pub fn table(&self) -> Table {
        match self {
            ChangeRow::Session(_) => Table::Session,
            ChangeRow::Participant(_) => Table::Participant,
            ChangeRow::Score(_) => Table::Score,
            ChangeRow::Answer(_) => Table::Answer,
            ChangeRow::Result(_) => Table::Result,
        }
    }

    /// Session the row is scoped to.
    pub fn session_id(&self) -> Uuid {
        match self {
            ChangeRow::Session(session) => session.id,
            ChangeRow::Participant(participant) => participant.session_id,
            ChangeRow::Score(score) => score.session_id,
            ChangeRow::Answer(answer) => answer.session_id,
            ChangeRow::Result(result) => result.session_id,
        }
    }
}

/// One notification of the per-row change feed.
#[derive(Debug, Clone, PartialEq)]
pub struct RowChange {
    /// Insert or update.
    pub kind: ChangeKind,
    /// Row after the change.
    pub row: ChangeRow,
}

/// Predicate applied to the change feed before delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeFilter {
    /// Only rows of this session pass.
    pub session_id: Uuid,
    /// Only rows of these tables pass.
    pub tables: Vec<Table>,
}

impl ChangeFilter {
    /// Every table scoped to one session.
    pub fn session(session_id: Uuid) -> Self {
        Self {
            session_id,
            tables: Table::ALL.to_vec(),
        }
    }

    /// Restrict the filter to the given tables.
    pub fn only(mut self, tables: &[Table]) -> Self {
        self.tables = tables.to_vec();
        self
    }

    /// Whether the change passes this filter.
    pub fn matches(&self, change: &RowChange) -> bool {
        change.row.session_id() == self.session_id && self.tables.contains(&change.row.table())
    }
}

/// Abstraction over the persistence layer for quizzes and live sessions.
///
/// Uniqueness constraints are enforced by the backend and reported as
/// [`StorageError::UniqueViolation`](crate::dao::storage::StorageError::UniqueViolation).
pub trait SessionStore: Send + Sync {
    /// Store a quiz header.
    fn save_quiz(&self, quiz: QuizEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Store a question. `(quiz_id, order_index)` is unique.
    fn save_question(&self, question: QuestionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Store an answer option.
    fn save_option(&self, option: OptionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Quiz by id.
    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>>;
    /// Question by id.
    fn find_question(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>>;
    /// Option by id.
    fn find_option(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<OptionEntity>>>;
    /// Questions of a quiz ordered by `order_index`.
    fn list_questions(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>>;
    /// Options of a question in insertion order.
    fn list_options(&self, question_id: Uuid)
    -> BoxFuture<'static, StorageResult<Vec<OptionEntity>>>;

    /// Store a new session. The join code is unique, ignoring case.
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Session by id.
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Case-insensitive lookup by join code.
    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Sessions opened by `owner_id`, newest first.
    fn list_sessions_by_owner(
        &self,
        owner_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>>;
    /// Replace the session row only if its stored version equals `expected_version`.
    fn update_session(
        &self,
        session: SessionEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Store a new participant.
    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Participant by id.
    fn find_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>>;
    /// Delete a participant together with its score row. Missing rows are not an error.
    fn remove_participant(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Participants of a session ordered by join time.
    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>>;

    /// Store the zeroed score row of a participant. Unique per `(session, participant)`.
    fn insert_score(&self, score: ScoreEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Score rows of a session.
    fn list_scores(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>>;
    /// Atomically add `points` unless the award for `question_id` was already applied.
    ///
    /// Returns the updated row, or `None` when the award had been applied before.
    fn award_points(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        question_id: Uuid,
        points: i64,
    ) -> BoxFuture<'static, StorageResult<Option<ScoreEntity>>>;

    /// Store an answer. Unique per `(session, question, participant)`.
    fn insert_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Answers of a session.
    fn list_answers(&self, session_id: Uuid)
    -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>>;
    /// Answers to one question of a session.
    fn list_question_answers(
        &self,
        session_id: Uuid,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>>;

    /// Insert or replace result rows keyed by `(session, participant)`.
    fn upsert_results(
        &self,
        results: Vec<SessionResultEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Result rows ordered by `final_position`.
    fn list_results(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionResultEntity>>>;

    /// Open the change feed. The returned stream may end at any time.
    fn subscribe(
        &self,
        filter: ChangeFilter,
    ) -> BoxFuture<'static, StorageResult<BoxStream<'static, RowChange>>>;

    /// Cheap round trip proving the backend answers.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
