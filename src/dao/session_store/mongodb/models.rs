use mongodb::bson::{DateTime, Document, doc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::{MongoDaoError, MongoResult};
use crate::dao::models::{
    AnswerEntity, OptionEntity, ParticipantEntity, QuestionEntity, QuizEntity, ScoreEntity,
    SessionEntity, SessionResultEntity, SessionStatus,
};

pub const QUIZ_COLLECTION: &str = "quizzes";
pub const QUESTION_COLLECTION: &str = "questions";
pub const OPTION_COLLECTION: &str = "options";
pub const SESSION_COLLECTION: &str = "sessions";
pub const PARTICIPANT_COLLECTION: &str = "participants";
pub const SCORE_COLLECTION: &str = "scores";
pub const ANSWER_COLLECTION: &str = "answers";
pub const RESULT_COLLECTION: &str = "session_results";

pub fn doc_id(id: impl ToString) -> Document {
    doc! {"_id": id.to_string()}
}

pub fn pair_id(session_id: Uuid, participant_id: Uuid) -> String {
    format!("{session_id}:{participant_id}")
}

pub fn answer_id(session_id: Uuid, question_id: Uuid, participant_id: Uuid) -> String {
    format!("{session_id}:{question_id}:{participant_id}")
}

fn parse_id(collection: &'static str, value: &str) -> MongoResult<Uuid> {
    Uuid::parse_str(value).map_err(|source| MongoDaoError::MalformedId {
        collection,
        value: value.to_owned(),
        source,
    })
}

fn parse_opt_id(collection: &'static str, value: Option<&str>) -> MongoResult<Option<Uuid>> {
    value.map(|value| parse_id(collection, value)).transpose()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuizDocument {
    #[serde(rename = "_id")]
    id: String,
    title: String,
    owner_id: String,
    created_at: DateTime,
}

impl From<QuizEntity> for MongoQuizDocument {
    fn from(value: QuizEntity) -> Self {
        Self {
            id: value.id.to_string(),
            title: value.title,
            owner_id: value.owner_id.to_string(),
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoQuizDocument> for QuizEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoQuizDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(QUIZ_COLLECTION, &value.id)?,
            title: value.title,
            owner_id: parse_id(QUIZ_COLLECTION, &value.owner_id)?,
            created_at: value.created_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoQuestionDocument {
    #[serde(rename = "_id")]
    id: String,
    quiz_id: String,
    text: String,
    order_index: i32,
    time_limit_sec: i64,
}

impl From<QuestionEntity> for MongoQuestionDocument {
    fn from(value: QuestionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            quiz_id: value.quiz_id.to_string(),
            text: value.text,
            order_index: value.order_index,
            time_limit_sec: i64::from(value.time_limit_sec),
        }
    }
}

impl TryFrom<MongoQuestionDocument> for QuestionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoQuestionDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(QUESTION_COLLECTION, &value.id)?,
            quiz_id: parse_id(QUESTION_COLLECTION, &value.quiz_id)?,
            text: value.text,
            order_index: value.order_index,
            time_limit_sec: u32::try_from(value.time_limit_sec).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoOptionDocument {
    #[serde(rename = "_id")]
    id: String,
    question_id: String,
    text: String,
    is_correct: bool,
}

impl From<OptionEntity> for MongoOptionDocument {
    fn from(value: OptionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            question_id: value.question_id.to_string(),
            text: value.text,
            is_correct: value.is_correct,
        }
    }
}

impl TryFrom<MongoOptionDocument> for OptionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoOptionDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(OPTION_COLLECTION, &value.id)?,
            question_id: parse_id(OPTION_COLLECTION, &value.question_id)?,
            text: value.text,
            is_correct: value.is_correct,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSessionDocument {
    #[serde(rename = "_id")]
    id: String,
    /// Duplicated from `_id` so change streams can filter every collection on the same path.
    session_id: String,
    quiz_id: String,
    code: String,
    status: SessionStatus,
    current_question_id: Option<String>,
    time_limit_sec: i64,
    owner_id: String,
    created_at: DateTime,
    started_at: Option<DateTime>,
    ended_at: Option<DateTime>,
    version: i64,
}

impl From<SessionEntity> for MongoSessionDocument {
    fn from(value: SessionEntity) -> Self {
        Self {
            id: value.id.to_string(),
            session_id: value.id.to_string(),
            quiz_id: value.quiz_id.to_string(),
            code: value.code.to_uppercase(),
            status: value.status,
            current_question_id: value.current_question_id.map(|id| id.to_string()),
            time_limit_sec: i64::from(value.time_limit_sec),
            owner_id: value.owner_id.to_string(),
            created_at: DateTime::from_system_time(value.created_at),
            started_at: value.started_at.map(DateTime::from_system_time),
            ended_at: value.ended_at.map(DateTime::from_system_time),
            version: i64::try_from(value.version).unwrap_or(i64::MAX),
        }
    }
}

impl TryFrom<MongoSessionDocument> for SessionEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoSessionDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(SESSION_COLLECTION, &value.id)?,
            quiz_id: parse_id(SESSION_COLLECTION, &value.quiz_id)?,
            code: value.code,
            status: value.status,
            current_question_id: parse_opt_id(
                SESSION_COLLECTION,
                value.current_question_id.as_deref(),
            )?,
            time_limit_sec: u32::try_from(value.time_limit_sec).unwrap_or_default(),
            owner_id: parse_id(SESSION_COLLECTION, &value.owner_id)?,
            created_at: value.created_at.to_system_time(),
            started_at: value.started_at.map(DateTime::to_system_time),
            ended_at: value.ended_at.map(DateTime::to_system_time),
            version: u64::try_from(value.version).unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoParticipantDocument {
    #[serde(rename = "_id")]
    id: String,
    session_id: String,
    identity_id: Option<String>,
    alias: String,
    is_guest: bool,
    joined_at: DateTime,
}

impl From<ParticipantEntity> for MongoParticipantDocument {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            id: value.id.to_string(),
            session_id: value.session_id.to_string(),
            identity_id: value.identity_id.map(|id| id.to_string()),
            alias: value.alias,
            is_guest: value.is_guest,
            joined_at: DateTime::from_system_time(value.joined_at),
        }
    }
}

impl TryFrom<MongoParticipantDocument> for ParticipantEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoParticipantDocument) -> MongoResult<Self> {
        Ok(Self {
            id: parse_id(PARTICIPANT_COLLECTION, &value.id)?,
            session_id: parse_id(PARTICIPANT_COLLECTION, &value.session_id)?,
            identity_id: parse_opt_id(PARTICIPANT_COLLECTION, value.identity_id.as_deref())?,
            alias: value.alias,
            is_guest: value.is_guest,
            joined_at: value.joined_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoScoreDocument {
    #[serde(rename = "_id")]
    id: String,
    session_id: String,
    participant_id: String,
    value: i64,
    last_update: DateTime,
    #[serde(default)]
    awarded_questions: Vec<String>,
}

impl From<ScoreEntity> for MongoScoreDocument {
    fn from(value: ScoreEntity) -> Self {
        Self {
            id: pair_id(value.session_id, value.participant_id),
            session_id: value.session_id.to_string(),
            participant_id: value.participant_id.to_string(),
            value: value.value,
            last_update: DateTime::from_system_time(value.last_update),
            awarded_questions: value
                .awarded_questions
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl TryFrom<MongoScoreDocument> for ScoreEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoScoreDocument) -> MongoResult<Self> {
        let awarded_questions = value
            .awarded_questions
            .iter()
            .map(|id| parse_id(SCORE_COLLECTION, id))
            .collect::<MongoResult<Vec<_>>>()?;
        Ok(Self {
            session_id: parse_id(SCORE_COLLECTION, &value.session_id)?,
            participant_id: parse_id(SCORE_COLLECTION, &value.participant_id)?,
            value: value.value,
            last_update: value.last_update.to_system_time(),
            awarded_questions,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoAnswerDocument {
    #[serde(rename = "_id")]
    id: String,
    session_id: String,
    question_id: String,
    participant_id: String,
    option_id: String,
    elapsed_ms: i64,
    created_at: DateTime,
}

impl From<AnswerEntity> for MongoAnswerDocument {
    fn from(value: AnswerEntity) -> Self {
        Self {
            id: answer_id(value.session_id, value.question_id, value.participant_id),
            session_id: value.session_id.to_string(),
            question_id: value.question_id.to_string(),
            participant_id: value.participant_id.to_string(),
            option_id: value.option_id.to_string(),
            elapsed_ms: i64::try_from(value.elapsed_ms).unwrap_or(i64::MAX),
            created_at: DateTime::from_system_time(value.created_at),
        }
    }
}

impl TryFrom<MongoAnswerDocument> for AnswerEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoAnswerDocument) -> MongoResult<Self> {
        Ok(Self {
            session_id: parse_id(ANSWER_COLLECTION, &value.session_id)?,
            question_id: parse_id(ANSWER_COLLECTION, &value.question_id)?,
            participant_id: parse_id(ANSWER_COLLECTION, &value.participant_id)?,
            option_id: parse_id(ANSWER_COLLECTION, &value.option_id)?,
            elapsed_ms: u64::try_from(value.elapsed_ms).unwrap_or_default(),
            created_at: value.created_at.to_system_time(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoResultDocument {
    #[serde(rename = "_id")]
    id: String,
    session_id: String,
    participant_id: String,
    final_position: i64,
    final_score: i64,
    total_answers: i64,
    correct_answers: i64,
    total_time_ms: i64,
}

impl From<SessionResultEntity> for MongoResultDocument {
    fn from(value: SessionResultEntity) -> Self {
        Self {
            id: pair_id(value.session_id, value.participant_id),
            session_id: value.session_id.to_string(),
            participant_id: value.participant_id.to_string(),
            final_position: i64::from(value.final_position),
            final_score: value.final_score,
            total_answers: i64::from(value.total_answers),
            correct_answers: i64::from(value.correct_answers),
            total_time_ms: i64::try_from(value.total_time_ms).unwrap_or(i64::MAX),
        }
    }
}

impl TryFrom<MongoResultDocument> for SessionResultEntity {
    type Error = MongoDaoError;

    fn try_from(value: MongoResultDocument) -> MongoResult<Self> {
        Ok(Self {
            session_id: parse_id(RESULT_COLLECTION, &value.session_id)?,
            participant_id: parse_id(RESULT_COLLECTION, &value.participant_id)?,
            final_position: u32::try_from(value.final_position).unwrap_or_default(),
            final_score: value.final_score,
            total_answers: u32::try_from(value.total_answers).unwrap_or_default(),
            correct_answers: u32::try_from(value.correct_answers).unwrap_or_default(),
            total_time_ms: u64::try_from(value.total_time_ms).unwrap_or_default(),
        })
    }
}
