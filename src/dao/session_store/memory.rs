use std::{
    sync::{
        Arc, PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
    time::SystemTime,
};

use dashmap::{DashMap, mapref::entry::Entry};
use futures::{StreamExt, future::BoxFuture, stream::BoxStream};
use thiserror::Error;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use uuid::Uuid;

use super::{ChangeFilter, ChangeKind, ChangeRow, RowChange, SessionStore};
use crate::dao::{
    models::{
        AnswerEntity, OptionEntity, ParticipantEntity, QuestionEntity, QuizEntity, ScoreEntity,
        SessionEntity, SessionResultEntity,
    },
    storage::{StorageError, StorageResult},
};

const FEED_CAPACITY: usize = 256;

#[derive(Debug, Error)]
#[error("in-memory store is offline")]
struct Offline;

/// Process-local store backed by concurrent maps and a broadcast change feed.
///
/// Besides serving as the default backend, it exposes hooks to mute push delivery,
/// sever open feeds and simulate an outage.
#[derive(Clone)]
pub struct MemorySessionStore {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    quizzes: DashMap<Uuid, QuizEntity>,
    questions: DashMap<Uuid, QuestionEntity>,
    options: DashMap<Uuid, OptionEntity>,
    sessions: DashMap<Uuid, SessionEntity>,
    session_codes: DashMap<String, Uuid>,
    participants: DashMap<Uuid, ParticipantEntity>,
    scores: DashMap<(Uuid, Uuid), ScoreEntity>,
    answers: DashMap<(Uuid, Uuid, Uuid), AnswerEntity>,
    results: DashMap<(Uuid, Uuid), SessionResultEntity>,
    feed: RwLock<broadcast::Sender<RowChange>>,
    push_muted: AtomicBool,
    online: AtomicBool,
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySessionStore {
    /// Empty, online store with an open change feed.
    pub fn new() -> Self {
        let (feed, _rx) = broadcast::channel(FEED_CAPACITY);
        Self {
            inner: Arc::new(MemoryInner {
                quizzes: DashMap::new(),
                questions: DashMap::new(),
                options: DashMap::new(),
                sessions: DashMap::new(),
                session_codes: DashMap::new(),
                participants: DashMap::new(),
                scores: DashMap::new(),
                answers: DashMap::new(),
                results: DashMap::new(),
                feed: RwLock::new(feed),
                push_muted: AtomicBool::new(false),
                online: AtomicBool::new(true),
            }),
        }
    }

    /// Silently drop change notifications while `muted` is set. Writes still succeed.
    pub fn set_push_muted(&self, muted: bool) {
        self.inner.push_muted.store(muted, Ordering::SeqCst);
    }

    /// End every open change feed stream. New subscriptions work as before.
    pub fn disconnect_feeds(&self) {
        let mut guard = self
            .inner
            .feed
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *guard = broadcast::channel(FEED_CAPACITY).0;
    }

    /// Toggle the simulated backend availability.
    pub fn set_online(&self, online: bool) {
        self.inner.online.store(online, Ordering::SeqCst);
    }
}

impl MemoryInner {
    fn ensure_online(&self) -> StorageResult<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::unavailable("memory store offline".into(), Offline))
        }
    }

    fn publish(&self, kind: ChangeKind, row: ChangeRow) {
        if self.push_muted.load(Ordering::SeqCst) {
            return;
        }
        let sender = self.feed.read().unwrap_or_else(PoisonError::into_inner);
        // No subscribers is not an error.
        let _ = sender.send(RowChange { kind, row });
    }

    fn insert_session(&self, session: SessionEntity) -> StorageResult<()> {
        self.ensure_online()?;
        let code = session.code.to_uppercase();
        match self.session_codes.entry(code) {
            Entry::Occupied(_) => {
                return Err(StorageError::UniqueViolation {
                    constraint: "sessions.code",
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(session.id);
            }
        }
        self.sessions.insert(session.id, session.clone());
        self.publish(ChangeKind::Insert, ChangeRow::Session(session));
        Ok(())
    }

    fn find_session_by_code(&self, code: &str) -> StorageResult<Option<SessionEntity>> {
        self.ensure_online()?;
        let Some(id) = self.session_codes.get(&code.to_uppercase()).map(|id| *id) else {
            return Ok(None);
        };
        Ok(self.sessions.get(&id).map(|session| session.clone()))
    }

    fn list_sessions_by_owner(&self, owner_id: Uuid) -> StorageResult<Vec<SessionEntity>> {
        self.ensure_online()?;
        let mut sessions: Vec<_> = self
            .sessions
            .iter()
            .filter(|entry| entry.owner_id == owner_id)
            .map(|entry| entry.value().clone())
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        Ok(sessions)
    }

    fn update_session(&self, session: SessionEntity, expected_version: u64) -> StorageResult<bool> {
        self.ensure_online()?;
        {
            let Some(mut stored) = self.sessions.get_mut(&session.id) else {
                return Ok(false);
            };
            if stored.version != expected_version {
                return Ok(false);
            }
            *stored = session.clone();
        }
        self.publish(ChangeKind::Update, ChangeRow::Session(session));
        Ok(true)
    }

    fn insert_participant(&self, participant: ParticipantEntity) -> StorageResult<()> {
        self.ensure_online()?;
        match self.participants.entry(participant.id) {
            Entry::Occupied(_) => {
                return Err(StorageError::UniqueViolation {
                    constraint: "participants.id",
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(participant.clone());
            }
        }
        self.publish(ChangeKind::Insert, ChangeRow::Participant(participant));
        Ok(())
    }

    fn remove_participant(&self, session_id: Uuid, participant_id: Uuid) -> StorageResult<()> {
        self.ensure_online()?;
        self.participants
            .remove_if(&participant_id, |_, participant| participant.session_id == session_id);
        self.scores.remove(&(session_id, participant_id));
        Ok(())
    }

    fn list_participants(&self, session_id: Uuid) -> StorageResult<Vec<ParticipantEntity>> {
        self.ensure_online()?;
        let mut participants: Vec<_> = self
            .participants
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .map(|entry| entry.value().clone())
            .collect();
        participants.sort_by(|a, b| a.joined_at.cmp(&b.joined_at).then(a.id.cmp(&b.id)));
        Ok(participants)
    }

    fn insert_score(&self, score: ScoreEntity) -> StorageResult<()> {
        self.ensure_online()?;
        match self.scores.entry((score.session_id, score.participant_id)) {
            Entry::Occupied(_) => {
                return Err(StorageError::UniqueViolation {
                    constraint: "scores.session_participant",
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(score.clone());
            }
        }
        self.publish(ChangeKind::Insert, ChangeRow::Score(score));
        Ok(())
    }

    fn award_points(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        question_id: Uuid,
        points: i64,
    ) -> StorageResult<Option<ScoreEntity>> {
        self.ensure_online()?;
        let now = SystemTime::now();
        let updated = {
            let mut score = self
                .scores
                .entry((session_id, participant_id))
                .or_insert_with(|| ScoreEntity::zero(session_id, participant_id, now));
            if score.awarded_questions.contains(&question_id) {
                return Ok(None);
            }
            score.value += points;
            score.last_update = now;
            score.awarded_questions.push(question_id);
            score.clone()
        };
        self.publish(ChangeKind::Update, ChangeRow::Score(updated.clone()));
        Ok(Some(updated))
    }

    fn insert_answer(&self, answer: AnswerEntity) -> StorageResult<()> {
        self.ensure_online()?;
        let key = (answer.session_id, answer.question_id, answer.participant_id);
        match self.answers.entry(key) {
            Entry::Occupied(_) => {
                return Err(StorageError::UniqueViolation {
                    constraint: "answers.session_question_participant",
                });
            }
            Entry::Vacant(slot) => {
                slot.insert(answer.clone());
            }
        }
        self.publish(ChangeKind::Insert, ChangeRow::Answer(answer));
        Ok(())
    }

    fn upsert_results(&self, results: Vec<SessionResultEntity>) -> StorageResult<()> {
        self.ensure_online()?;
        for result in results {
            let kind = match self
                .results
                .insert((result.session_id, result.participant_id), result.clone())
            {
                Some(_) => ChangeKind::Update,
                None => ChangeKind::Insert,
            };
            self.publish(kind, ChangeRow::Result(result));
        }
        Ok(())
    }

    fn list_results(&self, session_id: Uuid) -> StorageResult<Vec<SessionResultEntity>> {
        self.ensure_online()?;
        let mut results: Vec<_> = self
            .results
            .iter()
            .filter(|entry| entry.session_id == session_id)
            .map(|entry| entry.value().clone())
            .collect();
        results.sort_by_key(|result| result.final_position);
        Ok(results)
    }

    fn subscribe(&self, filter: ChangeFilter) -> StorageResult<BoxStream<'static, RowChange>> {
        self.ensure_online()?;
        let receiver = self
            .feed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .subscribe();
        let stream = BroadcastStream::new(receiver).filter_map(move |item| {
            // Lagged notifications are dropped; the poll channel covers the gap.
            let change = item.ok().filter(|change| filter.matches(change));
            futures::future::ready(change)
        });
        Ok(stream.boxed())
    }
}

fn collect_where<K, V, F>(map: &DashMap<K, V>, predicate: F) -> Vec<V>
where
    K: Eq + std::hash::Hash,
    V: Clone,
    F: Fn(&V) -> bool,
{
    map.iter()
        .filter(|entry| predicate(entry.value()))
        .map(|entry| entry.value().clone())
        .collect()
}

impl SessionStore for MemorySessionStore {
    fn save_quiz(&self, quiz: QuizEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            inner.quizzes.insert(quiz.id, quiz);
            Ok(())
        })
    }

    fn save_question(&self, question: QuestionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            let clash = inner.questions.iter().any(|entry| {
                entry.quiz_id == question.quiz_id
                    && entry.order_index == question.order_index
                    && entry.id != question.id
            });
            if clash {
                return Err(StorageError::UniqueViolation {
                    constraint: "questions.quiz_order",
                });
            }
            inner.questions.insert(question.id, question);
            Ok(())
        })
    }

    fn save_option(&self, option: OptionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            inner.options.insert(option.id, option);
            Ok(())
        })
    }

    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            Ok(inner.quizzes.get(&id).map(|quiz| quiz.clone()))
        })
    }

    fn find_question(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            Ok(inner.questions.get(&id).map(|question| question.clone()))
        })
    }

    fn find_option(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<OptionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            Ok(inner.options.get(&id).map(|option| option.clone()))
        })
    }

    fn list_questions(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            let mut questions = collect_where(&inner.questions, |question| {
                question.quiz_id == quiz_id
            });
            questions.sort_by_key(|question| question.order_index);
            Ok(questions)
        })
    }

    fn list_options(
        &self,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<OptionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            let mut options =
                collect_where(&inner.options, |option| option.question_id == question_id);
            options.sort_by_key(|option| option.id);
            Ok(options)
        })
    }

    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.insert_session(session) })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            Ok(inner.sessions.get(&id).map(|session| session.clone()))
        })
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.find_session_by_code(&code) })
    }

    fn list_sessions_by_owner(
        &self,
        owner_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.list_sessions_by_owner(owner_id) })
    }

    fn update_session(
        &self,
        session: SessionEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.update_session(session, expected_version) })
    }

    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.insert_participant(participant) })
    }

    fn find_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            Ok(inner
                .participants
                .get(&id)
                .map(|participant| participant.clone()))
        })
    }

    fn remove_participant(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.remove_participant(session_id, participant_id) })
    }

    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.list_participants(session_id) })
    }

    fn insert_score(&self, score: ScoreEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.insert_score(score) })
    }

    fn list_scores(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            let mut scores = collect_where(&inner.scores, |score| score.session_id == session_id);
            scores.sort_by_key(|score| score.participant_id);
            Ok(scores)
        })
    }

    fn award_points(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        question_id: Uuid,
        points: i64,
    ) -> BoxFuture<'static, StorageResult<Option<ScoreEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.award_points(session_id, participant_id, question_id, points) })
    }

    fn insert_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.insert_answer(answer) })
    }

    fn list_answers(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            let mut answers =
                collect_where(&inner.answers, |answer| answer.session_id == session_id);
            answers.sort_by(|a, b| {
                a.created_at
                    .cmp(&b.created_at)
                    .then(a.participant_id.cmp(&b.participant_id))
            });
            Ok(answers)
        })
    }

    fn list_question_answers(
        &self,
        session_id: Uuid,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            inner.ensure_online()?;
            Ok(collect_where(&inner.answers, |answer| {
                answer.session_id == session_id && answer.question_id == question_id
            }))
        })
    }

    fn upsert_results(
        &self,
        results: Vec<SessionResultEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.upsert_results(results) })
    }

    fn list_results(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionResultEntity>>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.list_results(session_id) })
    }

    fn subscribe(
        &self,
        filter: ChangeFilter,
    ) -> BoxFuture<'static, StorageResult<BoxStream<'static, RowChange>>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.subscribe(filter) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ensure_online() })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move { inner.ensure_online() })
    }
}
