use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, future::BoxFuture, stream::BoxStream};
use mongodb::{
    Collection, Database, IndexModel,
    bson::{DateTime, Document, doc},
    change_stream::event::OperationType,
    options::{FullDocumentType, IndexOptions, ReturnDocument},
};
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::open_database,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{
        ANSWER_COLLECTION, MongoAnswerDocument, MongoOptionDocument, MongoParticipantDocument,
        MongoQuestionDocument, MongoQuizDocument, MongoResultDocument, MongoScoreDocument,
        MongoSessionDocument, OPTION_COLLECTION, PARTICIPANT_COLLECTION, QUESTION_COLLECTION,
        QUIZ_COLLECTION, RESULT_COLLECTION, SCORE_COLLECTION, SESSION_COLLECTION, doc_id, pair_id,
    },
};
use crate::dao::{
    models::{
        AnswerEntity, OptionEntity, ParticipantEntity, QuestionEntity, QuizEntity, ScoreEntity,
        SessionEntity, SessionResultEntity,
    },
    session_store::{ChangeFilter, ChangeKind, ChangeRow, RowChange, SessionStore, Table},
    storage::StorageResult,
};

/// MongoDB backed [`SessionStore`].
///
/// The change feed relies on change streams, so the server must run as a replica set.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let database = open_database(&self.config).await?;
        *self.database.write().await = database;
        Ok(())
    }
}

struct IndexSpec {
    collection: &'static str,
    name: &'static str,
    keys: Document,
    unique: bool,
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let database = open_database(&config).await?;

        let store = Self {
            inner: Arc::new(MongoInner {
                database: RwLock::new(database),
                config,
            }),
        };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let specs = [
            IndexSpec {
                collection: SESSION_COLLECTION,
                name: "session_code_idx",
                keys: doc! {"code": 1},
                unique: true,
            },
            IndexSpec {
                collection: SESSION_COLLECTION,
                name: "session_owner_idx",
                keys: doc! {"owner_id": 1, "created_at": -1},
                unique: false,
            },
            IndexSpec {
                collection: QUESTION_COLLECTION,
                name: "question_quiz_order_idx",
                keys: doc! {"quiz_id": 1, "order_index": 1},
                unique: true,
            },
            IndexSpec {
                collection: OPTION_COLLECTION,
                name: "option_question_idx",
                keys: doc! {"question_id": 1},
                unique: false,
            },
            IndexSpec {
                collection: PARTICIPANT_COLLECTION,
                name: "participant_session_idx",
                keys: doc! {"session_id": 1, "joined_at": 1},
                unique: false,
            },
            IndexSpec {
                collection: SCORE_COLLECTION,
                name: "score_session_participant_idx",
                keys: doc! {"session_id": 1, "participant_id": 1},
                unique: true,
            },
            IndexSpec {
                collection: ANSWER_COLLECTION,
                name: "answer_session_question_participant_idx",
                keys: doc! {"session_id": 1, "question_id": 1, "participant_id": 1},
                unique: true,
            },
            IndexSpec {
                collection: RESULT_COLLECTION,
                name: "result_session_participant_idx",
                keys: doc! {"session_id": 1, "participant_id": 1},
                unique: true,
            },
        ];

        let database = self.database().await;
        for spec in specs {
            let index = IndexModel::builder()
                .keys(spec.keys)
                .options(
                    IndexOptions::builder()
                        .name(Some(spec.name.to_owned()))
                        .unique(Some(spec.unique))
                        .build(),
                )
                .build();
            database
                .collection::<Document>(spec.collection)
                .create_index(index)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection: spec.collection,
                    index: spec.name,
                    source,
                })?;
        }

        Ok(())
    }

    async fn database(&self) -> Database {
        self.inner.database.read().await.clone()
    }

    async fn collection<D: Send + Sync>(&self, name: &'static str) -> Collection<D> {
        self.database().await.collection::<D>(name)
    }

    async fn find_one_as<D, E>(&self, collection: &'static str, filter: Document) -> MongoResult<Option<E>>
    where
        D: DeserializeOwned + Send + Sync + Unpin,
        E: TryFrom<D, Error = MongoDaoError>,
    {
        self.collection::<D>(collection)
            .await
            .find_one(filter)
            .await
            .map_err(|source| MongoDaoError::query("load document", collection, source))?
            .map(E::try_from)
            .transpose()
    }

    async fn find_many_as<D, E>(
        &self,
        collection: &'static str,
        filter: Document,
        sort: Document,
    ) -> MongoResult<Vec<E>>
    where
        D: DeserializeOwned + Send + Sync + Unpin,
        E: TryFrom<D, Error = MongoDaoError>,
    {
        let documents: Vec<D> = self
            .collection::<D>(collection)
            .await
            .find(filter)
            .sort(sort)
            .await
            .map_err(|source| MongoDaoError::query("list documents", collection, source))?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::query("list documents", collection, source))?;

        documents.into_iter().map(E::try_from).collect()
    }

    async fn upsert_as<D>(&self, collection: &'static str, filter: Document, document: D) -> MongoResult<()>
    where
        D: Serialize + Send + Sync,
    {
        self.collection::<D>(collection)
            .await
            .replace_one(filter, &document)
            .upsert(true)
            .await
            .map_err(|source| {
                MongoDaoError::write("upsert document", collection, collection, source)
            })?;
        Ok(())
    }

    async fn insert_as<D>(
        &self,
        collection: &'static str,
        constraint: &'static str,
        document: D,
    ) -> MongoResult<()>
    where
        D: Serialize + Send + Sync,
    {
        self.collection::<D>(collection)
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::write("insert document", collection, constraint, source))?;
        Ok(())
    }

    async fn update_session(&self, session: SessionEntity, expected_version: u64) -> MongoResult<bool> {
        let filter = doc! {
            "_id": session.id.to_string(),
            "version": i64::try_from(expected_version).unwrap_or(i64::MAX),
        };
        let document = MongoSessionDocument::from(session);
        let result = self
            .collection::<MongoSessionDocument>(SESSION_COLLECTION)
            .await
            .replace_one(filter, &document)
            .await
            .map_err(|source| MongoDaoError::query("update session", SESSION_COLLECTION, source))?;
        Ok(result.matched_count == 1)
    }

    async fn award_points(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        question_id: Uuid,
        points: i64,
    ) -> MongoResult<Option<ScoreEntity>> {
        let question = question_id.to_string();
        let filter = doc! {
            "_id": pair_id(session_id, participant_id),
            "awarded_questions": { "$ne": question.as_str() },
        };
        let update = doc! {
            "$inc": { "value": points },
            "$addToSet": { "awarded_questions": question.as_str() },
            "$set": { "last_update": DateTime::now() },
            "$setOnInsert": {
                "session_id": session_id.to_string(),
                "participant_id": participant_id.to_string(),
            },
        };

        let outcome = self
            .collection::<MongoScoreDocument>(SCORE_COLLECTION)
            .await
            .find_one_and_update(filter, update)
            .upsert(true)
            .return_document(ReturnDocument::After)
            .await;

        match outcome {
            Ok(document) => document.map(ScoreEntity::try_from).transpose(),
            // The filter misses an already-awarded row, so the upsert collides on `_id`.
            Err(source) if is_duplicate_key(&source) => Ok(None),
            Err(source) => Err(MongoDaoError::query("award points", SCORE_COLLECTION, source)),
        }
    }

    async fn remove_participant(&self, session_id: Uuid, participant_id: Uuid) -> MongoResult<()> {
        self.collection::<MongoParticipantDocument>(PARTICIPANT_COLLECTION)
            .await
            .delete_one(doc! {
                "_id": participant_id.to_string(),
                "session_id": session_id.to_string(),
            })
            .await
            .map_err(|source| {
                MongoDaoError::query("remove participant", PARTICIPANT_COLLECTION, source)
            })?;
        self.collection::<MongoScoreDocument>(SCORE_COLLECTION)
            .await
            .delete_one(doc_id(pair_id(session_id, participant_id)))
            .await
            .map_err(|source| MongoDaoError::query("remove score", SCORE_COLLECTION, source))?;
        Ok(())
    }

    async fn upsert_results(&self, results: Vec<SessionResultEntity>) -> MongoResult<()> {
        for result in results {
            let filter = doc_id(pair_id(result.session_id, result.participant_id));
            self.upsert_as(RESULT_COLLECTION, filter, MongoResultDocument::from(result))
                .await?;
        }
        Ok(())
    }

    async fn subscribe(&self, filter: ChangeFilter) -> MongoResult<BoxStream<'static, RowChange>> {
        let database = self.database().await;
        let session_id = filter.session_id;
        let mut streams = Vec::with_capacity(filter.tables.len());

        for table in filter.tables {
            let stream = match table {
                Table::Session => {
                    watch_collection::<MongoSessionDocument>(&database, SESSION_COLLECTION, session_id, |document| {
                        SessionEntity::try_from(document).ok().map(ChangeRow::Session)
                    })
                    .await?
                }
                Table::Participant => {
                    watch_collection::<MongoParticipantDocument>(&database, PARTICIPANT_COLLECTION, session_id, |document| {
                        ParticipantEntity::try_from(document)
                            .ok()
                            .map(ChangeRow::Participant)
                    })
                    .await?
                }
                Table::Score => {
                    watch_collection::<MongoScoreDocument>(&database, SCORE_COLLECTION, session_id, |document| {
                        ScoreEntity::try_from(document).ok().map(ChangeRow::Score)
                    })
                    .await?
                }
                Table::Answer => {
                    watch_collection::<MongoAnswerDocument>(&database, ANSWER_COLLECTION, session_id, |document| {
                        AnswerEntity::try_from(document).ok().map(ChangeRow::Answer)
                    })
                    .await?
                }
                Table::Result => {
                    watch_collection::<MongoResultDocument>(&database, RESULT_COLLECTION, session_id, |document| {
                        SessionResultEntity::try_from(document)
                            .ok()
                            .map(ChangeRow::Result)
                    })
                    .await?
                }
            };
            streams.push(stream);
        }

        Ok(futures::stream::select_all(streams).boxed())
    }
}

/// Open a change stream on one collection, scoped to a session, and map it to [`RowChange`]s.
///
/// The stream ends on the first driver error.
async fn watch_collection<D>(
    database: &Database,
    collection: &'static str,
    session_id: Uuid,
    into_row: fn(D) -> Option<ChangeRow>,
) -> MongoResult<BoxStream<'static, RowChange>>
where
    D: DeserializeOwned + Send + Sync + Unpin + 'static,
{
    let pipeline = [doc! { "$match": { "fullDocument.session_id": session_id.to_string() } }];
    let changes = database
        .collection::<D>(collection)
        .watch()
        .pipeline(pipeline)
        .full_document(FullDocumentType::UpdateLookup)
        .await
        .map_err(|source| MongoDaoError::Watch { collection, source })?;

    let stream = async_stream::stream! {
        let mut changes = Box::pin(changes);
        while let Some(event) = changes.next().await {
            let event = match event {
                Ok(event) => event,
                Err(err) => {
                    warn!(collection, error = %err, "change stream failed");
                    break;
                }
            };
            let kind = match event.operation_type {
                OperationType::Insert => ChangeKind::Insert,
                OperationType::Update | OperationType::Replace => ChangeKind::Update,
                _ => continue,
            };
            if let Some(row) = event.full_document.and_then(into_row) {
                yield RowChange { kind, row };
            }
        }
    };

    Ok(stream.boxed())
}

impl SessionStore for MongoSessionStore {
    fn save_quiz(&self, quiz: QuizEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .upsert_as(QUIZ_COLLECTION, doc_id(quiz.id), MongoQuizDocument::from(quiz))
                .await
                .map_err(Into::into)
        })
    }

    fn save_question(&self, question: QuestionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .upsert_as(
                    QUESTION_COLLECTION,
                    doc_id(question.id),
                    MongoQuestionDocument::from(question),
                )
                .await
                .map_err(Into::into)
        })
    }

    fn save_option(&self, option: OptionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .upsert_as(
                    OPTION_COLLECTION,
                    doc_id(option.id),
                    MongoOptionDocument::from(option),
                )
                .await
                .map_err(Into::into)
        })
    }

    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_one_as::<MongoQuizDocument, _>(QUIZ_COLLECTION, doc_id(id))
                .await
                .map_err(Into::into)
        })
    }

    fn find_question(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_one_as::<MongoQuestionDocument, _>(QUESTION_COLLECTION, doc_id(id))
                .await
                .map_err(Into::into)
        })
    }

    fn find_option(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<OptionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_one_as::<MongoOptionDocument, _>(OPTION_COLLECTION, doc_id(id))
                .await
                .map_err(Into::into)
        })
    }

    fn list_questions(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_many_as::<MongoQuestionDocument, _>(
                    QUESTION_COLLECTION,
                    doc! {"quiz_id": quiz_id.to_string()},
                    doc! {"order_index": 1},
                )
                .await
                .map_err(Into::into)
        })
    }

    fn list_options(
        &self,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<OptionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_many_as::<MongoOptionDocument, _>(
                    OPTION_COLLECTION,
                    doc! {"question_id": question_id.to_string()},
                    doc! {"_id": 1},
                )
                .await
                .map_err(Into::into)
        })
    }

    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .insert_as(
                    SESSION_COLLECTION,
                    "sessions.code",
                    MongoSessionDocument::from(session),
                )
                .await
                .map_err(Into::into)
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_one_as::<MongoSessionDocument, _>(SESSION_COLLECTION, doc_id(id))
                .await
                .map_err(Into::into)
        })
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_one_as::<MongoSessionDocument, _>(
                    SESSION_COLLECTION,
                    doc! {"code": code.to_uppercase()},
                )
                .await
                .map_err(Into::into)
        })
    }

    fn list_sessions_by_owner(
        &self,
        owner_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_many_as::<MongoSessionDocument, _>(
                    SESSION_COLLECTION,
                    doc! {"owner_id": owner_id.to_string()},
                    doc! {"created_at": -1, "_id": 1},
                )
                .await
                .map_err(Into::into)
        })
    }

    fn update_session(
        &self,
        session: SessionEntity,
        expected_version: u64,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_session(session, expected_version)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .insert_as(
                    PARTICIPANT_COLLECTION,
                    "participants.id",
                    MongoParticipantDocument::from(participant),
                )
                .await
                .map_err(Into::into)
        })
    }

    fn find_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_one_as::<MongoParticipantDocument, _>(PARTICIPANT_COLLECTION, doc_id(id))
                .await
                .map_err(Into::into)
        })
    }

    fn remove_participant(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .remove_participant(session_id, participant_id)
                .await
                .map_err(Into::into)
        })
    }

    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_many_as::<MongoParticipantDocument, _>(
                    PARTICIPANT_COLLECTION,
                    doc! {"session_id": session_id.to_string()},
                    doc! {"joined_at": 1, "_id": 1},
                )
                .await
                .map_err(Into::into)
        })
    }

    fn insert_score(&self, score: ScoreEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .insert_as(
                    SCORE_COLLECTION,
                    "scores.session_participant",
                    MongoScoreDocument::from(score),
                )
                .await
                .map_err(Into::into)
        })
    }

    fn list_scores(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<ScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_many_as::<MongoScoreDocument, _>(
                    SCORE_COLLECTION,
                    doc! {"session_id": session_id.to_string()},
                    doc! {"participant_id": 1},
                )
                .await
                .map_err(Into::into)
        })
    }

    fn award_points(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        question_id: Uuid,
        points: i64,
    ) -> BoxFuture<'static, StorageResult<Option<ScoreEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .award_points(session_id, participant_id, question_id, points)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_answer(&self, answer: AnswerEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .insert_as(
                    ANSWER_COLLECTION,
                    "answers.session_question_participant",
                    MongoAnswerDocument::from(answer),
                )
                .await
                .map_err(Into::into)
        })
    }

    fn list_answers(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_many_as::<MongoAnswerDocument, _>(
                    ANSWER_COLLECTION,
                    doc! {"session_id": session_id.to_string()},
                    doc! {"created_at": 1, "participant_id": 1},
                )
                .await
                .map_err(Into::into)
        })
    }

    fn list_question_answers(
        &self,
        session_id: Uuid,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<AnswerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_many_as::<MongoAnswerDocument, _>(
                    ANSWER_COLLECTION,
                    doc! {
                        "session_id": session_id.to_string(),
                        "question_id": question_id.to_string(),
                    },
                    doc! {"created_at": 1},
                )
                .await
                .map_err(Into::into)
        })
    }

    fn upsert_results(
        &self,
        results: Vec<SessionResultEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_results(results).await.map_err(Into::into) })
    }

    fn list_results(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionResultEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_many_as::<MongoResultDocument, _>(
                    RESULT_COLLECTION,
                    doc! {"session_id": session_id.to_string()},
                    doc! {"final_position": 1},
                )
                .await
                .map_err(Into::into)
        })
    }

    fn subscribe(
        &self,
        filter: ChangeFilter,
    ) -> BoxFuture<'static, StorageResult<BoxStream<'static, RowChange>>> {
        let store = self.clone();
        Box::pin(async move { store.subscribe(filter).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
