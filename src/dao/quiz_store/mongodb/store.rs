use std::sync::Arc;

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{DateTime, Document, doc},
    options::{IndexOptions, ReturnDocument},
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult, is_duplicate_key},
    models::{
        MongoParticipantDocument, MongoQuestionDocument, MongoQuizDocument,
        MongoResponseDocument, MongoSessionDocument, doc_id,
    },
};
use crate::dao::{
    models::{
        GameSessionEntity, ParticipantEntity, QuestionEntity, QuizEntity, ResponseEntity,
        SessionStatusEntity,
    },
    quiz_store::{QuizStore, SessionGuard, SessionPatch, UpdateOutcome},
    storage::{StorageError, StorageResult},
};

const QUIZ_COLLECTION_NAME: &str = "quizzes";
const QUESTION_COLLECTION_NAME: &str = "questions";
const SESSION_COLLECTION_NAME: &str = "game_sessions";
const PARTICIPANT_COLLECTION_NAME: &str = "game_participants";
const RESPONSE_COLLECTION_NAME: &str = "game_responses";

#[derive(Clone)]
pub struct MongoQuizStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    #[allow(dead_code)]
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

fn status_key(status: SessionStatusEntity) -> &'static str {
    match status {
        SessionStatusEntity::Waiting => "waiting",
        SessionStatusEntity::Active => "active",
        SessionStatusEntity::Finished => "finished",
    }
}

fn guard_filter(id: Uuid, guard: &SessionGuard) -> Document {
    let statuses: Vec<&str> = guard.statuses.iter().copied().map(status_key).collect();
    let mut filter = doc_id(id);
    filter.insert("status", doc! { "$in": statuses });
    if guard.countdown_unset {
        filter.insert("countdown_started_at", mongodb::bson::Bson::Null);
    }
    filter
}

fn patch_update(patch: &SessionPatch) -> Document {
    let mut set = Document::new();
    if let Some(status) = patch.status {
        set.insert("status", status_key(status));
    }
    if let Some(total) = patch.total_time_minutes {
        set.insert("total_time_minutes", total.map(i64::from));
    }
    if let Some(at) = patch.countdown_started_at {
        set.insert("countdown_started_at", DateTime::from_system_time(at));
    }
    if let Some(at) = patch.started_at {
        set.insert("started_at", DateTime::from_system_time(at));
    }
    if let Some(at) = patch.ended_at {
        set.insert("ended_at", DateTime::from_system_time(at));
    }

    let mut update = doc! { "$set": set };
    if patch.status == Some(SessionStatusEntity::Finished) {
        update.insert("$unset", doc! { "open_pin": "" });
    }
    update
}

impl MongoQuizStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let indexes: [(&'static str, &'static str, Document, bool); 5] = [
            (
                QUESTION_COLLECTION_NAME,
                "quiz_id,order_index",
                doc! {"quiz_id": 1, "order_index": 1},
                false,
            ),
            (
                SESSION_COLLECTION_NAME,
                "open_pin",
                doc! {"open_pin": 1},
                true,
            ),
            (
                PARTICIPANT_COLLECTION_NAME,
                "session_id,nickname",
                doc! {"session_id": 1, "nickname": 1},
                true,
            ),
            (
                RESPONSE_COLLECTION_NAME,
                "participant_id,question_id",
                doc! {"participant_id": 1, "question_id": 1},
                true,
            ),
            (
                RESPONSE_COLLECTION_NAME,
                "session_id",
                doc! {"session_id": 1},
                false,
            ),
        ];

        for (collection, index, keys, unique) in indexes {
            let model = IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(Some(format!("{}_idx", index.replace(',', "_"))))
                        .unique(Some(unique))
                        .sparse(Some(index == "open_pin"))
                        .build(),
                )
                .build();

            database
                .collection::<Document>(collection)
                .create_index(model)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection,
                    index,
                    source,
                })?;
        }

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn quizzes(&self) -> Collection<MongoQuizDocument> {
        self.database().await.collection(QUIZ_COLLECTION_NAME)
    }

    async fn questions(&self) -> Collection<MongoQuestionDocument> {
        self.database().await.collection(QUESTION_COLLECTION_NAME)
    }

    async fn sessions(&self) -> Collection<MongoSessionDocument> {
        self.database().await.collection(SESSION_COLLECTION_NAME)
    }

    async fn participants(&self) -> Collection<MongoParticipantDocument> {
        self.database().await.collection(PARTICIPANT_COLLECTION_NAME)
    }

    async fn responses(&self) -> Collection<MongoResponseDocument> {
        self.database().await.collection(RESPONSE_COLLECTION_NAME)
    }

    async fn save_quiz(&self, quiz: QuizEntity, questions: Vec<QuestionEntity>) -> MongoResult<()> {
        let id = quiz.id;
        let document: MongoQuizDocument = quiz.into();
        self.quizzes()
            .await
            .replace_one(doc_id(id), &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveQuiz { id, source })?;

        let collection = self.questions().await;
        collection
            .delete_many(doc! {"quiz_id": id.to_string()})
            .await
            .map_err(|source| MongoDaoError::SaveQuiz { id, source })?;

        if questions.is_empty() {
            return Ok(());
        }
        let documents: Vec<MongoQuestionDocument> =
            questions.into_iter().map(Into::into).collect();
        collection
            .insert_many(documents)
            .await
            .map_err(|source| MongoDaoError::SaveQuiz { id, source })?;

        Ok(())
    }

    async fn find_quiz(&self, id: Uuid) -> MongoResult<Option<QuizEntity>> {
        self.quizzes()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadQuiz { id, source })?
            .map(TryInto::try_into)
            .transpose()
    }

    async fn list_questions(&self, quiz_id: Uuid) -> MongoResult<Vec<QuestionEntity>> {
        let documents: Vec<MongoQuestionDocument> = self
            .questions()
            .await
            .find(doc! {"quiz_id": quiz_id.to_string()})
            .sort(doc! {"order_index": 1})
            .await
            .map_err(|source| MongoDaoError::LoadQuiz {
                id: quiz_id,
                source,
            })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadQuiz {
                id: quiz_id,
                source,
            })?;

        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn insert_session(&self, session: GameSessionEntity) -> StorageResult<()> {
        let id = session.id;
        let pin = session.access_pin.clone();
        let document: MongoSessionDocument = session.into();
        match self.sessions().await.insert_one(&document).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => Err(StorageError::conflict(format!(
                "access pin `{pin}` is already in use"
            ))),
            Err(source) => Err(MongoDaoError::SaveSession { id, source }.into()),
        }
    }

    async fn find_session_by(&self, filter: Document) -> MongoResult<Option<GameSessionEntity>> {
        self.sessions()
            .await
            .find_one(filter)
            .await
            .map_err(|source| MongoDaoError::LoadSession { source })?
            .map(TryInto::try_into)
            .transpose()
    }

    async fn update_session(
        &self,
        id: Uuid,
        guard: SessionGuard,
        patch: SessionPatch,
    ) -> MongoResult<UpdateOutcome> {
        let updated = self
            .sessions()
            .await
            .find_one_and_update(guard_filter(id, &guard), patch_update(&patch))
            .return_document(ReturnDocument::After)
            .await
            .map_err(|source| MongoDaoError::SaveSession { id, source })?;

        if let Some(document) = updated {
            return Ok(UpdateOutcome::Applied(document.try_into()?));
        }

        Ok(match self.find_session_by(doc_id(id)).await? {
            Some(current) => UpdateOutcome::GuardFailed(current),
            None => UpdateOutcome::Missing,
        })
    }

    async fn insert_participant(&self, participant: ParticipantEntity) -> StorageResult<()> {
        let id = participant.id;
        let nickname = participant.nickname.clone();
        let document: MongoParticipantDocument = participant.into();
        match self.participants().await.insert_one(&document).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key(&err) => Err(StorageError::conflict(format!(
                "nickname `{nickname}` is already taken"
            ))),
            Err(source) => Err(MongoDaoError::SaveParticipant { id, source }.into()),
        }
    }

    async fn find_participant(&self, id: Uuid) -> MongoResult<Option<ParticipantEntity>> {
        self.participants()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadParticipants { source })?
            .map(TryInto::try_into)
            .transpose()
    }

    async fn list_participants(&self, session_id: Uuid) -> MongoResult<Vec<ParticipantEntity>> {
        let documents: Vec<MongoParticipantDocument> = self
            .participants()
            .await
            .find(doc! {"session_id": session_id.to_string()})
            .sort(doc! {"joined_at": 1, "join_seq": 1})
            .await
            .map_err(|source| MongoDaoError::LoadParticipants { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadParticipants { source })?;

        documents.into_iter().map(TryInto::try_into).collect()
    }

    async fn delete_participant(&self, id: Uuid) -> MongoResult<bool> {
        let result = self
            .participants()
            .await
            .delete_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::SaveParticipant { id, source })?;

        self.responses()
            .await
            .delete_many(doc! {"participant_id": id.to_string()})
            .await
            .map_err(|source| MongoDaoError::SaveResponse {
                participant_id: id,
                source,
            })?;

        Ok(result.deleted_count > 0)
    }

    async fn set_participant_score(&self, id: Uuid, score: u32) -> MongoResult<()> {
        self.participants()
            .await
            .update_one(doc_id(id), doc! {"$set": {"score": i64::from(score)}})
            .await
            .map_err(|source| MongoDaoError::SaveParticipant { id, source })?;
        Ok(())
    }

    async fn upsert_response(&self, response: ResponseEntity) -> MongoResult<()> {
        let participant_id = response.participant_id;
        let document: MongoResponseDocument = response.into();
        self.responses()
            .await
            .update_one(document.natural_key(), document.upsert_update())
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveResponse {
                participant_id,
                source,
            })?;
        Ok(())
    }

    async fn delete_response(&self, participant_id: Uuid, question_id: Uuid) -> MongoResult<bool> {
        let result = self
            .responses()
            .await
            .delete_one(doc! {
                "participant_id": participant_id.to_string(),
                "question_id": question_id.to_string(),
            })
            .await
            .map_err(|source| MongoDaoError::SaveResponse {
                participant_id,
                source,
            })?;
        Ok(result.deleted_count > 0)
    }

    async fn list_responses(&self, session_id: Uuid) -> MongoResult<Vec<ResponseEntity>> {
        let documents: Vec<MongoResponseDocument> = self
            .responses()
            .await
            .find(doc! {"session_id": session_id.to_string()})
            .await
            .map_err(|source| MongoDaoError::LoadResponses { session_id, source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::LoadResponses { session_id, source })?;

        documents.into_iter().map(TryInto::try_into).collect()
    }
}

impl QuizStore for MongoQuizStore {
    fn save_quiz(
        &self,
        quiz: QuizEntity,
        questions: Vec<QuestionEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_quiz(quiz, questions).await.map_err(Into::into) })
    }

    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_quiz(id).await.map_err(Into::into) })
    }

    fn list_questions(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_questions(quiz_id).await.map_err(Into::into) })
    }

    fn insert_session(&self, session: GameSessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_session(session).await })
    }

    fn find_session(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_session_by(doc_id(id)).await.map_err(Into::into) })
    }

    fn find_open_session_by_pin(
        &self,
        pin: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .find_session_by(doc! {"open_pin": pin})
                .await
                .map_err(Into::into)
        })
    }

    fn update_session(
        &self,
        id: Uuid,
        guard: SessionGuard,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<UpdateOutcome>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update_session(id, guard, patch)
                .await
                .map_err(Into::into)
        })
    }

    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_participant(participant).await })
    }

    fn find_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_participant(id).await.map_err(Into::into) })
    }

    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_participants(session_id).await.map_err(Into::into) })
    }

    fn delete_participant(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_participant(id).await.map_err(Into::into) })
    }

    fn set_participant_score(
        &self,
        id: Uuid,
        score: u32,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .set_participant_score(id, score)
                .await
                .map_err(Into::into)
        })
    }

    fn upsert_response(&self, response: ResponseEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.upsert_response(response).await.map_err(Into::into) })
    }

    fn delete_response(
        &self,
        participant_id: Uuid,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_response(participant_id, question_id)
                .await
                .map_err(Into::into)
        })
    }

    fn list_responses(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ResponseEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.list_responses(session_id).await.map_err(Into::into) })
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
