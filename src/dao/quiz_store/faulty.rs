//! Store wrapper that injects failures and races into an otherwise in-memory store.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{
        GameSessionEntity, ParticipantEntity, QuestionEntity, QuizEntity, ResponseEntity,
        SessionStatusEntity,
    },
    quiz_store::{QuizStore, SessionGuard, SessionPatch, UpdateOutcome, memory::MemoryQuizStore},
    storage::{StorageError, StorageResult},
};

#[derive(Clone, Default)]
pub struct FaultyQuizStore {
    inner: MemoryQuizStore,
    fail_participant_inserts: Arc<AtomicBool>,
    finish_before_response_write: Arc<AtomicBool>,
}

impl FaultyQuizStore {
    pub fn new(inner: MemoryQuizStore) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Make every participant insert fail as if the backend were down.
    pub fn fail_participant_inserts(&self) {
        self.fail_participant_inserts.store(true, Ordering::SeqCst);
    }

    /// Finish the session right before the next response lands, once.
    pub fn finish_before_next_response_write(&self) {
        self.finish_before_response_write.store(true, Ordering::SeqCst);
    }
}

impl QuizStore for FaultyQuizStore {
    fn save_quiz(
        &self,
        quiz: QuizEntity,
        questions: Vec<QuestionEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.save_quiz(quiz, questions)
    }

    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        self.inner.find_quiz(id)
    }

    fn list_questions(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        self.inner.list_questions(quiz_id)
    }

    fn insert_session(&self, session: GameSessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.insert_session(session)
    }

    fn find_session(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>> {
        self.inner.find_session(id)
    }

    fn find_open_session_by_pin(
        &self,
        pin: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>> {
        self.inner.find_open_session_by_pin(pin)
    }

    fn update_session(
        &self,
        id: Uuid,
        guard: SessionGuard,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<UpdateOutcome>> {
        self.inner.update_session(id, guard, patch)
    }

    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        if self.fail_participant_inserts.load(Ordering::SeqCst) {
            return Box::pin(async {
                Err(StorageError::unavailable(
                    "participant insert failed".into(),
                    std::io::Error::other("connection reset"),
                ))
            });
        }
        self.inner.insert_participant(participant)
    }

    fn find_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        self.inner.find_participant(id)
    }

    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        self.inner.list_participants(session_id)
    }

    fn delete_participant(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.delete_participant(id)
    }

    fn set_participant_score(
        &self,
        id: Uuid,
        score: u32,
    ) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.set_participant_score(id, score)
    }

    fn upsert_response(&self, response: ResponseEntity) -> BoxFuture<'static, StorageResult<()>> {
        let inner = self.inner.clone();
        let finish = self.finish_before_response_write.swap(false, Ordering::SeqCst);
        Box::pin(async move {
            if finish {
                inner
                    .update_session(
                        response.session_id,
                        SessionGuard::status_in(&[SessionStatusEntity::Active]),
                        SessionPatch {
                            status: Some(SessionStatusEntity::Finished),
                            ended_at: Some(response.created_at),
                            ..SessionPatch::default()
                        },
                    )
                    .await?;
            }
            inner.upsert_response(response).await
        })
    }

    fn delete_response(
        &self,
        participant_id: Uuid,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        self.inner.delete_response(participant_id, question_id)
    }

    fn list_responses(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ResponseEntity>>> {
        self.inner.list_responses(session_id)
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.health_check()
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        self.inner.try_reconnect()
    }
}
