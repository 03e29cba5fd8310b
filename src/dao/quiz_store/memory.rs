//! In-process store used for tests and single-node deployments without a database.

use std::{collections::HashMap, sync::Arc};

use futures::future::BoxFuture;
use indexmap::IndexMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{
    models::{
        GameSessionEntity, ParticipantEntity, QuestionEntity, QuizEntity, ResponseEntity,
        SessionStatusEntity,
    },
    quiz_store::{QuizStore, SessionGuard, SessionPatch, UpdateOutcome},
    storage::{StorageError, StorageResult},
};

#[derive(Default)]
struct Tables {
    quizzes: HashMap<Uuid, QuizEntity>,
    questions: HashMap<Uuid, Vec<QuestionEntity>>,
    sessions: HashMap<Uuid, GameSessionEntity>,
    participants: IndexMap<Uuid, ParticipantEntity>,
    /// Keyed by (participant, question) so a resubmission replaces the row in place.
    responses: IndexMap<(Uuid, Uuid), ResponseEntity>,
}

/// [`QuizStore`] backed by in-memory tables behind a single lock, so every
/// conditional write is atomic.
#[derive(Clone, Default)]
pub struct MemoryQuizStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryQuizStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of session rows, finished ones included.
    pub async fn session_count(&self) -> usize {
        self.tables.read().await.sessions.len()
    }

    /// Number of sessions still holding their PIN.
    pub async fn open_session_count(&self) -> usize {
        self.tables
            .read()
            .await
            .sessions
            .values()
            .filter(|session| session.status != SessionStatusEntity::Finished)
            .count()
    }
}

impl QuizStore for MemoryQuizStore {
    fn save_quiz(
        &self,
        quiz: QuizEntity,
        mut questions: Vec<QuestionEntity>,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            let mut guard = tables.write().await;
            for question in questions.iter_mut() {
                question.answers.sort_by_key(|answer| answer.order_index);
            }
            questions.sort_by_key(|question| question.order_index);
            guard.questions.insert(quiz.id, questions);
            guard.quizzes.insert(quiz.id, quiz);
            Ok(())
        })
    }

    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>> {
        let tables = self.tables.clone();
        Box::pin(async move { Ok(tables.read().await.quizzes.get(&id).cloned()) })
    }

    fn list_questions(
        &self,
        quiz_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            Ok(tables
                .read()
                .await
                .questions
                .get(&quiz_id)
                .cloned()
                .unwrap_or_default())
        })
    }

    fn insert_session(&self, session: GameSessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            let mut guard = tables.write().await;
            let pin_taken = guard.sessions.values().any(|existing| {
                existing.status != SessionStatusEntity::Finished
                    && existing.access_pin == session.access_pin
            });
            if pin_taken {
                return Err(StorageError::conflict(format!(
                    "access pin `{}` is already in use",
                    session.access_pin
                )));
            }
            guard.sessions.insert(session.id, session);
            Ok(())
        })
    }

    fn find_session(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>> {
        let tables = self.tables.clone();
        Box::pin(async move { Ok(tables.read().await.sessions.get(&id).cloned()) })
    }

    fn find_open_session_by_pin(
        &self,
        pin: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            Ok(tables
                .read()
                .await
                .sessions
                .values()
                .find(|session| {
                    session.status != SessionStatusEntity::Finished && session.access_pin == pin
                })
                .cloned())
        })
    }

    fn update_session(
        &self,
        id: Uuid,
        guard: SessionGuard,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<UpdateOutcome>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            let mut tables = tables.write().await;
            let Some(row) = tables.sessions.get_mut(&id) else {
                return Ok(UpdateOutcome::Missing);
            };
            if !guard.matches(row) {
                return Ok(UpdateOutcome::GuardFailed(row.clone()));
            }
            patch.apply_to(row);
            Ok(UpdateOutcome::Applied(row.clone()))
        })
    }

    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            let mut guard = tables.write().await;
            let taken = guard.participants.values().any(|existing| {
                existing.session_id == participant.session_id
                    && existing.nickname == participant.nickname
            });
            if taken {
                return Err(StorageError::conflict(format!(
                    "nickname `{}` is already taken",
                    participant.nickname
                )));
            }
            guard.participants.insert(participant.id, participant);
            Ok(())
        })
    }

    fn find_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>> {
        let tables = self.tables.clone();
        Box::pin(async move { Ok(tables.read().await.participants.get(&id).cloned()) })
    }

    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            let guard = tables.read().await;
            let mut participants: Vec<ParticipantEntity> = guard
                .participants
                .values()
                .filter(|participant| participant.session_id == session_id)
                .cloned()
                .collect();
            participants.sort_by_key(|participant| (participant.joined_at, participant.join_seq));
            Ok(participants)
        })
    }

    fn delete_participant(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            let mut guard = tables.write().await;
            let removed = guard.participants.shift_remove(&id).is_some();
            guard
                .responses
                .retain(|(participant_id, _), _| *participant_id != id);
            Ok(removed)
        })
    }

    fn set_participant_score(
        &self,
        id: Uuid,
        score: u32,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            if let Some(participant) = tables.write().await.participants.get_mut(&id) {
                participant.score = score;
            }
            Ok(())
        })
    }

    fn upsert_response(&self, response: ResponseEntity) -> BoxFuture<'static, StorageResult<()>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            let key = (response.participant_id, response.question_id);
            tables.write().await.responses.insert(key, response);
            Ok(())
        })
    }

    fn delete_response(
        &self,
        participant_id: Uuid,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            Ok(tables
                .write()
                .await
                .responses
                .shift_remove(&(participant_id, question_id))
                .is_some())
        })
    }

    fn list_responses(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ResponseEntity>>> {
        let tables = self.tables.clone();
        Box::pin(async move {
            Ok(tables
                .read()
                .await
                .responses
                .values()
                .filter(|response| response.session_id == session_id)
                .cloned()
                .collect())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async { Ok(()) })
    }
}
