#[cfg(test)]
pub mod faulty;
pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    GameSessionEntity, ParticipantEntity, QuestionEntity, QuizEntity, ResponseEntity,
    SessionStatusEntity,
};
use crate::dao::storage::StorageResult;

/// Precondition a session row must satisfy for a conditional update to apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGuard {
    /// Statuses the row is allowed to be in.
    pub statuses: Vec<SessionStatusEntity>,
    /// Require `countdown_started_at` to still be unset.
    pub countdown_unset: bool,
}

impl SessionGuard {
    /// Guard accepting any of the listed statuses.
    pub fn status_in(statuses: &[SessionStatusEntity]) -> Self {
        Self {
            statuses: statuses.to_vec(),
            countdown_unset: false,
        }
    }

    /// Additionally require the countdown not to have started.
    pub fn with_countdown_unset(mut self) -> Self {
        self.countdown_unset = true;
        self
    }

    /// Evaluate the guard against a stored row.
    pub fn matches(&self, session: &GameSessionEntity) -> bool {
        self.statuses.contains(&session.status)
            && (!self.countdown_unset || session.countdown_started_at.is_none())
    }
}

/// Columns written by a conditional session update. `None` leaves a column untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    pub status: Option<SessionStatusEntity>,
    pub total_time_minutes: Option<Option<u32>>,
    pub countdown_started_at: Option<SystemTime>,
    pub started_at: Option<SystemTime>,
    pub ended_at: Option<SystemTime>,
}

impl SessionPatch {
    /// Write the patched columns into `session`.
    pub fn apply_to(&self, session: &mut GameSessionEntity) {
        if let Some(status) = self.status {
            session.status = status;
        }
        if let Some(total) = self.total_time_minutes {
            session.total_time_minutes = total;
        }
        if let Some(at) = self.countdown_started_at {
            session.countdown_started_at = Some(at);
        }
        if let Some(at) = self.started_at {
            session.started_at = Some(at);
        }
        if let Some(at) = self.ended_at {
            session.ended_at = Some(at);
        }
    }
}

/// Result of a conditional session update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The guard held and the patch was written; carries the new row.
    Applied(GameSessionEntity),
    /// The guard did not hold; carries the row as currently stored.
    GuardFailed(GameSessionEntity),
    /// No such session.
    Missing,
}

/// Abstraction over the persistence layer for quizzes and live sessions.
pub trait QuizStore: Send + Sync {
    fn save_quiz(
        &self,
        quiz: QuizEntity,
        questions: Vec<QuestionEntity>,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn find_quiz(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<QuizEntity>>>;
    /// Questions of a quiz ordered by `order_index`, answers ordered likewise.
    fn list_questions(&self, quiz_id: Uuid)
    -> BoxFuture<'static, StorageResult<Vec<QuestionEntity>>>;

    /// Insert a session; fails with a conflict when the PIN is held by an unfinished session.
    fn insert_session(&self, session: GameSessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_session(&self, id: Uuid)
    -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>>;
    fn find_open_session_by_pin(
        &self,
        pin: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameSessionEntity>>>;
    /// Apply `patch` only when `guard` holds, as a single atomic row update.
    fn update_session(
        &self,
        id: Uuid,
        guard: SessionGuard,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<UpdateOutcome>>;

    /// Insert a participant; fails with a conflict when the nickname is taken in the session.
    fn insert_participant(
        &self,
        participant: ParticipantEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    fn find_participant(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<ParticipantEntity>>>;
    /// Participants of a session in join order.
    fn list_participants(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ParticipantEntity>>>;
    /// Remove a participant and its responses. Returns whether a row was deleted.
    fn delete_participant(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    fn set_participant_score(&self, id: Uuid, score: u32)
    -> BoxFuture<'static, StorageResult<()>>;

    /// Insert or replace the response for the same (participant, question).
    fn upsert_response(&self, response: ResponseEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Remove the response of `participant_id` to `question_id`. Returns whether a row was deleted.
    fn delete_response(
        &self,
        participant_id: Uuid,
        question_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    fn list_responses(
        &self,
        session_id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Vec<ResponseEntity>>>;

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
