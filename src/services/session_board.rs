//! Consistent snapshot of everything a session read needs.
//!
//! Rows are read in a fixed order (session, quiz, participants, responses) and every derived
//! value is recomputed from them, so notifications arriving in any order converge on the same
//! answer once re-read.

use std::collections::HashMap;

use uuid::Uuid;

use crate::{
    dao::quiz_store::QuizStore,
    error::ServiceError,
    services::{quiz_service, scoring},
    state::{
        game::{GameSession, Participant, Quiz, Response},
        state_machine::SessionStatus,
    },
};

/// Session with its quiz, roster and response log.
#[derive(Debug, Clone)]
pub struct SessionBoard {
    pub session: GameSession,
    pub quiz: Quiz,
    pub participants: Vec<Participant>,
    pub responses: Vec<Response>,
}

impl SessionBoard {
    /// Read the board of `session_id`.
    pub async fn load(store: &dyn QuizStore, session_id: Uuid) -> Result<Self, ServiceError> {
        let session = find_session(store, session_id).await?;
        Self::load_for(store, session).await
    }

    /// Read the rest of the board around an already fetched session.
    pub async fn load_for(store: &dyn QuizStore, session: GameSession) -> Result<Self, ServiceError> {
        let quiz = quiz_service::load_quiz(store, session.quiz_id).await?;
        let mut participants: Vec<Participant> = store
            .list_participants(session.id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();
        participants.sort_by_key(|participant| participant.join_seq);
        let responses = store
            .list_responses(session.id)
            .await?
            .into_iter()
            .map(Into::into)
            .collect();

        Ok(Self {
            session,
            quiz,
            participants,
            responses,
        })
    }

    /// Per-participant tallies recomputed from the response log.
    pub fn tallies(&self) -> HashMap<Uuid, scoring::Tally> {
        scoring::tally(&self.quiz, &self.responses)
    }

    /// Whether results are final.
    pub fn is_final(&self) -> bool {
        self.session.status == SessionStatus::Finished
    }

    pub fn total_questions(&self) -> u32 {
        u32::try_from(self.quiz.questions.len()).unwrap_or(u32::MAX)
    }

    pub fn participant(&self, id: Uuid) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|participant| participant.id == id)
    }

    /// Whether `participant_id` has a response for every question.
    pub fn has_completed(&self, tallies: &HashMap<Uuid, scoring::Tally>, participant_id: Uuid) -> bool {
        let completed = tallies
            .get(&participant_id)
            .map(|tally| tally.completed)
            .unwrap_or(0);
        completed >= self.total_questions()
    }

    /// Whether a non-empty roster has responded to every question.
    pub fn everyone_completed(&self, tallies: &HashMap<Uuid, scoring::Tally>) -> bool {
        !self.participants.is_empty()
            && self
                .participants
                .iter()
                .all(|participant| self.has_completed(tallies, participant.id))
    }
}

/// Fetch a session row or fail with a not-found error.
pub async fn find_session(store: &dyn QuizStore, session_id: Uuid) -> Result<GameSession, ServiceError> {
    store
        .find_session(session_id)
        .await?
        .map(Into::into)
        .ok_or_else(|| ServiceError::NotFound(format!("session `{session_id}` not found")))
}
