use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dao::models::{
        AnswerEntity, GameSessionEntity, ParticipantEntity, QuestionEntity, QuizEntity,
        ResponseEntity, VisibilityEntity,
    },
    state::state_machine::{SessionMode, SessionStatus},
};

/// Who may host a quiz besides its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Anyone can host it.
    Public,
    /// Only the owner can host it.
    Private,
}

/// A quiz with its ordered questions.
#[derive(Debug, Clone)]
pub struct Quiz {
    /// Stable identifier for the quiz.
    pub id: Uuid,
    /// Display title.
    pub title: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Hosting visibility.
    pub visibility: Visibility,
    /// Authoring profile.
    pub owner_id: Uuid,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Questions in canonical order.
    pub questions: Vec<Question>,
}

impl Quiz {
    /// Whether `host_id` is allowed to open a session on this quiz.
    pub fn can_be_hosted_by(&self, host_id: Uuid) -> bool {
        self.owner_id == host_id || self.visibility == Visibility::Public
    }

    /// Look a question up by id.
    pub fn question(&self, id: Uuid) -> Option<&Question> {
        self.questions.iter().find(|question| question.id == id)
    }
}

/// Question with its ordered answers.
#[derive(Debug, Clone)]
pub struct Question {
    /// Stable identifier for the question.
    pub id: Uuid,
    /// Prompt.
    pub text: String,
    /// Per-question window in seconds.
    pub time_limit_secs: u32,
    /// Base points for a correct answer.
    pub points: u32,
    /// Canonical position.
    pub order_index: u32,
    /// Answers in canonical order.
    pub answers: Vec<Answer>,
}

impl Question {
    /// The answer that counts as correct: the first one flagged, if any.
    ///
    /// Questions flagging several answers still have a single winner, and questions flagging
    /// none simply cannot be won.
    pub fn canonical_correct_answer(&self) -> Option<&Answer> {
        self.answers.iter().find(|answer| answer.is_correct)
    }

    /// Whether picking `answer_id` scores.
    pub fn is_correct(&self, answer_id: Option<Uuid>) -> bool {
        match (answer_id, self.canonical_correct_answer()) {
            (Some(picked), Some(correct)) => picked == correct.id,
            _ => false,
        }
    }

    /// Whether `answer_id` belongs to this question.
    pub fn has_answer(&self, answer_id: Uuid) -> bool {
        self.answers.iter().any(|answer| answer.id == answer_id)
    }

    /// Question window in milliseconds.
    pub fn time_limit_ms(&self) -> u64 {
        u64::from(self.time_limit_secs) * 1000
    }
}

/// Answer option.
#[derive(Debug, Clone)]
pub struct Answer {
    /// Stable identifier for the answer.
    pub id: Uuid,
    /// Answer text.
    pub text: String,
    /// Presentation hint.
    pub color: Option<String>,
    /// Whether this option is flagged correct.
    pub is_correct: bool,
    /// Canonical position.
    pub order_index: u32,
}

/// Runtime view of a session row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSession {
    /// Primary key.
    pub id: Uuid,
    /// Quiz being played.
    pub quiz_id: Uuid,
    /// Profile that created the session.
    pub host_id: Uuid,
    /// Join code.
    pub access_pin: String,
    /// Game mode.
    pub mode: SessionMode,
    /// Stored status.
    pub status: SessionStatus,
    /// Session-wide budget, `None` when untimed.
    pub total_time_minutes: Option<u32>,
    /// Instant the countdown began.
    pub countdown_started_at: Option<SystemTime>,
    /// Instant active play begins.
    pub started_at: Option<SystemTime>,
    /// Instant the session finished.
    pub ended_at: Option<SystemTime>,
    /// Creation timestamp.
    pub created_at: SystemTime,
}

impl GameSession {
    /// Build a fresh waiting session.
    pub fn new(
        quiz_id: Uuid,
        host_id: Uuid,
        access_pin: String,
        mode: SessionMode,
        now: SystemTime,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            quiz_id,
            host_id,
            access_pin,
            mode,
            status: SessionStatus::Waiting,
            total_time_minutes: None,
            countdown_started_at: None,
            started_at: None,
            ended_at: None,
            created_at: now,
        }
    }

    /// Whether the caller is the session host.
    pub fn is_host(&self, user_id: Option<Uuid>) -> bool {
        user_id == Some(self.host_id)
    }
}

/// A player's identity inside one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Participant {
    /// Primary key.
    pub id: Uuid,
    /// Session joined.
    pub session_id: Uuid,
    /// Linked profile.
    pub user_id: Option<Uuid>,
    /// Display name.
    pub nickname: String,
    /// Cached total; always overwritten with a recomputed value.
    pub score: u32,
    /// Join timestamp.
    pub joined_at: SystemTime,
    /// Tie-breaker for participants joining within the same instant.
    pub join_seq: u64,
}

/// One recorded answer, or non-answer, for one question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Primary key.
    pub id: Uuid,
    /// Session.
    pub session_id: Uuid,
    /// Answering participant.
    pub participant_id: Uuid,
    /// Question answered.
    pub question_id: Uuid,
    /// Selected answer, `None` when the window expired.
    pub answer_id: Option<Uuid>,
    /// Milliseconds elapsed inside the question window.
    pub response_time_ms: u64,
    /// Submission timestamp.
    pub created_at: SystemTime,
}

impl From<VisibilityEntity> for Visibility {
    fn from(value: VisibilityEntity) -> Self {
        match value {
            VisibilityEntity::Public => Visibility::Public,
            VisibilityEntity::Private => Visibility::Private,
        }
    }
}

impl From<Visibility> for VisibilityEntity {
    fn from(value: Visibility) -> Self {
        match value {
            Visibility::Public => VisibilityEntity::Public,
            Visibility::Private => VisibilityEntity::Private,
        }
    }
}

impl From<(QuizEntity, Vec<QuestionEntity>)> for Quiz {
    fn from((quiz, questions): (QuizEntity, Vec<QuestionEntity>)) -> Self {
        let mut questions: Vec<Question> = questions.into_iter().map(Into::into).collect();
        questions.sort_by_key(|question| question.order_index);
        Self {
            id: quiz.id,
            title: quiz.title,
            description: quiz.description,
            visibility: quiz.visibility.into(),
            owner_id: quiz.owner_id,
            created_at: quiz.created_at,
            questions,
        }
    }
}

impl Quiz {
    /// Split into the rows persisted by the store.
    pub fn into_entities(self) -> (QuizEntity, Vec<QuestionEntity>) {
        let quiz_id = self.id;
        let questions = self
            .questions
            .into_iter()
            .map(|question| QuestionEntity {
                id: question.id,
                quiz_id,
                text: question.text,
                time_limit_secs: question.time_limit_secs,
                points: question.points,
                order_index: question.order_index,
                answers: question
                    .answers
                    .into_iter()
                    .map(|answer| AnswerEntity {
                        id: answer.id,
                        text: answer.text,
                        color: answer.color,
                        is_correct: answer.is_correct,
                        order_index: answer.order_index,
                    })
                    .collect(),
            })
            .collect();

        let quiz = QuizEntity {
            id: quiz_id,
            title: self.title,
            description: self.description,
            visibility: self.visibility.into(),
            owner_id: self.owner_id,
            created_at: self.created_at,
        };
        (quiz, questions)
    }
}

impl From<QuestionEntity> for Question {
    fn from(value: QuestionEntity) -> Self {
        let mut answers: Vec<Answer> = value
            .answers
            .into_iter()
            .map(|answer| Answer {
                id: answer.id,
                text: answer.text,
                color: answer.color,
                is_correct: answer.is_correct,
                order_index: answer.order_index,
            })
            .collect();
        answers.sort_by_key(|answer| answer.order_index);

        Self {
            id: value.id,
            text: value.text,
            time_limit_secs: value.time_limit_secs,
            points: value.points,
            order_index: value.order_index,
            answers,
        }
    }
}

impl From<GameSessionEntity> for GameSession {
    fn from(value: GameSessionEntity) -> Self {
        Self {
            id: value.id,
            quiz_id: value.quiz_id,
            host_id: value.host_id,
            access_pin: value.access_pin,
            mode: value.mode.into(),
            status: value.status.into(),
            total_time_minutes: value.total_time_minutes,
            countdown_started_at: value.countdown_started_at,
            started_at: value.started_at,
            ended_at: value.ended_at,
            created_at: value.created_at,
        }
    }
}

impl From<GameSession> for GameSessionEntity {
    fn from(value: GameSession) -> Self {
        Self {
            id: value.id,
            quiz_id: value.quiz_id,
            host_id: value.host_id,
            access_pin: value.access_pin,
            mode: value.mode.into(),
            status: value.status.into(),
            total_time_minutes: value.total_time_minutes,
            countdown_started_at: value.countdown_started_at,
            started_at: value.started_at,
            ended_at: value.ended_at,
            created_at: value.created_at,
        }
    }
}

impl From<ParticipantEntity> for Participant {
    fn from(value: ParticipantEntity) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            user_id: value.user_id,
            nickname: value.nickname,
            score: value.score,
            joined_at: value.joined_at,
            join_seq: value.join_seq,
        }
    }
}

impl From<Participant> for ParticipantEntity {
    fn from(value: Participant) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            user_id: value.user_id,
            nickname: value.nickname,
            score: value.score,
            joined_at: value.joined_at,
            join_seq: value.join_seq,
        }
    }
}

impl From<ResponseEntity> for Response {
    fn from(value: ResponseEntity) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            participant_id: value.participant_id,
            question_id: value.question_id,
            answer_id: value.answer_id,
            response_time_ms: value.response_time_ms,
            created_at: value.created_at,
        }
    }
}

impl From<Response> for ResponseEntity {
    fn from(value: Response) -> Self {
        Self {
            id: value.id,
            session_id: value.session_id,
            participant_id: value.participant_id,
            question_id: value.question_id,
            answer_id: value.answer_id,
            response_time_ms: value.response_time_ms,
            created_at: value.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn answer(is_correct: bool, order_index: u32) -> Answer {
        Answer {
            id: Uuid::new_v4(),
            text: format!("option {order_index}"),
            color: None,
            is_correct,
            order_index,
        }
    }

    fn question(answers: Vec<Answer>) -> Question {
        Question {
            id: Uuid::new_v4(),
            text: "2 + 2?".into(),
            time_limit_secs: 20,
            points: 1000,
            order_index: 0,
            answers,
        }
    }

    #[test]
    fn first_flagged_answer_wins_when_several_are_correct() {
        let q = question(vec![answer(false, 0), answer(true, 1), answer(true, 2)]);
        let first = q.answers[1].id;
        let second = q.answers[2].id;
        assert_eq!(q.canonical_correct_answer().map(|a| a.id), Some(first));
        assert!(q.is_correct(Some(first)));
        assert!(!q.is_correct(Some(second)));
    }

    #[test]
    fn question_without_correct_answer_is_unwinnable() {
        let q = question(vec![answer(false, 0), answer(false, 1)]);
        let picked = q.answers[0].id;
        assert!(q.canonical_correct_answer().is_none());
        assert!(!q.is_correct(Some(picked)));
        assert!(!q.is_correct(None));
    }
}
