use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Who may host a quiz besides its owner.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityEntity {
    Public,
    Private,
}

/// Quiz header row. Questions live in their own table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuizEntity {
    /// Stable identifier for the quiz.
    pub id: Uuid,
    /// Title shown in lobbies and results.
    pub title: String,
    /// Free-form description.
    pub description: Option<String>,
    /// Whether non-owners may host the quiz.
    pub visibility: VisibilityEntity,
    /// Profile that authored the quiz.
    pub owner_id: Uuid,
    /// Creation timestamp.
    pub created_at: SystemTime,
}

/// Question row, carrying its ordered answers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QuestionEntity {
    /// Stable identifier for the question.
    pub id: Uuid,
    /// Owning quiz.
    pub quiz_id: Uuid,
    /// Question prompt.
    pub text: String,
    /// Per-question window in seconds (self-paced modes and scoring).
    pub time_limit_secs: u32,
    /// Base points for a correct answer.
    pub points: u32,
    /// Canonical position inside the quiz.
    pub order_index: u32,
    /// Answer options.
    pub answers: Vec<AnswerEntity>,
}

/// Answer option row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnswerEntity {
    /// Stable identifier for the answer.
    pub id: Uuid,
    /// Answer text.
    pub text: String,
    /// Presentation hint.
    pub color: Option<String>,
    /// Whether picking this answer is correct.
    pub is_correct: bool,
    /// Canonical position inside the question.
    pub order_index: u32,
}

/// Session mode persisted alongside the session row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionModeEntity {
    HostedMultiplayer,
    SoloTimed,
    PracticeUntimed,
}

/// Stored session status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatusEntity {
    Waiting,
    Active,
    Finished,
}

/// Game session row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameSessionEntity {
    /// Primary key of the session.
    pub id: Uuid,
    /// Quiz being played.
    pub quiz_id: Uuid,
    /// Profile that created the session.
    pub host_id: Uuid,
    /// Human-enterable join code.
    pub access_pin: String,
    /// Game mode.
    pub mode: SessionModeEntity,
    /// Lifecycle status.
    pub status: SessionStatusEntity,
    /// Session-wide time budget; `None` means untimed.
    pub total_time_minutes: Option<u32>,
    /// Instant the pre-game countdown began.
    pub countdown_started_at: Option<SystemTime>,
    /// Instant active play begins.
    pub started_at: Option<SystemTime>,
    /// Instant the session finished.
    pub ended_at: Option<SystemTime>,
    /// Creation timestamp.
    pub created_at: SystemTime,
}

/// Participant row; `score` is a write-through copy of the recomputed total.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantEntity {
    /// Primary key of the participant.
    pub id: Uuid,
    /// Session joined.
    pub session_id: Uuid,
    /// Linked profile, absent for anonymous players.
    pub user_id: Option<Uuid>,
    /// Display name, unique per session.
    pub nickname: String,
    /// Cached total points.
    pub score: u32,
    /// Join timestamp.
    pub joined_at: SystemTime,
    /// Monotonic join sequence inside the session, used to break ties.
    pub join_seq: u64,
}

/// Response row; at most one per (participant, question).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResponseEntity {
    /// Primary key of the response.
    pub id: Uuid,
    /// Session the response belongs to.
    pub session_id: Uuid,
    /// Answering participant.
    pub participant_id: Uuid,
    /// Question answered.
    pub question_id: Uuid,
    /// Selected answer; `None` means the window expired unanswered.
    pub answer_id: Option<Uuid>,
    /// Milliseconds elapsed inside the question window.
    pub response_time_ms: u64,
    /// Submission timestamp.
    pub created_at: SystemTime,
}
