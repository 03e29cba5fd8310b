use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{format_system_time, session::SessionSummary},
    state::game::Participant,
};

/// Body of `POST /sessions/join`.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinRequest {
    /// Access PIN as typed by the player; case and surrounding spaces are ignored.
    #[validate(custom(function = "crate::dto::validation::validate_pin"))]
    pub pin: String,
    #[validate(custom(function = "crate::dto::validation::validate_nickname"))]
    pub nickname: String,
}

/// Returned once a player is admitted to the lobby.
#[derive(Debug, Serialize, ToSchema)]
pub struct JoinResponse {
    pub participant: ParticipantSummary,
    pub session: SessionSummary,
}

/// Participant as shown in lobbies and rosters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ParticipantSummary {
    pub id: Uuid,
    pub nickname: String,
    pub score: u32,
    pub joined_at: String,
}

impl ParticipantSummary {
    /// Project `participant` showing `score` instead of the cached column.
    pub fn with_score(participant: &Participant, score: u32) -> Self {
        Self {
            id: participant.id,
            nickname: participant.nickname.clone(),
            score,
            joined_at: format_system_time(participant.joined_at),
        }
    }
}

impl From<&Participant> for ParticipantSummary {
    fn from(participant: &Participant) -> Self {
        Self::with_score(participant, participant.score)
    }
}

/// One roster line of the progress view.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ProgressEntry {
    pub participant_id: Uuid,
    pub nickname: String,
    /// Distinct questions with a recorded response.
    pub completed: u32,
    pub total_questions: u32,
    /// `completed / total_questions`, in `[0, 1]`.
    pub progress: f64,
    pub score: u32,
}

/// Live completion of every participant, most advanced first.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct ProgressResponse {
    pub session_id: Uuid,
    pub total_questions: u32,
    pub entries: Vec<ProgressEntry>,
    /// Whether the session is finished.
    #[serde(rename = "final")]
    pub is_final: bool,
}
