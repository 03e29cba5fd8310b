use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Body of `POST /sessions/{id}/responses`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SubmitAnswerRequest {
    pub participant_id: Uuid,
    pub question_id: Uuid,
    /// Picked answer; `null` records that the question window ran out.
    #[serde(default)]
    pub answer_id: Option<Uuid>,
    /// Milliseconds the player spent on the question. The configured nominal latency is
    /// recorded when omitted.
    #[serde(default)]
    pub elapsed_ms: Option<u64>,
}

/// Outcome of a recorded answer.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SubmitAnswerResponse {
    pub response_id: Uuid,
    pub question_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub answer_id: Option<Uuid>,
    pub is_correct: bool,
    /// Points earned by this response.
    pub points: u32,
    /// Participant total after the write.
    pub score: u32,
    /// Distinct questions the participant has responded to.
    pub completed: u32,
    pub total_questions: u32,
}
