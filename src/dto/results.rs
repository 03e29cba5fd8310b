use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// One leaderboard line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    /// 1-based position in the ordered list; unique.
    pub position: u32,
    /// 1 + number of participants with a strictly greater score; shared by ties.
    pub rank: u32,
    pub participant_id: Uuid,
    pub nickname: String,
    pub score: u32,
    pub correct_count: u32,
    pub answered_count: u32,
}

/// Standings of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LeaderboardResponse {
    pub session_id: Uuid,
    #[serde(rename = "final")]
    pub is_final: bool,
    pub total_participants: u32,
    pub entries: Vec<LeaderboardEntry>,
}

/// Host analytics for one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct QuestionStat {
    pub question_id: Uuid,
    pub order_index: u32,
    pub text: String,
    pub total_responses: u32,
    pub correct_count: u32,
    /// Responses recorded with no answer picked.
    pub unanswered_count: u32,
    /// Mean latency of responses that picked an answer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_response_ms: Option<u64>,
}

/// Per-question statistics of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct QuestionStatsResponse {
    pub session_id: Uuid,
    #[serde(rename = "final")]
    pub is_final: bool,
    pub questions: Vec<QuestionStat>,
}

/// Performance summary of one participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct PersonalStatsResponse {
    pub session_id: Uuid,
    pub participant_id: Uuid,
    pub nickname: String,
    pub rank: u32,
    pub total_participants: u32,
    pub points: u32,
    pub correct_count: u32,
    pub answered_count: u32,
    pub total_questions: u32,
    #[serde(rename = "final")]
    pub is_final: bool,
}
