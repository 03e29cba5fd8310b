use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Body of `POST /generate-questions`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct GenerateQuestionsRequest {
    /// Topic description; at least 20 characters and specific enough to quiz on.
    pub prompt: String,
    /// Language the questions are written in.
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_count")]
    pub count: u32,
    /// Also draft a quiz title and description.
    #[serde(default, rename = "generateMetadata")]
    pub generate_metadata: bool,
}

fn default_language() -> String {
    "en".into()
}

fn default_count() -> u32 {
    5
}

/// Drafted questions, in the same shape `POST /quizzes` accepts.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GenerateQuestionsResponse {
    pub questions: Vec<GeneratedQuestion>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<GeneratedMetadata>,
}

/// One drafted question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GeneratedQuestion {
    pub question_text: String,
    pub answers: Vec<GeneratedAnswer>,
}

/// One drafted answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GeneratedAnswer {
    pub answer_text: String,
    #[serde(default)]
    pub is_correct: bool,
}

/// Drafted quiz header.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeneratedMetadata {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}
