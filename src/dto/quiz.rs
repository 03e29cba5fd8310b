use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dto::format_system_time,
    state::game::{Answer, Question, Quiz, Visibility},
};

/// Default per-question window when the payload omits one.
pub const DEFAULT_TIME_LIMIT_SECS: u32 = 20;
/// Default base points when the payload omits them.
pub const DEFAULT_POINTS: u32 = 1000;

/// Quiz import payload. Questions use the same shape the generator returns.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateQuizRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_visibility")]
    pub visibility: Visibility,
    #[validate(nested)]
    #[serde(default)]
    pub questions: Vec<QuestionInput>,
}

fn default_visibility() -> Visibility {
    Visibility::Private
}

/// One question of an imported quiz.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct QuestionInput {
    pub question_text: String,
    /// Window in seconds; defaults to 20.
    #[serde(default)]
    pub time_limit: Option<u32>,
    /// Base points; defaults to 1000.
    #[serde(default)]
    pub points: Option<u32>,
    pub answers: Vec<AnswerInput>,
}

impl Validate for QuestionInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.question_text.trim().is_empty() {
            errors.add("question_text", ValidationError::new("blank"));
        }

        if !(2..=6).contains(&self.answers.len()) {
            let mut err = ValidationError::new("answers_count");
            err.message = Some(
                format!(
                    "a question needs between 2 and 6 answers (got {})",
                    self.answers.len()
                )
                .into(),
            );
            errors.add("answers", err);
        }

        let correct = self.answers.iter().filter(|answer| answer.is_correct).count();
        if correct != 1 {
            let mut err = ValidationError::new("correct_count");
            err.message =
                Some(format!("exactly one answer must be correct (got {correct})").into());
            errors.add("answers", err);
        }

        if self
            .answers
            .iter()
            .any(|answer| answer.answer_text.trim().is_empty())
        {
            errors.add("answers", ValidationError::new("blank_answer"));
        }

        if let Some(limit) = self.time_limit
            && !(1..=600).contains(&limit)
        {
            errors.add("time_limit", ValidationError::new("range"));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// One answer option of an imported question.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct AnswerInput {
    pub answer_text: String,
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

/// Quiz as returned to clients. Correct flags are only disclosed to the owner.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuizSummary {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub visibility: Visibility,
    pub owner_id: Uuid,
    pub created_at: String,
    pub questions: Vec<QuestionSummary>,
}

/// Question projection.
#[derive(Debug, Serialize, ToSchema)]
pub struct QuestionSummary {
    pub id: Uuid,
    pub text: String,
    pub time_limit: u32,
    pub points: u32,
    pub order_index: u32,
    pub answers: Vec<AnswerSummary>,
}

/// Answer projection.
#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerSummary {
    pub id: Uuid,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_correct: Option<bool>,
}

impl QuizSummary {
    /// Project `quiz`, revealing correct answers only when `reveal` is set.
    pub fn from_quiz(quiz: Quiz, reveal: bool) -> Self {
        Self {
            id: quiz.id,
            title: quiz.title,
            description: quiz.description,
            visibility: quiz.visibility,
            owner_id: quiz.owner_id,
            created_at: format_system_time(quiz.created_at),
            questions: quiz
                .questions
                .into_iter()
                .map(|question| QuestionSummary {
                    id: question.id,
                    text: question.text,
                    time_limit: question.time_limit_secs,
                    points: question.points,
                    order_index: question.order_index,
                    answers: question
                        .answers
                        .into_iter()
                        .map(|answer| AnswerSummary {
                            id: answer.id,
                            text: answer.text,
                            color: answer.color,
                            is_correct: reveal.then_some(answer.is_correct),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

impl QuestionInput {
    /// Build the runtime question at position `order_index`.
    pub fn into_question(self, order_index: u32) -> Question {
        Question {
            id: Uuid::new_v4(),
            text: self.question_text.trim().to_owned(),
            time_limit_secs: self.time_limit.unwrap_or(DEFAULT_TIME_LIMIT_SECS),
            points: self.points.unwrap_or(DEFAULT_POINTS),
            order_index,
            answers: self
                .answers
                .into_iter()
                .zip(0u32..)
                .map(|(answer, index)| Answer {
                    id: Uuid::new_v4(),
                    text: answer.answer_text.trim().to_owned(),
                    color: answer.color,
                    is_correct: answer.is_correct,
                    order_index: index,
                })
                .collect(),
        }
    }
}
