//! Drafts quiz questions through an OpenAI-compatible chat completion endpoint.

use std::{collections::HashSet, sync::LazyLock};

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    config::GenerationConfig,
    dto::generation::{
        GenerateQuestionsRequest, GenerateQuestionsResponse, GeneratedAnswer, GeneratedMetadata,
        GeneratedQuestion,
    },
    error::{Rejection, ServiceError},
    state::SharedState,
};

/// Shortest prompt accepted, in characters.
pub const MIN_PROMPT_CHARS: usize = 20;
/// Most answers kept per drafted question.
pub const MAX_ANSWERS: usize = 4;

/// Words that say nothing about a topic.
static FILLER_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "a", "an", "the", "and", "or", "of", "on", "in", "for", "to", "with", "about", "some",
        "any", "anything", "something", "stuff", "things", "thing", "random", "general",
        "generic", "everything", "quiz", "quizzes", "question", "questions", "trivia", "test",
        "make", "create", "generate", "give", "me", "please", "few", "many", "more", "easy",
        "hard", "fun", "interesting", "knowledge", "topic", "topics", "various", "misc",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, Error)]
enum GenerationError {
    #[error("question generation is not configured (missing API key)")]
    MissingApiKey,
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
    #[error("completion request failed: {0}")]
    Request(#[source] reqwest::Error),
    #[error("completion endpoint answered {0}")]
    Status(reqwest::StatusCode),
    #[error("completion reply had no content")]
    EmptyReply,
    #[error("completion reply is not the expected JSON: {0}")]
    Parse(String),
    #[error("completion reply contained no usable question")]
    NoQuestions,
}

impl From<GenerationError> for ServiceError {
    fn from(err: GenerationError) -> Self {
        ServiceError::Upstream(err.to_string())
    }
}

/// Check that `prompt` is long and specific enough to draft questions from.
pub fn check_prompt(prompt: &str) -> Result<(), Rejection> {
    let prompt = prompt.trim();
    if prompt.chars().count() < MIN_PROMPT_CHARS {
        return Err(Rejection::InvalidPrompt);
    }

    let specific_words = prompt
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| word.chars().count() >= 3)
        .map(str::to_lowercase)
        .filter(|word| !FILLER_WORDS.contains(word.as_str()))
        .count();
    if specific_words < 2 {
        return Err(Rejection::GenericPrompt);
    }
    Ok(())
}

/// Draft questions for `payload`.
pub async fn generate_questions(
    state: &SharedState,
    payload: GenerateQuestionsRequest,
) -> Result<GenerateQuestionsResponse, ServiceError> {
    check_prompt(&payload.prompt)?;
    let config = &state.config().generation;
    let count = payload.count.clamp(1, config.max_questions.max(1));

    let content = request_completion(config, &payload, count)
        .await
        .inspect_err(|err| warn!(error = %err, "question generation failed"))?;
    let reply = parse_reply(&content).inspect_err(|err| warn!(error = %err, "unusable completion reply"))?;

    let mut questions: Vec<GeneratedQuestion> =
        reply.questions.into_iter().filter_map(coerce_question).collect();
    questions.truncate(usize::try_from(count).unwrap_or(usize::MAX));
    if questions.is_empty() {
        return Err(GenerationError::NoQuestions.into());
    }

    debug!(questions = questions.len(), "questions generated");
    Ok(GenerateQuestionsResponse {
        questions,
        metadata: reply
            .metadata
            .filter(|metadata| payload.generate_metadata && !metadata.title.trim().is_empty()),
    })
}

async fn request_completion(
    config: &GenerationConfig,
    payload: &GenerateQuestionsRequest,
    count: u32,
) -> Result<String, GenerationError> {
    let api_key = config.api_key.as_deref().ok_or(GenerationError::MissingApiKey)?;
    let client = reqwest::Client::builder()
        .timeout(config.timeout)
        .build()
        .map_err(GenerationError::Client)?;

    let metadata_hint = if payload.generate_metadata {
        r#" Also include "metadata": {"title": string, "description": string}."#
    } else {
        ""
    };
    let system = format!(
        "You write multiple-choice quiz questions in {language}. Reply with a single JSON object \
         {{\"questions\": [{{\"question_text\": string, \"answers\": [{{\"answer_text\": string, \
         \"is_correct\": boolean}}]}}]}} with exactly {count} questions of {MAX_ANSWERS} answers, \
         one of them correct.{metadata_hint}",
        language = payload.language,
    );
    let body = json!({
        "model": config.model,
        "temperature": 0.7,
        "response_format": { "type": "json_object" },
        "messages": [
            { "role": "system", "content": system },
            { "role": "user", "content": payload.prompt.trim() },
        ],
    });

    let url = format!("{}/chat/completions", config.api_base_url.trim_end_matches('/'));
    let response = client
        .post(url)
        .bearer_auth(api_key)
        .json(&body)
        .send()
        .await
        .map_err(GenerationError::Request)?;
    if !response.status().is_success() {
        return Err(GenerationError::Status(response.status()));
    }

    let completion: ChatCompletion = response.json().await.map_err(GenerationError::Request)?;
    completion
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .filter(|content| !content.trim().is_empty())
        .ok_or(GenerationError::EmptyReply)
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DraftReply {
    #[serde(default)]
    questions: Vec<DraftQuestion>,
    #[serde(default)]
    metadata: Option<GeneratedMetadata>,
}

#[derive(Debug, Deserialize)]
struct DraftQuestion {
    #[serde(alias = "question")]
    question_text: String,
    #[serde(default)]
    answers: Vec<GeneratedAnswer>,
}

/// Parse the JSON object embedded in a completion, ignoring prose or code fences around it.
fn parse_reply(content: &str) -> Result<DraftReply, GenerationError> {
    let start = content.find('{');
    let end = content.rfind('}');
    let json = match (start, end) {
        (Some(start), Some(end)) if start < end => &content[start..=end],
        _ => return Err(GenerationError::Parse("no JSON object found".into())),
    };
    serde_json::from_str(json).map_err(|err| GenerationError::Parse(err.to_string()))
}

/// Trim a drafted question to at most [`MAX_ANSWERS`] answers with exactly one correct.
///
/// The first flagged answer is the correct one and always survives truncation; with none
/// flagged the first answer is taken. Questions left with fewer than two answers are dropped.
fn coerce_question(draft: DraftQuestion) -> Option<GeneratedQuestion> {
    let question_text = draft.question_text.trim().to_owned();
    if question_text.is_empty() {
        return None;
    }

    let mut answers: Vec<GeneratedAnswer> = draft
        .answers
        .into_iter()
        .map(|answer| GeneratedAnswer {
            answer_text: answer.answer_text.trim().to_owned(),
            is_correct: answer.is_correct,
        })
        .filter(|answer| !answer.answer_text.is_empty())
        .collect();
    if answers.len() < 2 {
        return None;
    }

    let correct = answers.iter().position(|answer| answer.is_correct).unwrap_or(0);
    if correct >= MAX_ANSWERS {
        answers.swap(MAX_ANSWERS - 1, correct);
    }
    answers.truncate(MAX_ANSWERS);
    let correct = correct.min(MAX_ANSWERS - 1);
    for (index, answer) in answers.iter_mut().enumerate() {
        answer.is_correct = index == correct;
    }

    Some(GeneratedQuestion {
        question_text,
        answers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(answers: &[(&str, bool)]) -> DraftQuestion {
        DraftQuestion {
            question_text: "Which planet is largest?".into(),
            answers: answers
                .iter()
                .map(|(text, is_correct)| GeneratedAnswer {
                    answer_text: (*text).into(),
                    is_correct: *is_correct,
                })
                .collect(),
        }
    }

    fn correct_texts(question: &GeneratedQuestion) -> Vec<&str> {
        question
            .answers
            .iter()
            .filter(|answer| answer.is_correct)
            .map(|answer| answer.answer_text.as_str())
            .collect()
    }

    #[test]
    fn short_and_generic_prompts_are_rejected() {
        assert_eq!(check_prompt("history"), Err(Rejection::InvalidPrompt));
        assert_eq!(
            check_prompt("make a quiz about anything please"),
            Err(Rejection::GenericPrompt)
        );
        assert_eq!(
            check_prompt("random general knowledge trivia questions"),
            Err(Rejection::GenericPrompt)
        );
        assert!(check_prompt("The water cycle for 5th grade science").is_ok());
    }

    #[test]
    fn correct_answer_survives_truncation() {
        let question = coerce_question(draft(&[
            ("Mars", false),
            ("Venus", false),
            ("Earth", false),
            ("Saturn", false),
            ("Jupiter", true),
        ]))
        .expect("question kept");
        assert_eq!(question.answers.len(), MAX_ANSWERS);
        assert_eq!(correct_texts(&question), ["Jupiter"]);
    }

    #[test]
    fn exactly_one_answer_ends_up_correct() {
        let several = coerce_question(draft(&[("Jupiter", true), ("Saturn", true), ("Mars", false)]))
            .expect("question kept");
        assert_eq!(correct_texts(&several), ["Jupiter"]);

        let none = coerce_question(draft(&[("Jupiter", false), ("Mars", false)])).expect("question kept");
        assert_eq!(correct_texts(&none), ["Jupiter"]);

        assert!(coerce_question(draft(&[("Jupiter", true), ("  ", false)])).is_none());
    }

    #[test]
    fn reply_json_is_found_inside_prose() {
        let content = "Sure! ```json\n{\"questions\": [{\"question\": \"2 + 2?\", \"answers\": \
                       [{\"answer_text\": \"4\", \"is_correct\": true}, {\"answer_text\": \"5\"}]}]}\n```";
        let reply = parse_reply(content).expect("parsed");
        assert_eq!(reply.questions.len(), 1);
        assert_eq!(reply.questions[0].question_text, "2 + 2?");
        assert!(parse_reply("no json here").is_err());
    }
}
