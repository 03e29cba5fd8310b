use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dao::quiz_store::QuizStore,
    dto::quiz::{CreateQuizRequest, QuizSummary},
    error::ServiceError,
    state::{
        SharedState,
        game::{Quiz, Visibility},
    },
};

/// Store an imported quiz owned by `owner_id`.
pub async fn create_quiz(
    state: &SharedState,
    owner_id: Uuid,
    payload: CreateQuizRequest,
) -> Result<QuizSummary, ServiceError> {
    let store = state.require_quiz_store().await?;

    let questions = payload
        .questions
        .into_iter()
        .zip(0u32..)
        .map(|(question, index)| question.into_question(index))
        .collect();

    let description = payload
        .description
        .map(|description| description.trim().to_owned())
        .filter(|description| !description.is_empty());

    let quiz = Quiz {
        id: Uuid::new_v4(),
        title: payload.title.trim().to_owned(),
        description,
        visibility: payload.visibility,
        owner_id,
        created_at: state.now(),
        questions,
    };

    let (quiz_entity, question_entities) = quiz.clone().into_entities();
    store
        .save_quiz(quiz_entity, question_entities)
        .await
        .inspect_err(|err| warn!(quiz_id = %quiz.id, error = %err, "failed to save quiz"))?;

    info!(quiz_id = %quiz.id, questions = quiz.questions.len(), "quiz created");
    Ok(QuizSummary::from_quiz(quiz, true))
}

/// Read a quiz. Private quizzes are only visible to their owner, and correct answers are
/// only disclosed to the owner.
pub async fn get_quiz(
    state: &SharedState,
    quiz_id: Uuid,
    caller: Option<Uuid>,
) -> Result<QuizSummary, ServiceError> {
    let store = state.require_quiz_store().await?;
    let quiz = load_quiz(store.as_ref(), quiz_id).await?;

    let is_owner = caller == Some(quiz.owner_id);
    if !is_owner && quiz.visibility == Visibility::Private {
        return Err(ServiceError::NotFound(format!("quiz `{quiz_id}` not found")));
    }
    Ok(QuizSummary::from_quiz(quiz, is_owner))
}

/// Read a quiz with its ordered questions.
pub async fn load_quiz(store: &dyn QuizStore, quiz_id: Uuid) -> Result<Quiz, ServiceError> {
    let quiz = store
        .find_quiz(quiz_id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("quiz `{quiz_id}` not found")))?;
    let questions = store.list_questions(quiz_id).await?;
    Ok((quiz, questions).into())
}
