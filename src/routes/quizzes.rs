use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::quiz::{CreateQuizRequest, QuizSummary},
    error::AppError,
    routes::identity::Caller,
    services::quiz_service,
    state::SharedState,
};

/// Quiz import and lookup.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/quizzes", post(create_quiz))
        .route("/quizzes/{id}", get(get_quiz))
}

/// Import a quiz owned by the caller.
#[utoipa::path(
    post,
    path = "/quizzes",
    tag = "quizzes",
    params(("x-user-id" = String, Header, description = "Caller profile id")),
    request_body = CreateQuizRequest,
    responses(
        (status = 201, description = "Quiz stored", body = QuizSummary),
        (status = 400, description = "Invalid quiz"),
        (status = 401, description = "Missing caller identity")
    )
)]
pub async fn create_quiz(
    State(state): State<SharedState>,
    caller: Caller,
    Valid(Json(payload)): Valid<Json<CreateQuizRequest>>,
) -> Result<(StatusCode, Json<QuizSummary>), AppError> {
    let owner_id = caller.require()?;
    let summary = quiz_service::create_quiz(&state, owner_id, payload).await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Read a quiz; correct answers are only shown to its owner.
#[utoipa::path(
    get,
    path = "/quizzes/{id}",
    tag = "quizzes",
    params(
        ("id" = Uuid, Path, description = "Quiz identifier"),
        ("x-user-id" = Option<String>, Header, description = "Caller profile id")
    ),
    responses(
        (status = 200, description = "Quiz", body = QuizSummary),
        (status = 404, description = "Unknown or private quiz")
    )
)]
pub async fn get_quiz(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<QuizSummary>, AppError> {
    Ok(Json(quiz_service::get_quiz(&state, id, caller).await?))
}
