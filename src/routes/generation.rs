use axum::{Json, Router, extract::State, routing::post};

use crate::{
    dto::generation::{GenerateQuestionsRequest, GenerateQuestionsResponse},
    error::AppError,
    services::generation_service,
    state::SharedState,
};

pub fn router() -> Router<SharedState> {
    Router::new().route("/generate-questions", post(generate_questions))
}

/// Draft questions on a topic with a language model.
#[utoipa::path(
    post,
    path = "/generate-questions",
    tag = "generation",
    request_body = GenerateQuestionsRequest,
    responses(
        (status = 200, description = "Drafted questions", body = GenerateQuestionsResponse),
        (status = 400, description = "`invalid_prompt` or `generic_prompt`"),
        (status = 500, description = "Upstream failure or unusable reply")
    )
)]
pub async fn generate_questions(
    State(state): State<SharedState>,
    Json(payload): Json<GenerateQuestionsRequest>,
) -> Result<Json<GenerateQuestionsResponse>, AppError> {
    Ok(Json(
        generation_service::generate_questions(&state, payload).await?,
    ))
}
