use axum::{
    Json, Router,
    extract::{Path, State},
    routing::post,
};
use uuid::Uuid;

use crate::{
    dto::submission::{SubmitAnswerRequest, SubmitAnswerResponse},
    error::AppError,
    routes::identity::Caller,
    services::response_service,
    state::SharedState,
};

pub fn router() -> Router<SharedState> {
    Router::new().route("/sessions/{id}/responses", post(submit_answer))
}

/// Record or replace an answer.
#[utoipa::path(
    post,
    path = "/sessions/{id}/responses",
    tag = "responses",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("x-user-id" = Option<String>, Header, description = "Caller profile id")
    ),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer recorded", body = SubmitAnswerResponse),
        (status = 400, description = "Question or answer outside the quiz"),
        (status = 409, description = "`not_started`, `time_expired` or `session_closed`")
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<SubmitAnswerResponse>, AppError> {
    let recorded = response_service::submit_answer(&state, id, caller, payload).await?;
    Ok(Json(recorded))
}
