use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::results::{LeaderboardResponse, PersonalStatsResponse, QuestionStatsResponse},
    error::AppError,
    routes::identity::Caller,
    services::results_service,
    state::SharedState,
};

/// Leaderboard and statistics, final once the session is finished.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions/{id}/results", get(leaderboard))
        .route("/sessions/{id}/results/questions", get(question_stats))
        .route(
            "/sessions/{id}/participants/{participant_id}/results",
            get(personal_stats),
        )
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/results",
    tag = "results",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses((status = 200, description = "Leaderboard", body = LeaderboardResponse))
)]
pub async fn leaderboard(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<LeaderboardResponse>, AppError> {
    Ok(Json(results_service::leaderboard(&state, id).await?))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/results/questions",
    tag = "results",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("x-user-id" = String, Header, description = "Host profile id")
    ),
    responses(
        (status = 200, description = "Per-question statistics", body = QuestionStatsResponse),
        (status = 403, description = "Caller is not the host")
    )
)]
pub async fn question_stats(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<Uuid>,
) -> Result<Json<QuestionStatsResponse>, AppError> {
    let host_id = caller.require()?;
    Ok(Json(
        results_service::question_stats(&state, id, Some(host_id)).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/participants/{participant_id}/results",
    tag = "results",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("participant_id" = Uuid, Path, description = "Participant identifier")
    ),
    responses(
        (status = 200, description = "Personal statistics", body = PersonalStatsResponse),
        (status = 404, description = "Unknown participant")
    )
)]
pub async fn personal_stats(
    State(state): State<SharedState>,
    Path((id, participant_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<PersonalStatsResponse>, AppError> {
    Ok(Json(
        results_service::personal_stats(&state, id, participant_id).await?,
    ))
}
