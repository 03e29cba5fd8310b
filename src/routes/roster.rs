use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::roster::{JoinRequest, JoinResponse, ProgressResponse},
    error::AppError,
    routes::identity::Caller,
    services::roster_service,
    state::SharedState,
};

/// Lobby and progress endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions/join", post(join))
        .route(
            "/sessions/{id}/participants/{participant_id}",
            delete(leave),
        )
        .route("/sessions/{id}/progress", get(progress))
}

/// Join a hosted session's lobby by PIN.
#[utoipa::path(
    post,
    path = "/sessions/join",
    tag = "roster",
    params(("x-user-id" = Option<String>, Header, description = "Caller profile id, absent for guests")),
    request_body = JoinRequest,
    responses(
        (status = 201, description = "Joined", body = JoinResponse),
        (status = 404, description = "No open session uses this PIN (`invalid_pin`)"),
        (status = 409, description = "`duplicate_nickname`, `late_join` or `roster_closed`")
    )
)]
pub async fn join(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Valid(Json(payload)): Valid<Json<JoinRequest>>,
) -> Result<(StatusCode, Json<JoinResponse>), AppError> {
    let joined = roster_service::join(&state, payload, caller).await?;
    Ok((StatusCode::CREATED, Json(joined)))
}

/// Leave the lobby before the game starts.
#[utoipa::path(
    delete,
    path = "/sessions/{id}/participants/{participant_id}",
    tag = "roster",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("participant_id" = Uuid, Path, description = "Participant identifier"),
        ("x-user-id" = Option<String>, Header, description = "The player or the host")
    ),
    responses(
        (status = 204, description = "Participant removed"),
        (status = 403, description = "Caller is neither the player nor the host"),
        (status = 409, description = "The game already started")
    )
)]
pub async fn leave(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path((id, participant_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    roster_service::leave(&state, id, participant_id, caller).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Completion progress of every participant.
#[utoipa::path(
    get,
    path = "/sessions/{id}/progress",
    tag = "roster",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses((status = 200, description = "Progress", body = ProgressResponse))
)]
pub async fn progress(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProgressResponse>, AppError> {
    Ok(Json(roster_service::progress(&state, id).await?))
}
