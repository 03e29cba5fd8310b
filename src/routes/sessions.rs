use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        quiz::QuizSummary,
        session::{
            CreateSessionRequest, CreateSessionResponse, EndSessionRequest, PinLookupResponse,
            SessionSummary, SessionView, StartSessionRequest,
        },
    },
    error::AppError,
    routes::identity::Caller,
    services::session_service,
    state::SharedState,
};

/// Session lifecycle endpoints.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/pin/{pin}", get(find_by_pin))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/questions", get(session_questions))
        .route("/sessions/{id}/start", post(start_session))
        .route("/sessions/{id}/end", post(end_session))
}

/// Open a waiting session on a quiz. Solo and practice sessions also get their player.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    params(("x-user-id" = String, Header, description = "Host profile id")),
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = CreateSessionResponse),
        (status = 400, description = "Quiz has no questions (`no_questions`)"),
        (status = 403, description = "Private quiz hosted by a non-owner (`not_quiz_owner`)"),
        (status = 404, description = "Unknown quiz")
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    caller: Caller,
    Valid(Json(payload)): Valid<Json<CreateSessionRequest>>,
) -> Result<(StatusCode, Json<CreateSessionResponse>), AppError> {
    let host_id = caller.require()?;
    let created = session_service::create_session(&state, host_id, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// Resolve an access PIN to its open session.
#[utoipa::path(
    get,
    path = "/sessions/pin/{pin}",
    tag = "sessions",
    params(("pin" = String, Path, description = "Access PIN")),
    responses(
        (status = 200, description = "Open session", body = PinLookupResponse),
        (status = 404, description = "No open session uses this PIN (`invalid_pin`)")
    )
)]
pub async fn find_by_pin(
    State(state): State<SharedState>,
    Path(pin): Path<String>,
) -> Result<Json<PinLookupResponse>, AppError> {
    Ok(Json(session_service::find_by_pin(&state, &pin).await?))
}

/// Session with its roster and a clock reading.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session", body = SessionView),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    Ok(Json(session_service::get_session(&state, id).await?))
}

/// Questions of the session's quiz, without the correct flags.
#[utoipa::path(
    get,
    path = "/sessions/{id}/questions",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Questions to play", body = QuizSummary),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn session_questions(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<QuizSummary>, AppError> {
    Ok(Json(session_service::session_questions(&state, id).await?))
}

/// Start the countdown. Repeated calls leave the clock untouched.
#[utoipa::path(
    post,
    path = "/sessions/{id}/start",
    tag = "sessions",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("x-user-id" = String, Header, description = "Host profile id")
    ),
    request_body(content = StartSessionRequest, description = "Session budget, omit for untimed play"),
    responses(
        (status = 200, description = "Countdown running", body = SessionSummary),
        (status = 403, description = "Caller is not the host"),
        (status = 409, description = "Session already finished")
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
    caller: Caller,
    Path(id): Path<Uuid>,
    body: Option<Json<StartSessionRequest>>,
) -> Result<Json<SessionSummary>, AppError> {
    let host_id = caller.require()?;
    let request = body.map(|Json(request)| request).unwrap_or_default();
    request.validate()?;
    let summary =
        session_service::start_session(&state, id, host_id, request.total_time_minutes).await?;
    Ok(Json(summary))
}

/// Finish the session. Ending a finished session is a no-op.
#[utoipa::path(
    post,
    path = "/sessions/{id}/end",
    tag = "sessions",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("x-user-id" = Option<String>, Header, description = "Caller profile id; required for host aborts")
    ),
    request_body(content = EndSessionRequest, description = "End reason, host abort by default"),
    responses(
        (status = 200, description = "Session finished", body = SessionSummary),
        (status = 403, description = "Only the host can abort"),
        (status = 409, description = "The end condition does not hold")
    )
)]
pub async fn end_session(
    State(state): State<SharedState>,
    Caller(caller): Caller,
    Path(id): Path<Uuid>,
    body: Option<Json<EndSessionRequest>>,
) -> Result<Json<SessionSummary>, AppError> {
    let reason = body.and_then(|Json(request)| request.reason);
    Ok(Json(
        session_service::end_session(&state, id, caller, reason).await?,
    ))
}
