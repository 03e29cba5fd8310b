use std::time::SystemTime;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{GameSessionEntity, ParticipantEntity},
        storage::StorageError,
    },
    dto::{
        quiz::QuizSummary,
        roster::ParticipantSummary,
        session::{
            CreateSessionRequest, CreateSessionResponse, PinLookupResponse, SessionSummary,
            SessionView,
        },
    },
    error::{Rejection, ServiceError},
    services::{
        pin::{generate_pin, is_well_formed, normalize_pin},
        quiz_service,
        session_board::{SessionBoard, find_session},
    },
    state::{
        SharedState, TransitionOutcome,
        clock::{self, ClockReading},
        game::{GameSession, Participant},
        state_machine::{EndReason, SessionEvent},
        transitions::run_transition_with_broadcast,
    },
};

/// Nickname of the implicit player when a self-paced session is opened without one.
pub const DEFAULT_SOLO_NICKNAME: &str = "Player";

/// Open a waiting session on a quiz.
///
/// Nothing is written unless the quiz is playable by `host_id` and has questions. PINs are
/// drawn at random and retried when the store reports one already held by an open session.
pub async fn create_session(
    state: &SharedState,
    host_id: Uuid,
    payload: CreateSessionRequest,
) -> Result<CreateSessionResponse, ServiceError> {
    let store = state.require_quiz_store().await?;
    let quiz = quiz_service::load_quiz(store.as_ref(), payload.quiz_id).await?;

    if !quiz.can_be_hosted_by(host_id) {
        return Err(Rejection::NotQuizOwner.into());
    }
    if quiz.questions.is_empty() {
        return Err(Rejection::NoQuestions.into());
    }

    let now = state.now();
    let mut inserted = None;
    for attempt in 0..state.config().pin_generation_attempts {
        let session = GameSession::new(quiz.id, host_id, generate_pin(payload.mode), payload.mode, now);
        match store.insert_session(session.clone().into()).await {
            Ok(()) => {
                inserted = Some(session);
                break;
            }
            Err(StorageError::Conflict { .. }) => {
                debug!(attempt, "access PIN already in use; drawing another");
            }
            Err(err) => {
                warn!(quiz_id = %quiz.id, error = %err, "failed to insert session");
                return Err(err.into());
            }
        }
    }
    let Some(session) = inserted else {
        warn!(quiz_id = %quiz.id, "could not find a free access PIN");
        return Err(ServiceError::InvalidState(
            "could not allocate an access PIN; retry".into(),
        ));
    };

    let participant = if session.mode.is_self_paced() {
        let nickname = payload
            .nickname
            .as_deref()
            .map(str::trim)
            .filter(|nickname| !nickname.is_empty())
            .unwrap_or(DEFAULT_SOLO_NICKNAME)
            .to_owned();
        let participant = Participant {
            id: Uuid::new_v4(),
            session_id: session.id,
            user_id: Some(host_id),
            nickname,
            score: 0,
            joined_at: now,
            join_seq: 1,
        };
        if let Err(err) = store
            .insert_participant(ParticipantEntity::from(participant.clone()))
            .await
        {
            warn!(session_id = %session.id, error = %err, "failed to seat the solo player; closing the session");
            if let Err(close_err) = state
                .run_transition(session.id, SessionEvent::EndSession(EndReason::HostAborted))
                .await
            {
                warn!(session_id = %session.id, error = %close_err, "failed to close playerless session");
            }
            return Err(err.into());
        }
        Some(ParticipantSummary::from(&participant))
    } else {
        None
    };

    info!(
        session_id = %session.id,
        quiz_id = %quiz.id,
        mode = ?session.mode,
        "session created"
    );

    Ok(CreateSessionResponse {
        session: SessionSummary::new(&session, ClockReading::at(&session, now)),
        participant,
    })
}

/// Resolve an access PIN to the open session using it.
pub async fn find_by_pin(state: &SharedState, raw_pin: &str) -> Result<PinLookupResponse, ServiceError> {
    let store = state.require_quiz_store().await?;
    let session = open_session_by_pin(state, raw_pin).await?;
    let quiz = store
        .find_quiz(session.quiz_id)
        .await?
        .ok_or(Rejection::InvalidPin)?;

    Ok(PinLookupResponse {
        session_id: session.id,
        mode: session.mode,
        phase: clock::phase(&session, state.now()),
        quiz_title: quiz.title,
    })
}

/// Open session behind a user-typed PIN, or [`Rejection::InvalidPin`].
pub async fn open_session_by_pin(
    state: &SharedState,
    raw_pin: &str,
) -> Result<GameSession, ServiceError> {
    let pin = normalize_pin(raw_pin);
    if !is_well_formed(&pin) {
        return Err(Rejection::InvalidPin.into());
    }
    let store = state.require_quiz_store().await?;
    let session: GameSessionEntity = store
        .find_open_session_by_pin(pin)
        .await?
        .ok_or(Rejection::InvalidPin)?;
    Ok(session.into())
}

/// Session with its roster, scores recomputed from the response log.
pub async fn get_session(state: &SharedState, session_id: Uuid) -> Result<SessionView, ServiceError> {
    let store = state.require_quiz_store().await?;
    let board = SessionBoard::load(store.as_ref(), session_id).await?;
    Ok(session_view(&board, state.now()))
}

/// Project a board into the client view.
pub fn session_view(board: &SessionBoard, now: SystemTime) -> SessionView {
    let tallies = board.tallies();
    SessionView {
        session: SessionSummary::new(&board.session, ClockReading::at(&board.session, now)),
        participants: board
            .participants
            .iter()
            .map(|participant| {
                let score = tallies
                    .get(&participant.id)
                    .map(|tally| tally.points)
                    .unwrap_or(0);
                ParticipantSummary::with_score(participant, score)
            })
            .collect(),
    }
}

/// Questions of the session's quiz without the correct flags, for players.
pub async fn session_questions(
    state: &SharedState,
    session_id: Uuid,
) -> Result<QuizSummary, ServiceError> {
    let store = state.require_quiz_store().await?;
    let session = find_session(store.as_ref(), session_id).await?;
    let quiz = quiz_service::load_quiz(store.as_ref(), session.quiz_id).await?;
    Ok(QuizSummary::from_quiz(quiz, false))
}

/// Begin the countdown. Only the host may start a session, and starting twice never restarts
/// the clock.
pub async fn start_session(
    state: &SharedState,
    session_id: Uuid,
    caller: Uuid,
    total_time_minutes: Option<u32>,
) -> Result<SessionSummary, ServiceError> {
    let store = state.require_quiz_store().await?;
    let session = find_session(store.as_ref(), session_id).await?;
    if !session.is_host(Some(caller)) {
        return Err(ServiceError::Forbidden("only the host can start the game".into()));
    }

    let max = state.config().max_total_time_minutes;
    if let Some(minutes) = total_time_minutes
        && (minutes == 0 || minutes > max)
    {
        return Err(ServiceError::InvalidInput(format!(
            "total_time_minutes must be between 1 and {max}"
        )));
    }

    let outcome = run_transition_with_broadcast(
        state,
        session_id,
        SessionEvent::StartCountdown { total_time_minutes },
    )
    .await?;
    Ok(summary_of(state, &outcome))
}

/// Finish a session for `reason`, defaulting to a host abort.
///
/// Ending an already finished session is a no-op that returns the stored row.
pub async fn end_session(
    state: &SharedState,
    session_id: Uuid,
    caller: Option<Uuid>,
    reason: Option<EndReason>,
) -> Result<SessionSummary, ServiceError> {
    let store = state.require_quiz_store().await?;
    let reason = reason.unwrap_or(EndReason::HostAborted);

    match reason {
        EndReason::HostAborted => {
            let session = find_session(store.as_ref(), session_id).await?;
            if !session.is_host(caller) {
                return Err(ServiceError::Forbidden("only the host can end the game".into()));
            }
        }
        // Any observer may report expiry; the planner checks the clock itself.
        EndReason::TimerExpired => {}
        EndReason::PlayerCompleted | EndReason::AllAnswered => {
            let board = SessionBoard::load(store.as_ref(), session_id).await?;
            if !board.is_final() && !completion_reached(&board, reason) {
                return Err(ServiceError::InvalidState(
                    "not every question has been answered yet".into(),
                ));
            }
        }
    }

    let outcome =
        run_transition_with_broadcast(state, session_id, SessionEvent::EndSession(reason)).await?;
    Ok(summary_of(state, &outcome))
}

/// End a timed session whose clock ran out. Returns the session row either way.
pub async fn fire_timer_expiry(
    state: &SharedState,
    session_id: Uuid,
) -> Result<TransitionOutcome, ServiceError> {
    run_transition_with_broadcast(
        state,
        session_id,
        SessionEvent::EndSession(EndReason::TimerExpired),
    )
    .await
}

/// Whether the completion condition behind `reason` holds on `board`.
pub fn completion_reached(board: &SessionBoard, reason: EndReason) -> bool {
    let tallies = board.tallies();
    match reason {
        EndReason::PlayerCompleted | EndReason::AllAnswered => board.everyone_completed(&tallies),
        EndReason::TimerExpired | EndReason::HostAborted => false,
    }
}

fn summary_of(state: &SharedState, outcome: &TransitionOutcome) -> SessionSummary {
    let session = outcome.session();
    SessionSummary::new(session, ClockReading::at(session, state.now()))
}
