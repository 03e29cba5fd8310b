use std::{
    collections::HashMap,
    time::{Duration, SystemTime},
};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{models::ResponseEntity, quiz_store::QuizStore},
    dto::submission::{SubmitAnswerRequest, SubmitAnswerResponse},
    error::{Rejection, ServiceError},
    services::{
        scoring::{self, Tally},
        session_board::{SessionBoard, find_session},
        session_service,
    },
    state::{
        SessionNotification, SharedState,
        clock,
        game::{GameSession, Response},
        state_machine::{EndReason, SessionEvent, SessionPhase, SessionStatus},
        transitions::run_transition_with_broadcast,
    },
};

/// Record `payload` for its participant, replacing any earlier answer to the same question.
///
/// The participant's stored score is overwritten with the total recomputed from the log, so
/// a replaced answer retroactively adjusts it. Completing the quiz may end the session.
pub async fn submit_answer(
    state: &SharedState,
    session_id: Uuid,
    caller: Option<Uuid>,
    payload: SubmitAnswerRequest,
) -> Result<SubmitAnswerResponse, ServiceError> {
    let store = state.require_quiz_store().await?;
    let now = state.now();
    let session = find_session(store.as_ref(), session_id).await?;

    if let Err(rejection) = accepts_answers(&session, now, state.config().clock_tolerance) {
        if rejection == Rejection::TimeExpired {
            if let Err(err) = session_service::fire_timer_expiry(state, session_id).await {
                warn!(session_id = %session_id, error = %err, "failed to end expired session");
            }
        }
        return Err(rejection.into());
    }

    let participant_id = payload.participant_id;
    let gate = state.score_gate(participant_id);
    let recorded = {
        let _held = gate.lock().await;
        record_answer(state, store.as_ref(), session, caller, payload, now).await
    };
    drop(gate);
    state.release_score_gate(participant_id);
    let Recorded {
        response,
        is_correct,
        points,
        board,
        tallies,
    } = recorded?;
    let tally = tallies.get(&response.participant_id).copied().unwrap_or_default();

    debug!(
        session_id = %session_id,
        participant_id = %response.participant_id,
        question_id = %response.question_id,
        points,
        score = tally.points,
        "response recorded"
    );
    state.hubs().publish(
        session_id,
        SessionNotification::ResponseRecorded {
            participant_id: response.participant_id,
            question_id: response.question_id,
        },
    );

    if let Some(reason) = completion_trigger(&board, &tallies, response.participant_id) {
        match run_transition_with_broadcast(state, session_id, SessionEvent::EndSession(reason)).await
        {
            Ok(outcome) if outcome.was_applied() => {
                info!(session_id = %session_id, ?reason, "session completed by answers");
            }
            Ok(_) => {}
            Err(err) => warn!(session_id = %session_id, error = %err, "failed to end completed session"),
        }
    }

    Ok(SubmitAnswerResponse {
        response_id: response.id,
        question_id: response.question_id,
        answer_id: response.answer_id,
        is_correct,
        points,
        score: tally.points,
        completed: tally.completed,
        total_questions: board.total_questions(),
    })
}

struct Recorded {
    response: Response,
    is_correct: bool,
    points: u32,
    board: SessionBoard,
    tallies: HashMap<Uuid, Tally>,
}

/// Validate and write one answer, then rewrite the participant's score from the log.
///
/// Must run under the participant's score gate so two answers from the same player cannot
/// interleave their recompute and write.
async fn record_answer(
    state: &SharedState,
    store: &dyn QuizStore,
    session: GameSession,
    caller: Option<Uuid>,
    payload: SubmitAnswerRequest,
    now: SystemTime,
) -> Result<Recorded, ServiceError> {
    let session_id = session.id;
    let board = SessionBoard::load_for(store, session).await?;
    let participant = board
        .participant(payload.participant_id)
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "participant `{}` is not part of this session",
                payload.participant_id
            ))
        })?;
    if participant.user_id.is_some() && participant.user_id != caller {
        return Err(ServiceError::Forbidden(
            "cannot answer on behalf of another player".into(),
        ));
    }

    let question = board.quiz.question(payload.question_id).ok_or_else(|| {
        ServiceError::InvalidInput(format!(
            "question `{}` does not belong to this quiz",
            payload.question_id
        ))
    })?;
    if let Some(answer_id) = payload.answer_id
        && !question.has_answer(answer_id)
    {
        return Err(ServiceError::InvalidInput(format!(
            "answer `{answer_id}` does not belong to question `{}`",
            question.id
        )));
    }

    let response_time_ms = payload
        .elapsed_ms
        .unwrap_or(state.config().nominal_response_ms)
        .min(question.time_limit_ms());
    let response = Response {
        id: Uuid::new_v4(),
        session_id,
        participant_id: participant.id,
        question_id: question.id,
        answer_id: payload.answer_id,
        response_time_ms,
        created_at: now,
    };
    let is_correct = question.is_correct(response.answer_id);
    let points = scoring::response_points(question, &response);
    let previous = board
        .responses
        .iter()
        .find(|earlier| {
            earlier.participant_id == response.participant_id
                && earlier.question_id == response.question_id
        })
        .cloned();

    store
        .upsert_response(ResponseEntity::from(response.clone()))
        .await
        .inspect_err(|err| {
            warn!(session_id = %session_id, participant_id = %response.participant_id, error = %err, "failed to record response")
        })?;

    // The session may have finished while the write was in flight; results are final by then.
    let current = find_session(store, session_id).await?;
    if current.status == SessionStatus::Finished {
        withdraw_response(store, &response, previous).await?;
        info!(
            session_id = %session_id,
            participant_id = %response.participant_id,
            "answer landed after the session finished; withdrawn"
        );
        return Err(Rejection::SessionClosed.into());
    }

    // Re-read so answers recorded concurrently by other players are part of the tallies.
    let board = SessionBoard::load_for(store, current).await?;
    let tallies = board.tallies();
    let score = tallies
        .get(&response.participant_id)
        .map_or(0, |tally| tally.points);
    store
        .set_participant_score(response.participant_id, score)
        .await?;

    Ok(Recorded {
        response,
        is_correct,
        points,
        board,
        tallies,
    })
}

/// Put back the answer `response` replaced, or remove it when it was the first one.
async fn withdraw_response(
    store: &dyn QuizStore,
    response: &Response,
    previous: Option<Response>,
) -> Result<(), ServiceError> {
    match previous {
        Some(previous) => store.upsert_response(ResponseEntity::from(previous)).await?,
        None => {
            store
                .delete_response(response.participant_id, response.question_id)
                .await?;
        }
    }
    Ok(())
}

/// Whether `session` takes answers at `now`.
///
/// Timed sessions keep accepting answers for `tolerance` past the deadline so submissions in
/// flight when the clock hits zero are not lost; after that the answer is refused and the
/// session should be ended.
pub fn accepts_answers(
    session: &GameSession,
    now: SystemTime,
    tolerance: Duration,
) -> Result<(), Rejection> {
    match clock::phase(session, now) {
        SessionPhase::Waiting | SessionPhase::CountingDown => Err(Rejection::NotStarted),
        SessionPhase::Finished => Err(Rejection::SessionClosed),
        SessionPhase::Active => match clock::deadline(session) {
            Some(deadline) if now >= deadline + tolerance => Err(Rejection::TimeExpired),
            _ => Ok(()),
        },
    }
}

/// End reason triggered once `participant_id` has responded to every question, if any.
fn completion_trigger(
    board: &SessionBoard,
    tallies: &HashMap<Uuid, Tally>,
    participant_id: Uuid,
) -> Option<EndReason> {
    if board.is_final() || !board.has_completed(tallies, participant_id) {
        return None;
    }
    if board.session.mode.is_self_paced() {
        return Some(EndReason::PlayerCompleted);
    }
    board
        .everyone_completed(tallies)
        .then_some(EndReason::AllAnswered)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::quiz_store::{faulty::FaultyQuizStore, memory::MemoryQuizStore},
        dto::{
            quiz::{AnswerInput, CreateQuizRequest, QuestionInput, QuizSummary},
            roster::JoinRequest,
            session::CreateSessionRequest,
        },
        services::{quiz_service, roster_service},
        state::{
            AppState,
            clock::ManualTimeSource,
            game::Visibility,
            state_machine::SessionMode,
        },
    };

    struct Game {
        state: SharedState,
        store: FaultyQuizStore,
        quiz: QuizSummary,
        session_id: Uuid,
        player: Uuid,
    }

    impl Game {
        /// Hosted untimed game with two players, already past its countdown.
        async fn live(questions: usize) -> Self {
            let clock = Arc::new(ManualTimeSource::new(
                SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
            ));
            let state = AppState::with_time_source(AppConfig::default(), clock.clone());
            let store = FaultyQuizStore::new(MemoryQuizStore::new());
            state.set_quiz_store(Arc::new(store.clone())).await;
            let host = Uuid::new_v4();

            let questions = (0..questions)
                .map(|index| QuestionInput {
                    question_text: format!("Question {index}"),
                    time_limit: Some(20),
                    points: Some(1000),
                    answers: vec![
                        AnswerInput {
                            answer_text: "right".into(),
                            is_correct: true,
                            color: None,
                        },
                        AnswerInput {
                            answer_text: "wrong".into(),
                            is_correct: false,
                            color: None,
                        },
                    ],
                })
                .collect();
            let quiz = quiz_service::create_quiz(
                &state,
                host,
                CreateQuizRequest {
                    title: "Rivers".into(),
                    description: None,
                    visibility: Visibility::Private,
                    questions,
                },
            )
            .await
            .unwrap();

            let created = session_service::create_session(
                &state,
                host,
                CreateSessionRequest {
                    quiz_id: quiz.id,
                    mode: SessionMode::HostedMultiplayer,
                    nickname: None,
                },
            )
            .await
            .unwrap();
            let session_id = created.session.id;
            let mut players = Vec::new();
            for nickname in ["ana", "ben"] {
                let joined = roster_service::join(
                    &state,
                    JoinRequest {
                        pin: created.session.access_pin.clone(),
                        nickname: nickname.into(),
                    },
                    None,
                )
                .await
                .unwrap();
                players.push(joined.participant.id);
            }
            session_service::start_session(&state, session_id, host, None)
                .await
                .unwrap();
            clock.advance(state.config().hosted_countdown + Duration::from_millis(1));

            Self {
                state,
                store,
                quiz,
                session_id,
                player: players[0],
            }
        }

        fn request(&self, question: usize, correct: bool) -> SubmitAnswerRequest {
            let question = &self.quiz.questions[question];
            SubmitAnswerRequest {
                participant_id: self.player,
                question_id: question.id,
                answer_id: Some(question.answers[usize::from(!correct)].id),
                elapsed_ms: Some(4_000),
            }
        }

        async fn stored_score(&self) -> u32 {
            self.store
                .find_participant(self.player)
                .await
                .unwrap()
                .unwrap()
                .score
        }
    }

    #[tokio::test]
    async fn answers_from_one_player_are_scored_one_at_a_time() {
        let game = Game::live(3).await;
        let gate = game.state.score_gate(game.player);
        let held = gate.lock().await;

        let mut pending = Vec::new();
        for question in [0, 1] {
            let state = game.state.clone();
            let session_id = game.session_id;
            let request = game.request(question, true);
            pending.push(tokio::spawn(async move {
                submit_answer(&state, session_id, None, request).await
            }));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pending.iter().all(|handle| !handle.is_finished()));
        assert!(game.store.list_responses(game.session_id).await.unwrap().is_empty());

        drop(held);
        drop(gate);
        let mut total = 0;
        for handle in pending {
            total += handle.await.unwrap().unwrap().points;
        }
        assert!(total > 0);
        assert_eq!(game.stored_score().await, total);
    }

    #[tokio::test]
    async fn answer_landing_after_the_end_is_withdrawn() {
        let game = Game::live(2).await;
        game.store.finish_before_next_response_write();

        let refused = submit_answer(&game.state, game.session_id, None, game.request(0, true)).await;
        assert!(matches!(
            refused,
            Err(ServiceError::Rejected(Rejection::SessionClosed))
        ));
        assert!(game.store.list_responses(game.session_id).await.unwrap().is_empty());
        assert_eq!(game.stored_score().await, 0);
    }

    #[tokio::test]
    async fn late_replacement_restores_the_earlier_answer() {
        let game = Game::live(2).await;
        let first = submit_answer(&game.state, game.session_id, None, game.request(0, true))
            .await
            .unwrap();
        game.store.finish_before_next_response_write();

        let refused = submit_answer(&game.state, game.session_id, None, game.request(0, false)).await;
        assert!(matches!(
            refused,
            Err(ServiceError::Rejected(Rejection::SessionClosed))
        ));
        let responses = game.store.list_responses(game.session_id).await.unwrap();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].answer_id, first.answer_id);
        assert_eq!(game.stored_score().await, first.score);
    }

    fn active_session(start: SystemTime, minutes: Option<u32>) -> GameSession {
        let mut session = GameSession::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            "123456".into(),
            SessionMode::HostedMultiplayer,
            start,
        );
        session.status = SessionStatus::Active;
        session.total_time_minutes = minutes;
        session.countdown_started_at = Some(start);
        session.started_at = Some(start + Duration::from_secs(10));
        session
    }

    #[test]
    fn gating_follows_the_clock() {
        let start = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let tolerance = Duration::from_secs(2);
        let session = active_session(start, Some(1));
        let deadline = start + Duration::from_secs(70);

        assert_eq!(
            accepts_answers(&session, start, tolerance),
            Err(Rejection::NotStarted)
        );
        assert_eq!(
            accepts_answers(&session, start + Duration::from_secs(10), tolerance),
            Ok(())
        );
        assert_eq!(
            accepts_answers(&session, deadline + Duration::from_secs(1), tolerance),
            Ok(())
        );
        assert_eq!(
            accepts_answers(&session, deadline + tolerance, tolerance),
            Err(Rejection::TimeExpired)
        );
    }

    #[test]
    fn untimed_sessions_never_expire() {
        let start = SystemTime::UNIX_EPOCH;
        let session = active_session(start, None);
        let much_later = start + Duration::from_secs(86_400);
        assert_eq!(accepts_answers(&session, much_later, Duration::ZERO), Ok(()));
    }

    #[test]
    fn finished_sessions_are_closed() {
        let start = SystemTime::UNIX_EPOCH;
        let mut session = active_session(start, Some(5));
        session.status = SessionStatus::Finished;
        session.ended_at = Some(start + Duration::from_secs(20));
        assert_eq!(
            accepts_answers(&session, start + Duration::from_secs(20), Duration::ZERO),
            Err(Rejection::SessionClosed)
        );
    }
}
