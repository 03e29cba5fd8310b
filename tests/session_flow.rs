use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use golek_quiz_back::{
    config::AppConfig,
    dao::quiz_store::{QuizStore, memory::MemoryQuizStore},
    dto::{
        quiz::{AnswerInput, CreateQuizRequest, QuestionInput, QuizSummary},
        roster::JoinRequest,
        session::CreateSessionRequest,
        submission::SubmitAnswerRequest,
    },
    error::{Rejection, ServiceError},
    services::{quiz_service, response_service, results_service, roster_service, session_service},
    state::{
        AppState, SharedState,
        clock::ManualTimeSource,
        game::Visibility,
        state_machine::{EndReason, SessionMode, SessionPhase, SessionStatus},
    },
};
use uuid::Uuid;

struct Harness {
    state: SharedState,
    store: MemoryQuizStore,
    clock: Arc<ManualTimeSource>,
    host: Uuid,
}

impl Harness {
    async fn new() -> Self {
        let clock = Arc::new(ManualTimeSource::new(
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000),
        ));
        let state = AppState::with_time_source(AppConfig::default(), clock.clone());
        let store = MemoryQuizStore::new();
        state.set_quiz_store(Arc::new(store.clone())).await;
        Self {
            state,
            store,
            clock,
            host: Uuid::new_v4(),
        }
    }

    async fn quiz(&self, questions: usize) -> QuizSummary {
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

        quiz_service::create_quiz(
            &self.state,
            self.host,
            CreateQuizRequest {
                title: "Capitals".into(),
                description: None,
                visibility: Visibility::Private,
                questions,
            },
        )
        .await
        .expect("quiz saved")
    }

    async fn hosted_session(&self, quiz: &QuizSummary) -> (Uuid, String) {
        let created = session_service::create_session(
            &self.state,
            self.host,
            CreateSessionRequest {
                quiz_id: quiz.id,
                mode: SessionMode::HostedMultiplayer,
                nickname: None,
            },
        )
        .await
        .expect("session created");
        (created.session.id, created.session.access_pin)
    }

    async fn join(&self, pin: &str, nickname: &str) -> Result<Uuid, ServiceError> {
        roster_service::join(
            &self.state,
            JoinRequest {
                pin: pin.into(),
                nickname: nickname.into(),
            },
            None,
        )
        .await
        .map(|joined| joined.participant.id)
    }

    /// Start with a budget and move the clock past the countdown.
    async fn start(&self, session_id: Uuid, minutes: Option<u32>) {
        session_service::start_session(&self.state, session_id, self.host, minutes)
            .await
            .expect("countdown started");
        self.clock
            .advance(self.state.config().hosted_countdown + Duration::from_millis(1));
    }

    async fn answer(
        &self,
        session_id: Uuid,
        participant_id: Uuid,
        question_id: Uuid,
        answer_id: Uuid,
        elapsed_ms: u64,
    ) -> Result<u32, ServiceError> {
        response_service::submit_answer(
            &self.state,
            session_id,
            None,
            SubmitAnswerRequest {
                participant_id,
                question_id,
                answer_id: Some(answer_id),
                elapsed_ms: Some(elapsed_ms),
            },
        )
        .await
        .map(|recorded| recorded.points)
    }

    async fn progress(&self, session_id: Uuid, participant_id: Uuid) -> f64 {
        roster_service::progress(&self.state, session_id)
            .await
            .expect("progress")
            .entries
            .into_iter()
            .find(|entry| entry.participant_id == participant_id)
            .map(|entry| entry.progress)
            .expect("participant listed")
    }
}

fn answers(quiz: &QuizSummary, question: usize) -> (Uuid, Uuid, Uuid) {
    let question = &quiz.questions[question];
    let right = question.answers[0].id;
    let wrong = question.answers[1].id;
    (question.id, right, wrong)
}

#[tokio::test]
async fn joining_twice_with_one_nickname_keeps_a_single_row() {
    let harness = Harness::new().await;
    let quiz = harness.quiz(2).await;
    let (session_id, pin) = harness.hosted_session(&quiz).await;

    harness.join(&pin, "ana").await.expect("first join");
    let second = harness.join(&pin, "ana").await;
    assert!(matches!(
        second,
        Err(ServiceError::Rejected(Rejection::DuplicateNickname))
    ));

    let participants = harness
        .store
        .list_participants(session_id)
        .await
        .expect("participants");
    assert_eq!(participants.len(), 1);
}

#[tokio::test]
async fn joining_after_start_is_a_late_join() {
    let harness = Harness::new().await;
    let quiz = harness.quiz(1).await;
    let (session_id, pin) = harness.hosted_session(&quiz).await;
    harness.join(&pin, "ana").await.expect("join");

    harness.start(session_id, None).await;
    let late = harness.join(&pin, "budi").await;
    assert!(matches!(
        late,
        Err(ServiceError::Rejected(Rejection::LateJoin))
    ));
}

#[tokio::test]
async fn ending_repeatedly_keeps_the_first_end_time() {
    let harness = Harness::new().await;
    let quiz = harness.quiz(1).await;
    let (session_id, pin) = harness.hosted_session(&quiz).await;
    harness.join(&pin, "ana").await.expect("join");
    harness.start(session_id, Some(5)).await;

    let first = session_service::end_session(
        &harness.state,
        session_id,
        Some(harness.host),
        Some(EndReason::HostAborted),
    )
    .await
    .expect("first end");
    assert_eq!(first.status, SessionStatus::Finished);

    harness.clock.advance(Duration::from_secs(3));
    let second = session_service::end_session(
        &harness.state,
        session_id,
        Some(harness.host),
        Some(EndReason::HostAborted),
    )
    .await
    .expect("second end");
    let expired = session_service::end_session(
        &harness.state,
        session_id,
        None,
        Some(EndReason::TimerExpired),
    )
    .await
    .expect("concurrent expiry report");

    assert_eq!(second.ended_at, first.ended_at);
    assert_eq!(expired.ended_at, first.ended_at);
    assert_eq!(expired.status, SessionStatus::Finished);
}

#[tokio::test]
async fn clock_counts_down_to_zero_at_the_deadline() {
    let harness = Harness::new().await;
    let quiz = harness.quiz(1).await;
    let (session_id, pin) = harness.hosted_session(&quiz).await;
    harness.join(&pin, "ana").await.expect("join");

    session_service::start_session(&harness.state, session_id, harness.host, Some(5))
        .await
        .expect("start");
    harness.clock.advance(harness.state.config().hosted_countdown);

    harness.clock.advance(Duration::from_secs(299));
    let view = session_service::get_session(&harness.state, session_id)
        .await
        .expect("view");
    assert_eq!(view.session.clock.phase, Some(SessionPhase::Active));
    assert_eq!(view.session.clock.time_remaining_secs, Some(1));

    harness.clock.advance(Duration::from_secs(1));
    let view = session_service::get_session(&harness.state, session_id)
        .await
        .expect("view");
    assert_eq!(view.session.clock.time_remaining_secs, Some(0));
}

#[tokio::test]
async fn points_decay_to_half_and_wrong_answers_score_nothing() {
    let harness = Harness::new().await;
    let quiz = harness.quiz(3).await;
    let (session_id, pin) = harness.hosted_session(&quiz).await;
    let ana = harness.join(&pin, "ana").await.expect("join");
    harness.start(session_id, None).await;

    let (q0, right0, _) = answers(&quiz, 0);
    let (q1, right1, _) = answers(&quiz, 1);
    let (q2, _, wrong2) = answers(&quiz, 2);

    assert_eq!(harness.answer(session_id, ana, q0, right0, 0).await.ok(), Some(1000));
    assert_eq!(harness.answer(session_id, ana, q1, right1, 20_000).await.ok(), Some(500));
    assert_eq!(harness.answer(session_id, ana, q2, wrong2, 3_000).await.ok(), Some(0));
}

#[tokio::test]
async fn resubmitting_replaces_the_previous_answer() {
    let harness = Harness::new().await;
    let quiz = harness.quiz(2).await;
    let (session_id, pin) = harness.hosted_session(&quiz).await;
    let ana = harness.join(&pin, "ana").await.expect("join");
    harness.start(session_id, None).await;

    let (q0, right, wrong) = answers(&quiz, 0);
    harness.answer(session_id, ana, q0, right, 0).await.expect("first answer");
    harness.answer(session_id, ana, q0, wrong, 0).await.expect("second answer");

    let responses = harness
        .store
        .list_responses(session_id)
        .await
        .expect("responses");
    assert_eq!(responses.len(), 1);
    assert_eq!(responses[0].answer_id, Some(wrong));

    let participant = harness
        .store
        .find_participant(ana)
        .await
        .expect("lookup")
        .expect("participant");
    assert_eq!(participant.score, 0);
}

#[tokio::test]
async fn leaderboard_orders_ties_by_join_order() {
    let harness = Harness::new().await;
    let quiz = harness.quiz(1).await;
    let (session_id, pin) = harness.hosted_session(&quiz).await;
    let ana = harness.join(&pin, "ana").await.expect("join");
    let budi = harness.join(&pin, "budi").await.expect("join");
    let citra = harness.join(&pin, "citra").await.expect("join");
    harness.start(session_id, None).await;

    let (q0, right, _) = answers(&quiz, 0);
    harness.answer(session_id, citra, q0, right, 0).await.expect("citra");
    harness.answer(session_id, budi, q0, right, 20_000).await.expect("budi");
    harness.answer(session_id, ana, q0, right, 20_000).await.expect("ana");

    let board = results_service::leaderboard(&harness.state, session_id)
        .await
        .expect("leaderboard");
    assert_eq!(board.total_participants, 3);

    let order: Vec<(Uuid, u32, u32, u32)> = board
        .entries
        .iter()
        .map(|entry| (entry.participant_id, entry.position, entry.rank, entry.score))
        .collect();
    assert_eq!(
        order,
        vec![
            (citra, 1, 1, 1000),
            (ana, 2, 2, 500),
            (budi, 3, 2, 500),
        ]
    );
    assert!(board.is_final, "everyone answered, so the hosted session ended");
}

#[tokio::test]
async fn quiz_without_questions_cannot_be_hosted() {
    let harness = Harness::new().await;
    let quiz = harness.quiz(0).await;

    let result = session_service::create_session(
        &harness.state,
        harness.host,
        CreateSessionRequest {
            quiz_id: quiz.id,
            mode: SessionMode::HostedMultiplayer,
            nickname: None,
        },
    )
    .await;

    assert!(matches!(
        result,
        Err(ServiceError::Rejected(Rejection::NoQuestions))
    ));
    assert_eq!(harness.store.session_count().await, 0);
}

#[tokio::test]
async fn progress_moves_one_question_at_a_time() {
    let harness = Harness::new().await;
    let quiz = harness.quiz(4).await;
    let (session_id, pin) = harness.hosted_session(&quiz).await;
    let ana = harness.join(&pin, "ana").await.expect("join");
    harness.join(&pin, "budi").await.expect("join");
    harness.start(session_id, None).await;

    assert_eq!(harness.progress(session_id, ana).await, 0.0);

    let (q0, right, wrong) = answers(&quiz, 0);
    harness.answer(session_id, ana, q0, right, 0).await.expect("answer");
    assert_eq!(harness.progress(session_id, ana).await, 0.25);

    harness.answer(session_id, ana, q0, wrong, 0).await.expect("re-answer");
    assert_eq!(harness.progress(session_id, ana).await, 0.25);

    let (q1, right, _) = answers(&quiz, 1);
    harness.answer(session_id, ana, q1, right, 0).await.expect("answer");
    assert_eq!(harness.progress(session_id, ana).await, 0.5);
}

#[tokio::test]
async fn answers_after_the_deadline_end_the_session() {
    let harness = Harness::new().await;
    let quiz = harness.quiz(2).await;
    let (session_id, pin) = harness.hosted_session(&quiz).await;
    let ana = harness.join(&pin, "ana").await.expect("join");
    harness.start(session_id, Some(1)).await;

    harness.clock.advance(Duration::from_secs(60) + harness.state.config().clock_tolerance);
    let (q0, right, _) = answers(&quiz, 0);
    let late = harness.answer(session_id, ana, q0, right, 0).await;
    assert!(matches!(
        late,
        Err(ServiceError::Rejected(Rejection::TimeExpired))
    ));

    let view = session_service::get_session(&harness.state, session_id)
        .await
        .expect("view");
    assert_eq!(view.session.status, SessionStatus::Finished);
}

#[tokio::test]
async fn solo_session_ends_when_the_player_finishes() {
    let harness = Harness::new().await;
    let quiz = harness.quiz(1).await;
    let created = session_service::create_session(
        &harness.state,
        harness.host,
        CreateSessionRequest {
            quiz_id: quiz.id,
            mode: SessionMode::SoloTimed,
            nickname: Some("ana".into()),
        },
    )
    .await
    .expect("session");
    let session_id = created.session.id;
    let player = created.participant.expect("implicit player").id;

    session_service::start_session(&harness.state, session_id, harness.host, Some(5))
        .await
        .expect("start");
    harness
        .clock
        .advance(harness.state.config().solo_countdown + Duration::from_millis(1));

    let (q0, right, _) = answers(&quiz, 0);
    response_service::submit_answer(
        &harness.state,
        session_id,
        Some(harness.host),
        SubmitAnswerRequest {
            participant_id: player,
            question_id: q0,
            answer_id: Some(right),
            elapsed_ms: None,
        },
    )
    .await
    .expect("answer");

    let stats = results_service::personal_stats(&harness.state, session_id, player)
        .await
        .expect("stats");
    assert!(stats.is_final);
    assert_eq!(stats.rank, 1);
    assert_eq!(stats.correct_count, 1);
}

#[tokio::test]
async fn private_quiz_cannot_be_hosted_by_someone_else() {
    let harness = Harness::new().await;
    let quiz = harness.quiz(1).await;

    let created = session_service::create_session(
        &harness.state,
        Uuid::new_v4(),
        CreateSessionRequest {
            quiz_id: quiz.id,
            mode: SessionMode::HostedMultiplayer,
            nickname: None,
        },
    )
    .await;

    assert!(matches!(
        created,
        Err(ServiceError::Rejected(Rejection::NotQuizOwner))
    ));
    assert_eq!(harness.store.session_count().await, 0);
}

#[tokio::test]
async fn self_paced_sessions_take_no_joiners() {
    let harness = Harness::new().await;
    let quiz = harness.quiz(1).await;

    for mode in [SessionMode::SoloTimed, SessionMode::PracticeUntimed] {
        let created = session_service::create_session(
            &harness.state,
            harness.host,
            CreateSessionRequest {
                quiz_id: quiz.id,
                mode,
                nickname: None,
            },
        )
        .await
        .expect("session created");

        let joined = harness.join(&created.session.access_pin, "ben").await;
        assert!(matches!(
            joined,
            Err(ServiceError::Rejected(Rejection::RosterClosed))
        ));
    }
}

#[tokio::test]
async fn lobby_leave_is_limited_to_the_player_and_the_host() {
    let harness = Harness::new().await;
    let quiz = harness.quiz(1).await;
    let (session_id, pin) = harness.hosted_session(&quiz).await;
    let ana_user = Uuid::new_v4();
    let join_as = |nickname: &'static str, user: Uuid| {
        let state = harness.state.clone();
        let pin = pin.clone();
        async move {
            roster_service::join(
                &state,
                JoinRequest {
                    pin,
                    nickname: nickname.into(),
                },
                Some(user),
            )
            .await
            .expect("joined")
            .participant
            .id
        }
    };
    let ana = join_as("ana", ana_user).await;
    let ben = join_as("ben", Uuid::new_v4()).await;
    let cid = join_as("cid", Uuid::new_v4()).await;

    let stranger = roster_service::leave(&harness.state, session_id, ben, Some(ana_user)).await;
    assert!(matches!(stranger, Err(ServiceError::Forbidden(_))));
    let anonymous = roster_service::leave(&harness.state, session_id, ben, None).await;
    assert!(matches!(anonymous, Err(ServiceError::Forbidden(_))));

    roster_service::leave(&harness.state, session_id, ana, Some(ana_user))
        .await
        .expect("player leaves");
    roster_service::leave(&harness.state, session_id, ben, Some(harness.host))
        .await
        .expect("host removes player");
    let remaining = harness.store.list_participants(session_id).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, cid);

    harness.start(session_id, None).await;
    let after_start = roster_service::leave(&harness.state, session_id, cid, Some(harness.host)).await;
    assert!(matches!(after_start, Err(ServiceError::InvalidState(_))));
    assert_eq!(harness.store.list_participants(session_id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn host_abort_during_countdown_never_ends_before_it_starts() {
    let harness = Harness::new().await;
    let quiz = harness.quiz(1).await;
    let (session_id, pin) = harness.hosted_session(&quiz).await;
    harness.join(&pin, "ana").await.expect("join");

    session_service::start_session(&harness.state, session_id, harness.host, Some(5))
        .await
        .expect("countdown started");
    harness.clock.advance(Duration::from_secs(2));
    let ended = session_service::end_session(&harness.state, session_id, Some(harness.host), None)
        .await
        .expect("aborted");
    assert_eq!(ended.status, SessionStatus::Finished);

    let stored = harness
        .store
        .find_session(session_id)
        .await
        .unwrap()
        .expect("session stored");
    let started_at = stored.started_at.expect("start recorded");
    let ended_at = stored.ended_at.expect("end recorded");
    assert!(stored.countdown_started_at.expect("countdown recorded") <= started_at);
    assert!(started_at <= ended_at);
}
