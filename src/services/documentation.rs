use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for GolekQuiz Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::quizzes::create_quiz,
        crate::routes::quizzes::get_quiz,
        crate::routes::sessions::create_session,
        crate::routes::sessions::find_by_pin,
        crate::routes::sessions::get_session,
        crate::routes::sessions::session_questions,
        crate::routes::sessions::start_session,
        crate::routes::sessions::end_session,
        crate::routes::roster::join,
        crate::routes::roster::leave,
        crate::routes::roster::progress,
        crate::routes::responses::submit_answer,
        crate::routes::results::leaderboard,
        crate::routes::results::question_stats,
        crate::routes::results::personal_stats,
        crate::routes::events::session_events,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::quiz::CreateQuizRequest,
            crate::dto::quiz::QuestionInput,
            crate::dto::quiz::AnswerInput,
            crate::dto::quiz::QuizSummary,
            crate::dto::quiz::QuestionSummary,
            crate::dto::quiz::AnswerSummary,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::CreateSessionResponse,
            crate::dto::session::SessionSummary,
            crate::dto::session::ClockSnapshot,
            crate::dto::session::SessionView,
            crate::dto::session::StartSessionRequest,
            crate::dto::session::EndSessionRequest,
            crate::dto::session::PinLookupResponse,
            crate::dto::roster::JoinRequest,
            crate::dto::roster::JoinResponse,
            crate::dto::roster::ParticipantSummary,
            crate::dto::roster::ProgressEntry,
            crate::dto::roster::ProgressResponse,
            crate::dto::submission::SubmitAnswerRequest,
            crate::dto::submission::SubmitAnswerResponse,
            crate::dto::results::LeaderboardEntry,
            crate::dto::results::LeaderboardResponse,
            crate::dto::results::QuestionStat,
            crate::dto::results::QuestionStatsResponse,
            crate::dto::results::PersonalStatsResponse,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::SessionGoneEvent,
            crate::state::state_machine::SessionMode,
            crate::state::state_machine::SessionStatus,
            crate::state::state_machine::SessionPhase,
            crate::state::state_machine::EndReason,
            crate::state::game::Visibility,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "quizzes", description = "Quiz import and lookup"),
        (name = "sessions", description = "Session lifecycle"),
        (name = "roster", description = "Lobby membership and progress"),
        (name = "responses", description = "Answer submission"),
        (name = "results", description = "Leaderboard and statistics"),
        (name = "events", description = "Server-sent session views"),
    )
)]
pub struct ApiDoc;

/// Full document, including feature-gated endpoints.
pub fn api_doc() -> utoipa::openapi::OpenApi {
    #[allow(unused_mut)]
    let mut doc = ApiDoc::openapi();
    #[cfg(feature = "ai-generation")]
    doc.merge(GenerationDoc::openapi());
    doc
}

#[cfg(feature = "ai-generation")]
#[derive(OpenApi)]
#[openapi(
    paths(crate::routes::generation::generate_questions),
    components(schemas(
        crate::dto::generation::GenerateQuestionsRequest,
        crate::dto::generation::GenerateQuestionsResponse,
        crate::dto::generation::GeneratedQuestion,
        crate::dto::generation::GeneratedAnswer,
        crate::dto::generation::GeneratedMetadata,
    )),
    tags((name = "generation", description = "Question drafting"))
)]
struct GenerationDoc;
