use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Quiz Live Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::quizzes::import_quiz,
        crate::routes::sessions::create_session,
        crate::routes::sessions::list_sessions,
        crate::routes::sessions::get_session,
        crate::routes::sessions::get_session_by_code,
        crate::routes::sessions::start_session,
        crate::routes::sessions::advance_session,
        crate::routes::sessions::pause_session,
        crate::routes::sessions::resume_session,
        crate::routes::sessions::end_session,
        crate::routes::sessions::get_results,
        crate::routes::sessions::recompute_results,
        crate::routes::sessions::join_session,
        crate::routes::sessions::get_leaderboard,
        crate::routes::sessions::get_current_question,
        crate::routes::sessions::get_question_stats,
        crate::routes::sessions::submit_answer,
        crate::routes::sessions::get_report,
        crate::routes::sse::session_events,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::dto::health::HealthStatus,
            crate::dto::quiz::QuizImportRequest,
            crate::dto::quiz::QuestionInput,
            crate::dto::quiz::OptionInput,
            crate::dto::quiz::QuizImportResponse,
            crate::dto::session::CreateSessionRequest,
            crate::dto::session::SessionSummary,
            crate::dto::participant::JoinSessionRequest,
            crate::dto::participant::JoinSessionResponse,
            crate::dto::participant::ParticipantSummary,
            crate::dto::participant::LeaderboardEntry,
            crate::dto::question::PlayerQuestion,
            crate::dto::question::PlayerOption,
            crate::dto::answer::SubmitAnswerRequest,
            crate::dto::answer::SubmitAnswerResponse,
            crate::dto::answer::AnswerStatus,
            crate::dto::results::ResultRow,
            crate::dto::report::SessionReport,
            crate::dto::report::ParticipantReport,
            crate::dto::report::QuestionReport,
            crate::dto::report::QuestionStats,
            crate::dto::report::OptionTally,
            crate::dto::sse::Handshake,
            crate::dto::sse::ScoreChangedEvent,
            crate::dao::models::SessionStatus,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "quizzes", description = "Quiz import"),
        (name = "sessions", description = "Controller operations on live sessions"),
        (name = "participants", description = "Joining, answering and live standings"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;
