use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        answer::{SubmitAnswerRequest, SubmitAnswerResponse},
        participant::{JoinSessionRequest, JoinSessionResponse, LeaderboardEntry},
        question::PlayerQuestion,
        report::{QuestionStats, SessionReport},
        results::ResultRow,
        session::{CreateSessionRequest, SessionSummary},
    },
    error::AppError,
    routes::identity::{CallerIdentity, OptionalCallerIdentity},
    services::{
        answer_service, participant_service, ranking_service, report_service,
        session_service::{self, ControllerOp},
    },
    state::SharedState,
};

/// Live session endpoints for controllers and participants.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sessions", post(create_session).get(list_sessions))
        .route("/sessions/join", post(join_session))
        .route("/sessions/code/{code}", get(get_session_by_code))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/start", post(start_session))
        .route("/sessions/{id}/advance", post(advance_session))
        .route("/sessions/{id}/pause", post(pause_session))
        .route("/sessions/{id}/resume", post(resume_session))
        .route("/sessions/{id}/end", post(end_session))
        .route("/sessions/{id}/results", get(get_results))
        .route("/sessions/{id}/results/recompute", post(recompute_results))
        .route("/sessions/{id}/participants", get(get_leaderboard))
        .route("/sessions/{id}/question", get(get_current_question))
        .route(
            "/sessions/{id}/questions/{question_id}/stats",
            get(get_question_stats),
        )
        .route("/sessions/{id}/answers", post(submit_answer))
        .route("/sessions/{id}/report", get(get_report))
}

/// Open a lobby for one of the caller's quizzes.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    params(("X-Identity-Id" = Uuid, Header, description = "Identity of the quiz owner")),
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created in the lobby", body = SessionSummary),
        (status = 403, description = "Caller does not own the quiz"),
        (status = 404, description = "Unknown quiz")
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
    Json(payload): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionSummary>), AppError> {
    let session = session_service::create_session(&state, caller, payload.quiz_id).await?;
    Ok((StatusCode::CREATED, Json((&session).into())))
}

/// Sessions opened by the caller, newest first.
#[utoipa::path(
    get,
    path = "/sessions",
    tag = "sessions",
    params(("X-Identity-Id" = Uuid, Header, description = "Identity of the session owner")),
    responses(
        (status = 200, description = "Owned sessions", body = [SessionSummary]),
        (status = 401, description = "Missing identity")
    )
)]
pub async fn list_sessions(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
) -> Result<Json<Vec<SessionSummary>>, AppError> {
    let sessions = session_service::list_owned_sessions(&state, caller).await?;
    Ok(Json(sessions.iter().map(Into::into).collect()))
}

/// Current state of a session.
#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses((status = 200, description = "Session state", body = SessionSummary))
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    let session = session_service::get_session(&state, id).await?;
    Ok(Json((&session).into()))
}

/// Look a session up by join code, in any case.
#[utoipa::path(
    get,
    path = "/sessions/code/{code}",
    tag = "sessions",
    params(("code" = String, Path, description = "Six character join code")),
    responses(
        (status = 200, description = "Session state", body = SessionSummary),
        (status = 404, description = "No session uses this code")
    )
)]
pub async fn get_session_by_code(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<SessionSummary>, AppError> {
    let session = session_service::find_by_code(&state, &code).await?;
    Ok(Json((&session).into()))
}

async fn transition(
    state: &SharedState,
    caller: Uuid,
    id: Uuid,
    op: ControllerOp,
) -> Result<Json<SessionSummary>, AppError> {
    let session = session_service::drive(state, caller, id, op).await?;
    Ok(Json((&session).into()))
}

/// Leave the lobby and put the first question in play.
#[utoipa::path(
    post,
    path = "/sessions/{id}/start",
    tag = "sessions",
    params(
        ("X-Identity-Id" = Uuid, Header, description = "Identity of the session owner"),
        ("id" = Uuid, Path, description = "Session identifier")
    ),
    responses(
        (status = 200, description = "Session running", body = SessionSummary),
        (status = 400, description = "Quiz has no questions"),
        (status = 403, description = "Caller does not own the session"),
        (status = 409, description = "Session is not in the lobby")
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    transition(&state, caller, id, ControllerOp::Start).await
}

/// Move to the next question; after the last one this ends the session.
#[utoipa::path(
    post,
    path = "/sessions/{id}/advance",
    tag = "sessions",
    params(
        ("X-Identity-Id" = Uuid, Header, description = "Identity of the session owner"),
        ("id" = Uuid, Path, description = "Session identifier")
    ),
    responses(
        (status = 200, description = "Next question in play, or session ended", body = SessionSummary),
        (status = 409, description = "Session is not running")
    )
)]
pub async fn advance_session(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    transition(&state, caller, id, ControllerOp::Advance).await
}

/// Freeze the question in play.
#[utoipa::path(
    post,
    path = "/sessions/{id}/pause",
    tag = "sessions",
    params(
        ("X-Identity-Id" = Uuid, Header, description = "Identity of the session owner"),
        ("id" = Uuid, Path, description = "Session identifier")
    ),
    responses(
        (status = 200, description = "Session paused", body = SessionSummary),
        (status = 409, description = "Session is not running")
    )
)]
pub async fn pause_session(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    transition(&state, caller, id, ControllerOp::Pause).await
}

/// Reopen a paused question.
#[utoipa::path(
    post,
    path = "/sessions/{id}/resume",
    tag = "sessions",
    params(
        ("X-Identity-Id" = Uuid, Header, description = "Identity of the session owner"),
        ("id" = Uuid, Path, description = "Session identifier")
    ),
    responses(
        (status = 200, description = "Session running again", body = SessionSummary),
        (status = 409, description = "Session is not paused")
    )
)]
pub async fn resume_session(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    transition(&state, caller, id, ControllerOp::Resume).await
}

/// End the session and compute the final ranking. Repeating the call is harmless.
#[utoipa::path(
    post,
    path = "/sessions/{id}/end",
    tag = "sessions",
    params(
        ("X-Identity-Id" = Uuid, Header, description = "Identity of the session owner"),
        ("id" = Uuid, Path, description = "Session identifier")
    ),
    responses((status = 200, description = "Session ended", body = SessionSummary))
)]
pub async fn end_session(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSummary>, AppError> {
    transition(&state, caller, id, ControllerOp::End).await
}

/// Final ranking with aliases.
#[utoipa::path(
    get,
    path = "/sessions/{id}/results",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses((status = 200, description = "Final ranking; empty until the session has ended", body = [ResultRow]))
)]
pub async fn get_results(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ResultRow>>, AppError> {
    Ok(Json(ranking_service::results(&state, id).await?))
}

/// Rerun the ranking of an ended session.
#[utoipa::path(
    post,
    path = "/sessions/{id}/results/recompute",
    tag = "sessions",
    params(
        ("X-Identity-Id" = Uuid, Header, description = "Identity of the session owner"),
        ("id" = Uuid, Path, description = "Session identifier")
    ),
    responses(
        (status = 200, description = "Ranking recomputed", body = [ResultRow]),
        (status = 409, description = "Session has not ended")
    )
)]
pub async fn recompute_results(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ResultRow>>, AppError> {
    session_service::recompute_results(&state, caller, id).await?;
    Ok(Json(ranking_service::results(&state, id).await?))
}

/// Join a lobby by code. Without an identity header the participant is a guest.
#[utoipa::path(
    post,
    path = "/sessions/join",
    tag = "participants",
    params(("X-Identity-Id" = Option<Uuid>, Header, description = "Identity of a signed-in player")),
    request_body = JoinSessionRequest,
    responses(
        (status = 201, description = "Joined", body = JoinSessionResponse),
        (status = 400, description = "Malformed code or alias"),
        (status = 404, description = "No lobby uses this code")
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    OptionalCallerIdentity(identity): OptionalCallerIdentity,
    Json(payload): Json<JoinSessionRequest>,
) -> Result<(StatusCode, Json<JoinSessionResponse>), AppError> {
    payload.validate()?;
    let (participant, session) =
        participant_service::join(&state, &payload.code, &payload.alias, identity).await?;
    Ok((
        StatusCode::CREATED,
        Json(JoinSessionResponse {
            participant: (&participant).into(),
            session: (&session).into(),
        }),
    ))
}

/// Participants with their current score, best first.
#[utoipa::path(
    get,
    path = "/sessions/{id}/participants",
    tag = "participants",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses((status = 200, description = "Live leaderboard", body = [LeaderboardEntry]))
)]
pub async fn get_leaderboard(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<LeaderboardEntry>>, AppError> {
    Ok(Json(participant_service::leaderboard(&state, id).await?))
}

/// Question in play without correctness flags; `null` outside a running session.
#[utoipa::path(
    get,
    path = "/sessions/{id}/question",
    tag = "participants",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses((status = 200, description = "Current question", body = Option<PlayerQuestion>))
)]
pub async fn get_current_question(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Option<PlayerQuestion>>, AppError> {
    Ok(Json(report_service::current_question(&state, id).await?))
}

/// Per-option answer counts for the session owner.
#[utoipa::path(
    get,
    path = "/sessions/{id}/questions/{question_id}/stats",
    tag = "sessions",
    params(
        ("X-Identity-Id" = Uuid, Header, description = "Identity of the session owner"),
        ("id" = Uuid, Path, description = "Session identifier"),
        ("question_id" = Uuid, Path, description = "Question identifier")
    ),
    responses((status = 200, description = "Answer distribution", body = QuestionStats))
)]
pub async fn get_question_stats(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
    Path((id, question_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<QuestionStats>, AppError> {
    Ok(Json(
        report_service::question_stats(&state, caller, id, question_id).await?,
    ))
}

/// Submit an answer for the question in play. Only the first submission counts.
#[utoipa::path(
    post,
    path = "/sessions/{id}/answers",
    tag = "participants",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = SubmitAnswerRequest,
    responses(
        (status = 200, description = "Answer recorded, or an earlier one stands", body = SubmitAnswerResponse),
        (status = 400, description = "Option does not belong to the question"),
        (status = 409, description = "Session not running or question no longer in play")
    )
)]
pub async fn submit_answer(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<SubmitAnswerRequest>,
) -> Result<Json<SubmitAnswerResponse>, AppError> {
    let outcome = answer_service::submit_answer(&state, id, payload).await?;
    Ok(Json(outcome.into()))
}

/// Post-game statistics; owner only, once ended.
#[utoipa::path(
    get,
    path = "/sessions/{id}/report",
    tag = "sessions",
    params(
        ("X-Identity-Id" = Uuid, Header, description = "Identity of the session owner"),
        ("id" = Uuid, Path, description = "Session identifier")
    ),
    responses((status = 200, description = "Post-game report", body = SessionReport))
)]
pub async fn get_report(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionReport>, AppError> {
    Ok(Json(report_service::session_report(&state, caller, id).await?))
}
