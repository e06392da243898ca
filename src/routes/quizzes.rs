use axum::{Json, Router, extract::State, http::StatusCode, routing::post};

use crate::{
    dto::quiz::{QuizImportRequest, QuizImportResponse},
    error::AppError,
    routes::identity::CallerIdentity,
    services::quiz_service,
    state::SharedState,
};

/// Import a quiz with its questions and options in one request.
///
/// The whole payload is validated first; a malformed question rejects the import.
#[utoipa::path(
    post,
    path = "/quizzes",
    tag = "quizzes",
    params(("X-Identity-Id" = uuid::Uuid, Header, description = "Identity of the quiz author")),
    request_body = QuizImportRequest,
    responses(
        (status = 201, description = "Quiz stored", body = QuizImportResponse),
        (status = 400, description = "Malformed quiz")
    )
)]
pub async fn import_quiz(
    State(state): State<SharedState>,
    CallerIdentity(caller): CallerIdentity,
    Json(payload): Json<QuizImportRequest>,
) -> Result<(StatusCode, Json<QuizImportResponse>), AppError> {
    let imported = quiz_service::import_quiz(&state, caller, payload).await?;
    Ok((StatusCode::CREATED, Json(imported)))
}

/// Quiz import routes.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new().route("/quizzes", post(import_quiz))
}
