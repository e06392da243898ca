use axum::Router;

use crate::state::SharedState;

/// Swagger UI and the OpenAPI document.
pub mod docs;
/// Health check.
pub mod health;
/// Caller identity extractors.
pub mod identity;
/// Quiz import.
pub mod quizzes;
/// Session lifecycle, joins, answers and results.
pub mod sessions;
/// Session change stream.
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    health::router()
        .merge(quizzes::router())
        .merge(sessions::router())
        .merge(sse::router())
        .merge(docs::router())
        .with_state(state)
}
